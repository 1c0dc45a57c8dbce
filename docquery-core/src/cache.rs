//! Identity cache scoped to a single result stream.

use bson::Bson;
use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::entity::Key;

/// Counters describing how a cache was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned an already materialized entity.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entities currently held.
    pub entities: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entities, {} hits, {} misses",
            self.entities, self.hits, self.misses
        )
    }
}

/// Maps entity identities (collection and `_id`) to the instance materialized for them.
///
/// A cache belongs to exactly one stream. It only grows while the stream is consumed and
/// is dropped with it, so two independent fetches never share instances.
pub struct EntityCache<E> {
    entries: HashMap<Identity, Arc<E>>,
    hits: u64,
    misses: u64,
}

impl<E> EntityCache<E> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Looks up the instance for `key`, recording a hit or a miss.
    pub fn get(&mut self, key: &Key<E>) -> Option<Arc<E>> {
        match self.entries.get(&cache_key(key)) {
            Some(entity) => {
                self.hits += 1;
                Some(Arc::clone(entity))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores `entity` under `key` and returns the instance now cached for it.
    ///
    /// An instance that is already cached wins over the new one.
    pub fn insert(&mut self, key: &Key<E>, entity: Arc<E>) -> Arc<E> {
        Arc::clone(self.entries.entry(cache_key(key)).or_insert(entity))
    }

    pub fn contains(&self, key: &Key<E>) -> bool {
        self.entries.contains_key(&cache_key(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entities: self.entries.len(),
        }
    }
}

impl<E> Default for EntityCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EntityCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Collection and `_id` of a cached entity.
///
/// Ids compare by BSON value, so `1` and `"1"` (or `Int32(1)` and `Int64(1)`) are distinct
/// identities. The hash only narrows buckets and is derived from the rendered value.
#[derive(Debug, Clone)]
struct Identity {
    collection: String,
    id: Bson,
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.collection == other.collection && self.id == other.id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.collection.hash(state);
        (self.id.element_type() as u8).hash(state);
        self.id.to_string().hash(state);
    }
}

fn cache_key<E>(key: &Key<E>) -> Identity {
    Identity {
        collection: key.collection().to_string(),
        id: key.id().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_the_cached_instance() {
        let mut cache: EntityCache<String> = EntityCache::new();
        let key = Key::with_collection("hotels", "ritz");

        assert!(cache.get(&key).is_none());
        let first = cache.insert(&key, Arc::new("Ritz".to_string()));
        let again = cache.insert(&Key::with_collection("hotels", "ritz"), Arc::new("Other".to_string()));

        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &cache.get(&key).unwrap()));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, entities: 1 });
    }

    #[test]
    fn identities_are_scoped_by_collection() {
        let mut cache: EntityCache<String> = EntityCache::new();
        cache.insert(&Key::with_collection("hotels", 1), Arc::new("hotel".to_string()));

        assert!(cache.contains(&Key::with_collection("hotels", 1)));
        assert!(!cache.contains(&Key::with_collection("rooms", 1)));
        assert!(!cache.contains(&Key::with_collection("hotels", 2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn identities_compare_by_value_and_type() {
        let mut cache: EntityCache<String> = EntityCache::new();
        cache.insert(&Key::with_collection("hotels", 1), Arc::new("int".to_string()));
        cache.insert(&Key::with_collection("hotels", "1"), Arc::new("string".to_string()));
        cache.insert(&Key::with_collection("hotels", 1_i64), Arc::new("long".to_string()));

        assert_eq!(cache.len(), 3);
        assert_eq!(*cache.get(&Key::with_collection("hotels", "1")).unwrap(), "string");
        assert_eq!(*cache.get(&Key::with_collection("hotels", 1_i64)).unwrap(), "long");
        assert_eq!(*cache.get(&Key::with_collection("hotels", 1)).unwrap(), "int");
    }
}
