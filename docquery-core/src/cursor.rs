//! Cursor descriptions handed to store backends.
//!
//! A [`PreparedCursor`] is the lazily executed equivalent of a driver cursor: it carries
//! the collection, compiled filter and projection, plus every cursor option set through
//! its mutators. Nothing touches the store until a backend opens it with
//! [`StoreBackend::open_cursor`](crate::backend::StoreBackend::open_cursor).

use bson::Document;

use crate::query::QuerySpec;

/// Driver-level cursor flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorFlag {
    /// Reads may be served by secondary members.
    SecondaryOk,
    /// The server must not time out the cursor while it is idle.
    NoCursorTimeout,
}

/// Options applied to a cursor. Unset options leave the driver default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorOptions {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub batch_size: Option<u32>,
    pub snapshot: bool,
    pub sort: Option<Document>,
    pub hint: Option<String>,
    pub flags: Vec<CursorFlag>,
}

impl CursorOptions {
    /// Returns whether the given flag was added.
    pub fn has_flag(&self, flag: CursorFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// A cursor that has been described but not yet opened.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCursor {
    collection: String,
    filter: Document,
    projection: Option<Document>,
    options: CursorOptions,
}

impl PreparedCursor {
    /// Describes a `find(filter, projection)` on a collection.
    pub fn find(
        collection: impl Into<String>,
        filter: Document,
        projection: Option<Document>,
    ) -> Self {
        Self {
            collection: collection.into(),
            filter,
            projection,
            options: CursorOptions::default(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn projection(&self) -> Option<&Document> {
        self.projection.as_ref()
    }

    pub fn options(&self) -> &CursorOptions {
        &self.options
    }

    /// Splits the cursor into its parts, for backends that consume it.
    pub fn into_parts(self) -> (String, Document, Option<Document>, CursorOptions) {
        (self.collection, self.filter, self.projection, self.options)
    }

    pub fn skip(&mut self, skip: u64) -> &mut Self {
        self.options.skip = Some(skip);
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn batch_size(&mut self, batch_size: u32) -> &mut Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    pub fn snapshot(&mut self) -> &mut Self {
        self.options.snapshot = true;
        self
    }

    pub fn sort(&mut self, sort: Document) -> &mut Self {
        self.options.sort = Some(sort);
        self
    }

    pub fn hint(&mut self, index: impl Into<String>) -> &mut Self {
        self.options.hint = Some(index.into());
        self
    }

    pub fn add_option(&mut self, flag: CursorFlag) -> &mut Self {
        if !self.options.flags.contains(&flag) {
            self.options.flags.push(flag);
        }
        self
    }
}

/// Builds configured cursors from compiled query snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorConfigurator;

impl CursorConfigurator {
    /// Describes the `find` for `spec` and applies its cursor options.
    ///
    /// Options are applied in a fixed order: skip, limit, batch size, snapshot, sort,
    /// hint, then the secondary-ok and no-timeout flags. Zero (or negative) skip, limit
    /// and batch size are left unset. Snapshot combined with a sort or a hint is passed
    /// through with a warning; the store decides what to do with it.
    pub fn configure(spec: &QuerySpec) -> PreparedCursor {
        let mut cursor = PreparedCursor::find(
            spec.collection.clone(),
            spec.filter.clone(),
            spec.projection.clone(),
        );

        if spec.offset > 0 {
            cursor.skip(spec.offset);
        }

        if spec.limit > 0 {
            cursor.limit(spec.limit);
        }

        if spec.batch_size > 0 {
            cursor.batch_size(spec.batch_size);
        }

        if spec.snapshot {
            cursor.snapshot();

            if spec.sort.is_some() {
                log::warn!(
                    "snapshot query on '{}' also sets a sort; the store may reject it",
                    spec.collection
                );
            }

            if spec.hint.is_some() {
                log::warn!(
                    "snapshot query on '{}' also sets an index hint; the store may reject it",
                    spec.collection
                );
            }
        }

        if let Some(sort) = &spec.sort {
            cursor.sort(sort.clone());
        }

        if let Some(hint) = &spec.hint {
            cursor.hint(hint.clone());
        }

        if spec.secondary_ok {
            cursor.add_option(CursorFlag::SecondaryOk);
        }

        if spec.no_cursor_timeout {
            cursor.add_option(CursorFlag::NoCursorTimeout);
        }

        log::trace!(
            "prepared cursor on '{}' filter={} projection={:?} options={:?}",
            cursor.collection,
            cursor.filter,
            cursor.projection,
            cursor.options
        );

        cursor
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn spec() -> QuerySpec {
        QuerySpec {
            collection: "hotels".to_string(),
            filter: doc! { "stars": { "$gte": 4 } },
            ..QuerySpec::default()
        }
    }

    #[test]
    fn unset_options_stay_unset() {
        let cursor = CursorConfigurator::configure(&spec());

        assert_eq!(cursor.collection(), "hotels");
        assert_eq!(cursor.filter(), &doc! { "stars": { "$gte": 4 } });
        assert_eq!(cursor.projection(), None);
        assert_eq!(cursor.options(), &CursorOptions::default());
    }

    #[test]
    fn non_positive_limits_are_unbounded() {
        let cursor = CursorConfigurator::configure(&QuerySpec { limit: -3, ..spec() });

        assert_eq!(cursor.options().limit, None);
    }

    #[test]
    fn applies_every_option() {
        let cursor = CursorConfigurator::configure(&QuerySpec {
            projection: Some(doc! { "name": true }),
            offset: 20,
            limit: 10,
            batch_size: 5,
            sort: Some(doc! { "name": 1, "stars": -1 }),
            hint: Some("stars_1".to_string()),
            secondary_ok: true,
            no_cursor_timeout: true,
            ..spec()
        });

        let options = cursor.options();
        assert_eq!(cursor.projection(), Some(&doc! { "name": true }));
        assert_eq!(options.skip, Some(20));
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.batch_size, Some(5));
        assert!(!options.snapshot);
        assert_eq!(options.sort, Some(doc! { "name": 1, "stars": -1 }));
        assert_eq!(options.hint.as_deref(), Some("stars_1"));
        assert_eq!(options.flags, vec![CursorFlag::SecondaryOk, CursorFlag::NoCursorTimeout]);
    }

    #[test]
    fn snapshot_with_hint_is_passed_through() {
        let cursor = CursorConfigurator::configure(&QuerySpec {
            snapshot: true,
            hint: Some("name_1".to_string()),
            ..spec()
        });

        assert!(cursor.options().snapshot);
        assert_eq!(cursor.options().hint.as_deref(), Some("name_1"));
    }

    #[test]
    fn flags_are_added_once() {
        let mut cursor = PreparedCursor::find("hotels", doc! {}, None);
        cursor
            .add_option(CursorFlag::SecondaryOk)
            .add_option(CursorFlag::SecondaryOk);

        assert_eq!(cursor.options().flags, vec![CursorFlag::SecondaryOk]);
        assert!(cursor.options().has_flag(CursorFlag::SecondaryOk));
        assert!(!cursor.options().has_flag(CursorFlag::NoCursorTimeout));
    }
}
