//! Query construction, compilation and execution.
//!
//! A [`Query`] is a fluent builder bound to one entity type and one store backend. It
//! owns the criteria tree plus projection, sort and cursor options, compiles them into
//! the store's native filter and projection documents, and runs them.
//!
//! # Query Building
//!
//! ```ignore
//! use docquery::prelude::*;
//!
//! let mut query = store.query::<Hotel>();
//! query
//!     .filter("stars >=", 4)?
//!     .field("tags").has_any_of(["spa", "pool"])?
//!     .order("name,-stars")?
//!     .limit(10);
//!
//! let hotels = query.as_list().await?;
//! ```
//!
//! # Grouping
//!
//! [`Query::criteria`] opens a nested AND group and returns its [`CriteriaRef`]. Groups
//! can be regrouped under an OR (or another AND) with [`Query::or`] and [`Query::and`]:
//!
//! ```ignore
//! let paris = query.criteria("address.city").equal("Paris")?;
//! let cheap = query.criteria("stars").less_than(3)?;
//! query.or([paris, cheap])?;
//! // { "$or": [ { "address.city": "Paris" }, { "stars": { "$lt": 3 } } ] }
//! ```
//!
//! # Execution
//!
//! Terminal operations take `&self`. Overrides they need (identity-only projection for
//! keys, a limit of one for [`Query::get`]) are applied to a [`QuerySpec`] snapshot, so
//! the builder state is never modified while a query runs.

use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use std::{fmt, marker::PhantomData, sync::Arc};

use crate::{
    backend::StoreBackend,
    criteria::{
        Criteria, CriteriaJoin, CriteriaRef, CriteriaTree, FieldCriteria, WhereCriteria,
        WhereExpression, parse_condition,
    },
    cursor::{CursorConfigurator, PreparedCursor},
    entity::{Entity, ID_KEY, Key},
    error::{DocumentStoreError, DocumentStoreResult},
    field::{FieldEnd, GroupScope, QueryScope},
    mapper::Mapper,
    stream::{KeyStream, Materializer, ResultStream},
};

/// An immutable snapshot of everything needed to open a cursor.
///
/// Produced by [`Query::spec`]. `limit <= 0` means unbounded and `batch_size == 0`
/// leaves the driver default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub collection: String,
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub offset: u64,
    pub limit: i64,
    pub batch_size: u32,
    pub hint: Option<String>,
    pub snapshot: bool,
    pub secondary_ok: bool,
    pub no_cursor_timeout: bool,
}

impl QuerySpec {
    /// Replaces the projection.
    pub fn with_projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection;
        self
    }

    /// Replaces the limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Describes the configured cursor for this snapshot.
    pub fn prepare_cursor(&self) -> PreparedCursor {
        CursorConfigurator::configure(self)
    }
}

#[derive(Debug, Clone)]
struct Projection {
    fields: Vec<String>,
    include: bool,
}

/// A fluent query over the collection of entity `E`.
pub struct Query<'a, E: Entity> {
    backend: &'a dyn StoreBackend,
    collection: String,
    criteria: CriteriaTree,
    base_query: Option<Document>,
    projection: Option<Projection>,
    sort: Option<Document>,
    offset: u64,
    limit: i64,
    batch_size: u32,
    index_hint: Option<String>,
    snapshot: bool,
    secondary_ok: bool,
    no_cursor_timeout: bool,
    validate_name: bool,
    validate_type: bool,
    _marker: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> Query<'a, E> {
    /// Creates an empty query over `E`'s collection.
    ///
    /// Validation is enabled, and secondary reads follow [`Entity::secondary_ok`].
    pub fn new(backend: &'a dyn StoreBackend) -> Self {
        Self {
            backend,
            collection: E::collection_name().to_string(),
            criteria: CriteriaTree::new(),
            base_query: None,
            projection: None,
            sort: None,
            offset: 0,
            limit: -1,
            batch_size: 0,
            index_hint: None,
            snapshot: false,
            secondary_ok: E::secondary_ok(),
            no_cursor_timeout: false,
            validate_name: true,
            validate_type: true,
            _marker: PhantomData,
        }
    }

    /// Creates a query whose compiled filter starts from `base`.
    pub fn with_base(backend: &'a dyn StoreBackend, base: Document) -> Self {
        let mut query = Self::new(backend);
        query.base_query = Some(base);
        query
    }

    /// Adds a criterion from a condition string such as `"stars >="` and a value.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IllegalCondition`] or
    /// [`DocumentStoreError::InvalidOperator`] for a malformed condition, and a
    /// validation error if the field or value does not fit the entity.
    pub fn filter(&mut self, condition: &str, value: impl Into<Bson>) -> DocumentStoreResult<&mut Self> {
        let (field, operator) = parse_condition(condition)?;
        let criteria = FieldCriteria::new::<E>(
            &field,
            operator,
            value.into(),
            false,
            self.validate_name,
            self.validate_type,
        )?;

        let root = self.criteria.root();
        self.criteria.add(root, Criteria::Field(criteria));

        Ok(self)
    }

    /// Adds a raw `$where` expression.
    pub fn where_expr(&mut self, expression: impl Into<WhereExpression>) -> &mut Self {
        let root = self.criteria.root();
        self.criteria.add(root, Criteria::Where(WhereCriteria::new(expression)));
        self
    }

    /// Starts a criterion on `field` at the query root.
    pub fn field<'q>(&'q mut self, field: &str) -> FieldEnd<'q, 'a, E, QueryScope> {
        let validate = self.validate_name;
        self.field_with_validation(field, validate)
    }

    /// Starts a criterion on `field` at the query root, with explicit name validation.
    pub fn field_with_validation<'q>(
        &'q mut self,
        field: &str,
        validate: bool,
    ) -> FieldEnd<'q, 'a, E, QueryScope> {
        let root = self.criteria.root();
        FieldEnd::new(self, Some(root), field, validate)
    }

    /// Opens a nested AND group under the root and starts a criterion on `field` in it.
    pub fn criteria<'q>(&'q mut self, field: &str) -> FieldEnd<'q, 'a, E, GroupScope> {
        let validate = self.validate_name;
        self.criteria_with_validation(field, validate)
    }

    /// Like [`Query::criteria`], with explicit name validation.
    pub fn criteria_with_validation<'q>(
        &'q mut self,
        field: &str,
        validate: bool,
    ) -> FieldEnd<'q, 'a, E, GroupScope> {
        FieldEnd::new(self, None, field, validate)
    }

    /// Starts another criterion on `field` inside an existing group.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IllegalState`] if `group` is not part of this query.
    pub fn criteria_for<'q>(
        &'q mut self,
        group: CriteriaRef,
        field: &str,
    ) -> DocumentStoreResult<FieldEnd<'q, 'a, E, GroupScope>> {
        if !self.criteria.contains(group) {
            return Err(DocumentStoreError::IllegalState(
                "the criteria group does not belong to this query".to_string(),
            ));
        }

        let validate = self.validate_name;
        Ok(FieldEnd::new(self, Some(group), field, validate))
    }

    /// Moves `groups` into a new OR group under the root and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IllegalState`] for the root or a foreign group.
    pub fn or(&mut self, groups: impl IntoIterator<Item = CriteriaRef>) -> DocumentStoreResult<CriteriaRef> {
        self.regroup(CriteriaJoin::Or, groups)
    }

    /// Moves `groups` into a new AND group under the root and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IllegalState`] for the root or a foreign group.
    pub fn and(&mut self, groups: impl IntoIterator<Item = CriteriaRef>) -> DocumentStoreResult<CriteriaRef> {
        self.regroup(CriteriaJoin::And, groups)
    }

    fn regroup(
        &mut self,
        join: CriteriaJoin,
        groups: impl IntoIterator<Item = CriteriaRef>,
    ) -> DocumentStoreResult<CriteriaRef> {
        let groups: Vec<CriteriaRef> = groups.into_iter().collect();
        let root = self.criteria.root();

        if groups
            .iter()
            .any(|group| *group == root || !self.criteria.contains(*group))
        {
            return Err(DocumentStoreError::IllegalState(
                "only nested groups of this query can be regrouped".to_string(),
            ));
        }

        let container = self.criteria.add_container(root, join);
        for group in groups {
            self.criteria.attach(group, container)?;
        }

        Ok(container)
    }

    pub(crate) fn open_group(&mut self) -> CriteriaRef {
        let root = self.criteria.root();
        self.criteria.add_container(root, CriteriaJoin::And)
    }

    pub(crate) fn add_criteria(&mut self, container: CriteriaRef, criteria: Criteria) {
        self.criteria.add(container, criteria);
    }

    /// Sets the sort from a comma separated list of fields, each optionally prefixed
    /// with `-` for descending order.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IllegalState`] while snapshot mode is enabled.
    pub fn order(&mut self, condition: &str) -> DocumentStoreResult<&mut Self> {
        if self.snapshot {
            return Err(DocumentStoreError::IllegalState(
                "order cannot be used on a snapshotted query".to_string(),
            ));
        }

        let mut sort = Document::new();
        for part in condition.split(',') {
            let part = part.trim();
            let (field, direction) = match part.strip_prefix('-') {
                Some(field) => (field.trim(), -1),
                None => (part, 1),
            };

            if !field.is_empty() {
                sort.insert(field, direction);
            }
        }

        self.sort = Some(sort);

        Ok(self)
    }

    /// Restricts the returned fields.
    ///
    /// With `include` set only the listed fields (and `_id`) are returned; otherwise the
    /// listed fields are left out. A later call replaces the field list.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IllegalState`] when switching between include and
    /// exclude mode.
    pub fn retrieved_fields<S: Into<String>>(
        &mut self,
        include: bool,
        fields: impl IntoIterator<Item = S>,
    ) -> DocumentStoreResult<&mut Self> {
        if let Some(previous) = &self.projection {
            if previous.include != include {
                return Err(DocumentStoreError::IllegalState(
                    "you cannot mix included and excluded fields together".to_string(),
                ));
            }
        }

        self.projection = Some(Projection {
            fields: fields.into_iter().map(Into::into).collect(),
            include,
        });

        Ok(self)
    }

    /// Limits the number of results. Zero or a negative value means no limit.
    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = limit;
        self
    }

    /// Sets how many documents the driver fetches per round trip. Zero keeps the default.
    pub fn batch_size(&mut self, batch_size: u32) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    /// Skips the first `skip` results.
    pub fn skip(&mut self, skip: u64) -> &mut Self {
        self.offset = skip;
        self
    }

    /// Same as [`Query::skip`].
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.skip(offset)
    }

    /// Asks the store to use the named index.
    pub fn hint_index(&mut self, index: impl Into<String>) -> &mut Self {
        self.index_hint = Some(index.into());
        self
    }

    /// Prevents documents moved during iteration from being returned twice.
    /// Not compatible with sorting or index hints.
    pub fn enable_snapshot_mode(&mut self) -> &mut Self {
        self.snapshot = true;
        self
    }

    pub fn disable_snapshot_mode(&mut self) -> &mut Self {
        self.snapshot = false;
        self
    }

    /// Allows reads from secondary members.
    pub fn query_non_primary(&mut self) -> &mut Self {
        self.secondary_ok = true;
        self
    }

    pub fn query_primary_only(&mut self) -> &mut Self {
        self.secondary_ok = false;
        self
    }

    /// Lets the server time out idle cursors (the default).
    pub fn enable_timeout(&mut self) -> &mut Self {
        self.no_cursor_timeout = false;
        self
    }

    /// Keeps the server from timing out idle cursors.
    pub fn disable_timeout(&mut self) -> &mut Self {
        self.no_cursor_timeout = true;
        self
    }

    /// Turns field name and value type validation on for criteria added from now on.
    pub fn enable_validation(&mut self) -> &mut Self {
        self.validate_name = true;
        self.validate_type = true;
        self
    }

    /// Turns field name and value type validation off for criteria added from now on.
    pub fn disable_validation(&mut self) -> &mut Self {
        self.validate_name = false;
        self.validate_type = false;
        self
    }

    /// Replaces the base filter the compiled criteria are merged onto.
    pub fn set_query_object(&mut self, base: Document) -> &mut Self {
        self.base_query = Some(base);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn get_offset(&self) -> u64 {
        self.offset
    }

    pub fn get_limit(&self) -> i64 {
        self.limit
    }

    pub fn get_batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn is_validating_names(&self) -> bool {
        self.validate_name
    }

    pub fn is_validating_types(&self) -> bool {
        self.validate_type
    }

    /// Returns the criteria tree built so far.
    pub fn criteria_tree(&self) -> &CriteriaTree {
        &self.criteria
    }

    /// Compiles the filter document: the base filter, overlaid with the criteria.
    pub fn query_object(&self) -> Document {
        let mut filter = self.base_query.clone().unwrap_or_default();

        for (key, value) in self.criteria.compile() {
            filter.insert(key, value);
        }

        filter
    }

    /// Compiles the projection document, or `None` if no fields were requested.
    pub fn fields_object(&self) -> Option<Document> {
        let projection = self.projection.as_ref()?;
        if projection.fields.is_empty() {
            return None;
        }

        Some(
            projection
                .fields
                .iter()
                .map(|field| (field.clone(), Bson::Boolean(projection.include)))
                .collect(),
        )
    }

    /// Returns the sort document, or `None` for natural order.
    pub fn sort_object(&self) -> Option<Document> {
        self.sort.clone()
    }

    /// Takes an immutable snapshot of the compiled query and its cursor options.
    pub fn spec(&self) -> QuerySpec {
        QuerySpec {
            collection: self.collection.clone(),
            filter: self.query_object(),
            projection: self.fields_object(),
            sort: self.sort_object(),
            offset: self.offset,
            limit: self.limit,
            batch_size: self.batch_size,
            hint: self.index_hint.clone(),
            snapshot: self.snapshot,
            secondary_ok: self.secondary_ok,
            no_cursor_timeout: self.no_cursor_timeout,
        }
    }

    /// Describes the configured cursor for the current state.
    pub fn prepare_cursor(&self) -> PreparedCursor {
        self.spec().prepare_cursor()
    }

    /// Counts the matching documents, ignoring projection, sort, skip and limit.
    pub async fn count_all(&self) -> DocumentStoreResult<u64> {
        let filter = self.query_object();
        log::trace!("executing count({}) for query: {filter}", self.collection);

        self.backend.count_documents(&self.collection, filter).await
    }

    /// Runs the query and returns a lazy stream of entities.
    pub async fn fetch(&self) -> DocumentStoreResult<ResultStream<E>> {
        self.open_entities(self.spec(), Mapper::document_to_entity::<E>)
            .await
    }

    /// Runs the query with an identity-only projection and returns a lazy stream of keys.
    pub async fn fetch_keys(&self) -> DocumentStoreResult<KeyStream<E>> {
        let spec = self.spec().with_projection(Some(identity_projection()));
        self.open_keys(spec).await
    }

    /// Runs the query with an identity-only projection and returns entities with every
    /// other field at its default value.
    pub async fn fetch_empty_entities(&self) -> DocumentStoreResult<ResultStream<E>>
    where
        E: Default,
    {
        let spec = self.spec().with_projection(Some(identity_projection()));
        self.open_entities(spec, Mapper::document_to_entity_with_defaults::<E>)
            .await
    }

    /// Runs the query and collects every entity, in cursor order.
    pub async fn as_list(&self) -> DocumentStoreResult<Vec<Arc<E>>> {
        let mut results = self.fetch().await?;
        let mut entities = Vec::new();

        while let Some(entity) = results.try_next().await? {
            entities.push(entity);
        }

        log::trace!(
            "as_list({}) returned {} results, cache: {}, for query: {}",
            self.collection,
            entities.len(),
            results.cache_stats(),
            self
        );

        Ok(entities)
    }

    /// Runs the query and collects every key, in cursor order.
    pub async fn as_key_list(&self) -> DocumentStoreResult<Vec<Key<E>>> {
        self.fetch_keys().await?.try_collect().await
    }

    /// Returns the first matching entity, or `None` if nothing matches.
    pub async fn get(&self) -> DocumentStoreResult<Option<Arc<E>>> {
        let spec = self.spec().with_limit(1);
        let mut results = self
            .open_entities(spec, Mapper::document_to_entity::<E>)
            .await?;

        results.try_next().await
    }

    /// Returns the key of the first matching entity, or `None` if nothing matches.
    pub async fn get_key(&self) -> DocumentStoreResult<Option<Key<E>>> {
        let spec = self
            .spec()
            .with_projection(Some(identity_projection()))
            .with_limit(1);
        let mut keys = self.open_keys(spec).await?;

        keys.try_next().await
    }

    async fn open_entities(
        &self,
        spec: QuerySpec,
        materialize: Materializer<E>,
    ) -> DocumentStoreResult<ResultStream<E>> {
        let documents = self.backend.open_cursor(self.trace_cursor(&spec)).await?;

        Ok(ResultStream::with_materializer(spec.collection, documents, materialize))
    }

    async fn open_keys(&self, spec: QuerySpec) -> DocumentStoreResult<KeyStream<E>> {
        let documents = self.backend.open_cursor(self.trace_cursor(&spec)).await?;

        Ok(KeyStream::new(documents))
    }

    fn trace_cursor(&self, spec: &QuerySpec) -> PreparedCursor {
        log::trace!(
            "running query({}): {}, fields: {:?}, offset: {}, limit: {}",
            spec.collection,
            spec.filter,
            spec.projection,
            spec.offset,
            spec.limit
        );

        spec.prepare_cursor()
    }
}

fn identity_projection() -> Document {
    doc! { ID_KEY: true }
}

impl<E: Entity> Clone for Query<'_, E> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend,
            collection: self.collection.clone(),
            criteria: self.criteria.clone(),
            base_query: self.base_query.clone(),
            projection: self.projection.clone(),
            sort: self.sort.clone(),
            offset: self.offset,
            limit: self.limit,
            batch_size: self.batch_size,
            index_hint: self.index_hint.clone(),
            snapshot: self.snapshot,
            secondary_ok: self.secondary_ok,
            no_cursor_timeout: self.no_cursor_timeout,
            validate_name: self.validate_name,
            validate_type: self.validate_type,
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Display for Query<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_object())
    }
}

impl<E: Entity> fmt::Debug for Query<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("collection", &self.collection)
            .field("filter", &self.query_object())
            .field("projection", &self.fields_object())
            .field("sort", &self.sort)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::{
        cursor::CursorFlag,
        testing::{Hotel, RecordingBackend},
    };

    fn hotels() -> Vec<Document> {
        vec![
            doc! { "_id": "ritz", "name": "Ritz", "stars": 5, "address": { "city": "Paris" } },
            doc! { "_id": "savoy", "name": "Savoy", "stars": 5, "address": { "city": "London" } },
        ]
    }

    #[test]
    fn filter_compiles_flat_at_the_root() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.filter("stars >=", 4).unwrap().filter("name", "Ritz").unwrap();

        assert_eq!(query.query_object(), doc! { "stars": { "$gte": 4 }, "name": "Ritz" });
        assert_eq!(query.to_string(), query.query_object().to_string());
    }

    #[test]
    fn filter_translates_mapped_names() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.filter("id in", vec!["ritz", "savoy"]).unwrap();
        query.filter("details.view", "sea").unwrap();

        assert_eq!(
            query.query_object(),
            doc! { "_id": { "$in": ["ritz", "savoy"] }, "extra.view": "sea" }
        );
    }

    #[test]
    fn filter_rejects_malformed_conditions() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);

        assert!(query.filter("", 1).unwrap_err().is_usage_error());
        assert!(matches!(
            query.filter("stars ~=", 1),
            Err(DocumentStoreError::InvalidOperator(_))
        ));
        assert!(query.filter("rating >", 1).unwrap_err().is_validation_error());
        assert!(query.criteria_tree().children(query.criteria_tree().root()).is_empty());
    }

    #[test]
    fn failed_group_criteria_leave_no_group_behind() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);

        assert!(query.criteria("rating").equal(3).unwrap_err().is_validation_error());
        assert!(query.criteria("stars").equal("five").unwrap_err().is_validation_error());
        assert!(query.criteria_tree().children(query.criteria_tree().root()).is_empty());

        let group = query.criteria("stars").equal(5).unwrap();
        assert_eq!(
            query.criteria_tree().children(query.criteria_tree().root()),
            &[Criteria::Container(group)]
        );
        assert_eq!(query.query_object(), doc! { "stars": 5 });
    }

    #[test]
    fn disabling_validation_applies_to_later_criteria() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.disable_validation();

        assert!(!query.is_validating_names());
        assert!(!query.is_validating_types());
        query.filter("rating >", "high").unwrap();
        query.filter("stars", "five").unwrap();

        assert_eq!(query.query_object(), doc! { "rating": { "$gt": "high" }, "stars": "five" });
    }

    #[test]
    fn nested_criteria_compile_into_groups() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        let group = query.criteria("stars").greater_than(2).unwrap();
        query
            .criteria_for(group, "stars")
            .unwrap()
            .less_than(5)
            .unwrap();
        query.filter("name", "Ritz").unwrap();

        assert_eq!(
            query.query_object(),
            doc! {
                "$and": [ { "stars": { "$gt": 2 } }, { "stars": { "$lt": 5 } } ],
                "name": "Ritz",
            }
        );
    }

    #[test]
    fn groups_can_be_regrouped_under_or() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        let paris = query.criteria("address.city").equal("Paris").unwrap();
        let cheap = query.criteria("stars").less_than(3).unwrap();
        query.or([paris, cheap]).unwrap();

        assert_eq!(
            query.query_object(),
            doc! { "$or": [ { "address.city": "Paris" }, { "stars": { "$lt": 3 } } ] }
        );

        let root = query.criteria_tree().root();
        assert!(query.or([root]).unwrap_err().is_usage_error());
    }

    #[test]
    fn where_expressions_are_kept_verbatim() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.where_expr("this.stars > 3");

        assert_eq!(query.query_object(), doc! { "$where": "this.stars > 3" });
    }

    #[test]
    fn criteria_win_over_the_base_filter() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::with_base(&backend, doc! { "name": "Savoy", "open": true });
        query.filter("name", "Ritz").unwrap();

        assert_eq!(query.query_object(), doc! { "name": "Ritz", "open": true });

        query.set_query_object(doc! { "stars": 5 });
        assert_eq!(query.query_object(), doc! { "stars": 5, "name": "Ritz" });
    }

    #[test]
    fn order_parses_directions() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.order("name, -stars,- address.city").unwrap();

        assert_eq!(
            query.sort_object(),
            Some(doc! { "name": 1, "stars": -1, "address.city": -1 })
        );
    }

    #[test]
    fn order_is_rejected_in_snapshot_mode() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.enable_snapshot_mode();

        assert!(query.order("name").unwrap_err().is_usage_error());

        query.disable_snapshot_mode();
        assert!(query.order("name").is_ok());
    }

    #[test]
    fn sort_set_before_snapshot_is_passed_through() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.order("name").unwrap();
        query.enable_snapshot_mode();

        let cursor = query.prepare_cursor();

        assert!(cursor.options().snapshot);
        assert_eq!(cursor.options().sort, Some(doc! { "name": 1 }));
        assert_eq!(cursor.options().hint, None);
    }

    #[test]
    fn projection_modes_cannot_be_mixed() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        assert_eq!(query.fields_object(), None);

        query.retrieved_fields(true, ["name", "stars"]).unwrap();
        assert!(query.retrieved_fields(false, ["tags"]).unwrap_err().is_usage_error());

        query.retrieved_fields(true, ["address"]).unwrap();
        assert_eq!(query.fields_object(), Some(doc! { "address": true }));
    }

    #[test]
    fn spec_snapshots_cursor_options() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query
            .skip(10)
            .limit(5)
            .batch_size(2)
            .hint_index("stars_1")
            .query_non_primary()
            .disable_timeout();

        let spec = query.spec();
        assert_eq!(spec.collection, "hotels");
        assert_eq!(spec.offset, 10);
        assert_eq!(spec.limit, 5);
        assert_eq!(spec.batch_size, 2);
        assert_eq!(spec.hint.as_deref(), Some("stars_1"));
        assert!(spec.secondary_ok);
        assert!(spec.no_cursor_timeout);

        query.query_primary_only().enable_timeout().offset(3);
        let cursor = query.prepare_cursor();
        assert_eq!(cursor.options().skip, Some(3));
        assert!(cursor.options().flags.is_empty());
    }

    #[test]
    fn clones_are_independent() {
        let backend = RecordingBackend::default();
        let mut query = Query::<Hotel>::new(&backend);
        query.filter("name", "Ritz").unwrap();

        let mut copy = query.clone();
        copy.filter("stars", 5).unwrap().limit(1);

        assert_eq!(query.query_object(), doc! { "name": "Ritz" });
        assert_eq!(query.get_limit(), -1);
        assert_eq!(copy.query_object(), doc! { "name": "Ritz", "stars": 5 });
    }

    #[tokio::test]
    async fn count_all_uses_the_filter_only() {
        let backend = RecordingBackend::with_documents(hotels());
        let mut query = Query::<Hotel>::new(&backend);
        query.filter("stars", 5).unwrap().limit(1).skip(1);

        assert_eq!(query.count_all().await.unwrap(), 2);
        assert_eq!(backend.counts(), vec![doc! { "stars": 5 }]);
        assert!(backend.cursors().is_empty());
    }

    #[tokio::test]
    async fn fetch_keys_overrides_projection_on_a_snapshot() {
        let backend = RecordingBackend::with_documents(hotels());
        let mut query = Query::<Hotel>::new(&backend);
        query.retrieved_fields(false, ["tags"]).unwrap();

        let keys = query.as_key_list().await.unwrap();

        assert_eq!(keys, vec![Key::new("ritz"), Key::new("savoy")]);
        assert_eq!(backend.last_cursor().projection(), Some(&doc! { "_id": true }));
        assert_eq!(query.fields_object(), Some(doc! { "tags": false }));
    }

    #[tokio::test]
    async fn get_forces_a_limit_of_one() {
        let backend = RecordingBackend::with_documents(hotels());
        let mut query = Query::<Hotel>::new(&backend);
        query.limit(20);

        let hotel = query.get().await.unwrap().unwrap();
        assert_eq!(hotel.id, "ritz");
        assert_eq!(backend.last_cursor().options().limit, Some(1));

        let key = query.get_key().await.unwrap().unwrap();
        assert_eq!(key, Key::new("ritz"));
        assert_eq!(backend.last_cursor().options().limit, Some(1));
        assert_eq!(query.get_limit(), 20);
    }

    #[tokio::test]
    async fn get_returns_none_without_matches() {
        let backend = RecordingBackend::default();
        let query = Query::<Hotel>::new(&backend);

        assert!(query.get().await.unwrap().is_none());
        assert!(query.get_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn as_list_materializes_in_cursor_order() {
        let backend = RecordingBackend::with_documents(hotels());
        let mut query = Query::<Hotel>::new(&backend);
        query.query_non_primary();

        let names: Vec<_> = query
            .as_list()
            .await
            .unwrap()
            .iter()
            .map(|hotel| hotel.name.clone())
            .collect();

        assert_eq!(names, vec!["Ritz", "Savoy"]);
        assert!(backend.last_cursor().options().has_flag(CursorFlag::SecondaryOk));
    }

    #[tokio::test]
    async fn empty_entities_keep_only_the_identity() {
        let backend = RecordingBackend::with_documents(vec![doc! { "_id": "ritz" }]);
        let query = Query::<Hotel>::new(&backend);

        let mut results = query.fetch_empty_entities().await.unwrap();
        let hotel = results.try_next().await.unwrap().unwrap();

        assert_eq!(backend.last_cursor().projection(), Some(&doc! { "_id": true }));
        assert_eq!(*hotel, Hotel { id: "ritz".to_string(), ..Hotel::default() });
    }
}
