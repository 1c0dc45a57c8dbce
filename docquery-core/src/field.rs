//! Field-scoped criteria builders.
//!
//! [`Query::field`] and [`Query::criteria`] return a [`FieldEnd`] naming one field. Calling
//! an operator method on it appends a complete field criterion to the scoped container.
//! Scoped to the query root, the builder hands the query back for chaining; scoped to a
//! nested group, it hands back the group's [`CriteriaRef`] so the group can be regrouped
//! with [`Query::or`] or [`Query::and`].

use bson::{Bson, doc};
use std::marker::PhantomData;

use crate::{
    criteria::{Criteria, CriteriaRef, FieldCriteria},
    entity::Entity,
    error::DocumentStoreResult,
    operator::Operator,
    query::Query,
};

/// Decides what a [`FieldEnd`] returns once its criterion is added.
pub trait FieldScope<'q, 'a: 'q, E: Entity> {
    type Output;

    fn finish(query: &'q mut Query<'a, E>, container: CriteriaRef) -> Self::Output;
}

/// Criteria are added to the query root; the query is returned.
#[derive(Debug)]
pub struct QueryScope;

impl<'q, 'a: 'q, E: Entity> FieldScope<'q, 'a, E> for QueryScope {
    type Output = &'q mut Query<'a, E>;

    fn finish(query: &'q mut Query<'a, E>, _container: CriteriaRef) -> Self::Output {
        query
    }
}

/// Criteria are added to a nested group; the group is returned.
#[derive(Debug)]
pub struct GroupScope;

impl<'q, 'a: 'q, E: Entity> FieldScope<'q, 'a, E> for GroupScope {
    type Output = CriteriaRef;

    fn finish(_query: &'q mut Query<'a, E>, container: CriteriaRef) -> Self::Output {
        container
    }
}

/// Builder for a single criterion on a named field.
pub struct FieldEnd<'q, 'a, E: Entity, S> {
    query: &'q mut Query<'a, E>,
    /// `None` opens a new AND group under the root once the criterion is valid.
    container: Option<CriteriaRef>,
    field: String,
    validate_name: bool,
    negated: bool,
    _scope: PhantomData<S>,
}

impl<'q, 'a: 'q, E: Entity, S: FieldScope<'q, 'a, E>> FieldEnd<'q, 'a, E, S> {
    pub(crate) fn new(
        query: &'q mut Query<'a, E>,
        container: Option<CriteriaRef>,
        field: &str,
        validate_name: bool,
    ) -> Self {
        Self {
            query,
            container,
            field: field.to_string(),
            validate_name,
            negated: false,
            _scope: PhantomData,
        }
    }

    /// Negates the criterion added next.
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn exists(self) -> DocumentStoreResult<S::Output> {
        self.op(Operator::Exists, true)
    }

    pub fn does_not_exist(self) -> DocumentStoreResult<S::Output> {
        self.op(Operator::Exists, false)
    }

    pub fn equal(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::Equal, value)
    }

    pub fn not_equal(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::NotEqual, value)
    }

    pub fn greater_than(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::GreaterThan, value)
    }

    pub fn greater_than_or_eq(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::GreaterThanOrEqual, value)
    }

    pub fn less_than(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::LessThan, value)
    }

    pub fn less_than_or_eq(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::LessThanOrEqual, value)
    }

    /// Matches arrays containing `value` (plain equality on scalar fields).
    pub fn has_this_one(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::Equal, value)
    }

    pub fn has_any_of<V: Into<Bson>>(
        self,
        values: impl IntoIterator<Item = V>,
    ) -> DocumentStoreResult<S::Output> {
        self.op(Operator::In, collect(values))
    }

    pub fn has_none_of<V: Into<Bson>>(
        self,
        values: impl IntoIterator<Item = V>,
    ) -> DocumentStoreResult<S::Output> {
        self.op(Operator::NotIn, collect(values))
    }

    pub fn has_all_of<V: Into<Bson>>(
        self,
        values: impl IntoIterator<Item = V>,
    ) -> DocumentStoreResult<S::Output> {
        self.op(Operator::All, collect(values))
    }

    /// Matches arrays with at least one element matching the given sub-query document.
    pub fn has_this_element(self, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        self.op(Operator::ElementMatch, value)
    }

    pub fn size_eq(self, size: i32) -> DocumentStoreResult<S::Output> {
        self.op(Operator::Size, size)
    }

    /// Sorts by distance to the point `(x, y)`.
    pub fn near(self, x: f64, y: f64) -> DocumentStoreResult<S::Output> {
        self.op(Operator::Near, vec![Bson::Double(x), Bson::Double(y)])
    }

    /// Matches locations inside the circle centered on `(x, y)`.
    pub fn within(self, x: f64, y: f64, radius: f64) -> DocumentStoreResult<S::Output> {
        self.op(Operator::Within, doc! { "$center": [[x, y], radius] })
    }

    /// Adds a criterion with an arbitrary operator.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the field path does not resolve or the value does
    /// not fit the field, while validation is enabled.
    pub fn op(self, operator: Operator, value: impl Into<Bson>) -> DocumentStoreResult<S::Output> {
        let criteria = FieldCriteria::new::<E>(
            &self.field,
            operator,
            value.into(),
            self.negated,
            self.validate_name,
            self.query.is_validating_types(),
        )?;

        let container = match self.container {
            Some(container) => container,
            None => self.query.open_group(),
        };
        self.query.add_criteria(container, Criteria::Field(criteria));

        Ok(S::finish(self.query, container))
    }
}

fn collect<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> Bson {
    Bson::Array(values.into_iter().map(Into::into).collect())
}
