//! The criteria tree: composable predicates and their compilation to filter documents.
//!
//! Criteria live in a [`CriteriaTree`], an arena of containers. Every container holds an
//! ordered list of children (field comparisons, `$where` expressions, or other
//! containers) and is joined with AND or OR. Containers refer to their parent by
//! [`CriteriaRef`], so a container can be moved under a new parent without reference
//! cycles.
//!
//! # Compilation
//!
//! - The root container is an AND whose children are merged into one flat document.
//! - Any other container with two or more children compiles to `{ "$and": [...] }` or
//!   `{ "$or": [...] }`. A single child compiles to that child's document, and an empty
//!   container contributes nothing.
//! - A field comparison compiles to `{ path: value }` for equality and
//!   `{ path: { "$op": value } }` for every other operator.

use bson::{Bson, Document, JavaScriptCodeWithScope, doc};

use crate::{
    entity::Entity,
    error::{DocumentStoreError, DocumentStoreResult},
    mapper::Mapper,
    operator::{Operator, translate},
};

/// How the children of a container combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaJoin {
    And,
    Or,
}

impl CriteriaJoin {
    fn native(&self) -> &'static str {
        match self {
            CriteriaJoin::And => "$and",
            CriteriaJoin::Or => "$or",
        }
    }
}

/// Handle to a container in a [`CriteriaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CriteriaRef(usize);

/// A single comparison of a field against a bound value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCriteria {
    path: String,
    operator: Operator,
    value: Bson,
    negated: bool,
    validate_name: bool,
    validate_type: bool,
}

impl FieldCriteria {
    /// Builds a field comparison for entity `E`.
    ///
    /// With `validate_name` set, the path is resolved against the mapped shape of `E`
    /// and replaced by its canonical stored path. With `validate_type` also set, the
    /// value is checked against the declared type of the resolved field.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnknownField`] or [`DocumentStoreError::TypeMismatch`]
    /// when validation fails.
    pub fn new<E: Entity>(
        field: &str,
        operator: Operator,
        value: Bson,
        negated: bool,
        validate_name: bool,
        validate_type: bool,
    ) -> DocumentStoreResult<Self> {
        let mut path = field.to_string();

        if validate_name {
            let resolved = Mapper::validate_field_path::<E>(field)?;

            if validate_type {
                if let Some(kind) = &resolved.kind {
                    Mapper::check_value_type(&resolved.path, kind, operator, &value)?;
                }
            }

            path = resolved.path;
        }

        Ok(Self {
            path,
            operator,
            value,
            negated,
            validate_name,
            validate_type,
        })
    }

    /// Returns the (canonical, when validated) field path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the comparison operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Returns the bound value.
    pub fn value(&self) -> &Bson {
        &self.value
    }

    /// Returns whether the comparison is negated.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Returns whether the path was validated against the entity mapping.
    pub fn validates_name(&self) -> bool {
        self.validate_name
    }

    /// Returns whether the value was checked against the declared field type.
    pub fn validates_type(&self) -> bool {
        self.validate_type
    }

    /// Compiles this comparison into a single-key filter document.
    pub fn compile(&self) -> Document {
        let condition = match (self.operator, self.negated) {
            (Operator::Equal, false) => self.value.clone(),
            (Operator::Equal, true) => Bson::Document(doc! { "$ne": self.value.clone() }),
            (operator, false) => Bson::Document(doc! { operator.native(): self.value.clone() }),
            (operator, true) => Bson::Document(doc! {
                "$not": { operator.native(): self.value.clone() },
            }),
        };

        doc! { self.path.clone(): condition }
    }
}

/// A raw server-side expression evaluated by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereExpression {
    /// JavaScript source.
    Code(String),
    /// JavaScript source with a scope document.
    CodeWithScope(JavaScriptCodeWithScope),
}

impl From<&str> for WhereExpression {
    fn from(code: &str) -> Self {
        WhereExpression::Code(code.to_string())
    }
}

impl From<String> for WhereExpression {
    fn from(code: String) -> Self {
        WhereExpression::Code(code)
    }
}

impl From<JavaScriptCodeWithScope> for WhereExpression {
    fn from(code: JavaScriptCodeWithScope) -> Self {
        WhereExpression::CodeWithScope(code)
    }
}

/// A `$where` clause. Never validated.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCriteria {
    expression: WhereExpression,
}

impl WhereCriteria {
    pub fn new(expression: impl Into<WhereExpression>) -> Self {
        Self { expression: expression.into() }
    }

    pub fn compile(&self) -> Document {
        match &self.expression {
            WhereExpression::Code(code) => doc! { "$where": code.clone() },
            WhereExpression::CodeWithScope(code) => doc! { "$where": code.clone() },
        }
    }
}

/// One child of a container.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    Field(FieldCriteria),
    Where(WhereCriteria),
    Container(CriteriaRef),
}

#[derive(Debug, Clone)]
struct ContainerNode {
    join: CriteriaJoin,
    children: Vec<Criteria>,
    parent: Option<CriteriaRef>,
}

/// Arena holding every container of one query. The root is an AND container.
#[derive(Debug, Clone)]
pub struct CriteriaTree {
    nodes: Vec<ContainerNode>,
}

impl Default for CriteriaTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CriteriaTree {
    /// Creates a tree holding only an empty root AND container.
    pub fn new() -> Self {
        Self {
            nodes: vec![ContainerNode {
                join: CriteriaJoin::And,
                children: Vec::new(),
                parent: None,
            }],
        }
    }

    /// Returns the root container.
    pub fn root(&self) -> CriteriaRef {
        CriteriaRef(0)
    }

    /// Returns whether `container` belongs to this tree.
    pub fn contains(&self, container: CriteriaRef) -> bool {
        container.0 < self.nodes.len()
    }

    /// Returns the join of a container.
    ///
    /// # Panics
    ///
    /// Panics if `container` was not created by this tree.
    pub fn join(&self, container: CriteriaRef) -> CriteriaJoin {
        self.nodes[container.0].join
    }

    /// Returns the parent of a container, `None` for the root.
    pub fn parent(&self, container: CriteriaRef) -> Option<CriteriaRef> {
        self.nodes[container.0].parent
    }

    /// Returns the children of a container in insertion order.
    pub fn children(&self, container: CriteriaRef) -> &[Criteria] {
        &self.nodes[container.0].children
    }

    /// Appends a criterion to a container. No deduplication or simplification happens.
    pub fn add(&mut self, container: CriteriaRef, criteria: Criteria) {
        if let Criteria::Container(child) = criteria {
            self.nodes[child.0].parent = Some(container);
        }

        self.nodes[container.0].children.push(criteria);
    }

    /// Creates a new empty container and attaches it to `parent`.
    pub fn add_container(&mut self, parent: CriteriaRef, join: CriteriaJoin) -> CriteriaRef {
        let id = CriteriaRef(self.nodes.len());
        self.nodes.push(ContainerNode { join, children: Vec::new(), parent: None });
        self.add(parent, Criteria::Container(id));

        id
    }

    /// Moves `container` (and everything below it) under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IllegalState`] when moving the root, or when
    /// `parent` is `container` itself or one of its descendants.
    pub fn attach(&mut self, container: CriteriaRef, parent: CriteriaRef) -> DocumentStoreResult<()> {
        if !self.contains(container) || !self.contains(parent) {
            return Err(DocumentStoreError::IllegalState(
                "the criteria container does not belong to this query".to_string(),
            ));
        }

        if container == self.root() {
            return Err(DocumentStoreError::IllegalState(
                "the root criteria container cannot be attached elsewhere".to_string(),
            ));
        }

        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == container {
                return Err(DocumentStoreError::IllegalState(
                    "a criteria container cannot be attached below itself".to_string(),
                ));
            }
            ancestor = self.parent(current);
        }

        if let Some(previous) = self.nodes[container.0].parent {
            self.nodes[previous.0]
                .children
                .retain(|child| *child != Criteria::Container(container));
        }

        self.add(parent, Criteria::Container(container));

        Ok(())
    }

    /// Compiles the whole tree, starting at the root, into a filter document.
    pub fn compile(&self) -> Document {
        let mut filter = Document::new();

        for child in self.children(self.root()) {
            if let Some(compiled) = self.compile_child(child) {
                merge_into(&mut filter, compiled);
            }
        }

        filter
    }

    fn compile_child(&self, child: &Criteria) -> Option<Document> {
        match child {
            Criteria::Field(field) => Some(field.compile()),
            Criteria::Where(clause) => Some(clause.compile()),
            Criteria::Container(container) => self.compile_container(*container),
        }
    }

    fn compile_container(&self, container: CriteriaRef) -> Option<Document> {
        let node = &self.nodes[container.0];
        let mut compiled: Vec<Document> = node
            .children
            .iter()
            .filter_map(|child| self.compile_child(child))
            .collect();

        match compiled.len() {
            0 => None,
            1 => compiled.pop(),
            _ => Some(doc! {
                node.join.native(): compiled.into_iter().map(Bson::Document).collect::<Vec<_>>(),
            }),
        }
    }
}

/// Merges one compiled child into the flat root document.
///
/// Two operator documents on the same field are combined when they share no operator.
/// Every other collision keeps both constraints by moving the later one into `$and`.
fn merge_into(target: &mut Document, source: Document) {
    for (key, value) in source {
        if !target.contains_key(&key) {
            target.insert(key, value);
            continue;
        }

        let leftover = match (target.get_mut(&key), value) {
            (Some(Bson::Array(existing)), Bson::Array(more)) if key == "$and" => {
                existing.extend(more);
                None
            }
            (Some(Bson::Document(existing)), Bson::Document(more))
                if is_operator_document(existing)
                    && is_operator_document(&more)
                    && more.keys().all(|op| !existing.contains_key(op)) =>
            {
                for (op, arg) in more {
                    existing.insert(op, arg);
                }
                None
            }
            (_, value) => Some(value),
        };

        if let Some(value) = leftover {
            log::debug!("criteria on '{key}' collide at the root, moving the later one into $and");
            push_conjunct(target, doc! { key: value });
        }
    }
}

fn push_conjunct(target: &mut Document, conjunct: Document) {
    match target.get_mut("$and") {
        Some(Bson::Array(conjuncts)) => conjuncts.push(Bson::Document(conjunct)),
        _ => {
            target.insert("$and", vec![Bson::Document(conjunct)]);
        }
    }
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

/// Splits a condition string such as `"age >="` into its field and operator.
///
/// The condition is trimmed and split on single spaces. One token means equality; the
/// second token is translated as the operator. Up to six tokens are accepted, tokens
/// after the second are ignored.
///
/// # Errors
///
/// Returns [`DocumentStoreError::IllegalCondition`] for an empty condition or more than
/// six tokens, and [`DocumentStoreError::InvalidOperator`] for an unknown operator.
pub fn parse_condition(condition: &str) -> DocumentStoreResult<(String, Operator)> {
    let trimmed = condition.trim();
    let parts: Vec<&str> = trimmed.split(' ').collect();

    if trimmed.is_empty() || parts.len() > 6 {
        return Err(DocumentStoreError::IllegalCondition(condition.to_string()));
    }

    if parts.len() > 2 {
        log::warn!("ignoring trailing tokens {:?} in filter condition '{condition}'", &parts[2..]);
    }

    let field = parts[0].trim().to_string();
    let operator = match parts.get(1) {
        Some(token) => translate(token)?,
        None => Operator::Equal,
    };

    Ok((field, operator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Hotel;

    fn field(path: &str, operator: Operator, value: impl Into<Bson>) -> Criteria {
        Criteria::Field(
            FieldCriteria::new::<Hotel>(path, operator, value.into(), false, true, true).unwrap(),
        )
    }

    #[test]
    fn root_and_is_flattened() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        tree.add(root, field("name", Operator::Equal, "Ritz"));
        tree.add(root, field("stars", Operator::GreaterThanOrEqual, 4));

        assert_eq!(tree.compile(), doc! { "name": "Ritz", "stars": { "$gte": 4 } });
    }

    #[test]
    fn nested_containers_are_wrapped() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        let group = tree.add_container(root, CriteriaJoin::And);
        tree.add(group, field("stars", Operator::GreaterThan, 2));
        tree.add(group, field("stars", Operator::LessThan, 5));
        tree.add(root, field("name", Operator::Equal, "Ritz"));

        assert_eq!(
            tree.compile(),
            doc! {
                "$and": [ { "stars": { "$gt": 2 } }, { "stars": { "$lt": 5 } } ],
                "name": "Ritz",
            }
        );
    }

    #[test]
    fn or_containers_are_wrapped() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        let any = tree.add_container(root, CriteriaJoin::Or);
        tree.add(any, field("name", Operator::Equal, "Ritz"));
        tree.add(any, field("name", Operator::Equal, "Savoy"));

        assert_eq!(
            tree.compile(),
            doc! { "$or": [ { "name": "Ritz" }, { "name": "Savoy" } ] }
        );
    }

    #[test]
    fn single_child_and_empty_containers() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        let single = tree.add_container(root, CriteriaJoin::Or);
        tree.add(single, field("stars", Operator::Equal, 3));
        tree.add_container(root, CriteriaJoin::And);

        assert_eq!(tree.compile(), doc! { "stars": 3 });
    }

    #[test]
    fn operators_on_the_same_field_merge() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        tree.add(root, field("stars", Operator::GreaterThan, 2));
        tree.add(root, field("stars", Operator::LessThanOrEqual, 4));

        assert_eq!(tree.compile(), doc! { "stars": { "$gt": 2, "$lte": 4 } });
    }

    #[test]
    fn colliding_keys_are_kept_under_and() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        tree.add(root, field("name", Operator::Equal, "Ritz"));
        tree.add(root, field("name", Operator::Equal, "Savoy"));
        tree.add(root, field("stars", Operator::GreaterThan, 2));
        tree.add(root, field("stars", Operator::GreaterThan, 3));

        assert_eq!(
            tree.compile(),
            doc! {
                "name": "Ritz",
                "$and": [ { "name": "Savoy" }, { "stars": { "$gt": 3 } } ],
                "stars": { "$gt": 2 },
            }
        );
    }

    #[test]
    fn two_or_groups_at_the_root_stay_conjunctive() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        for (a, b) in [("Ritz", "Savoy"), ("Plaza", "Adlon")] {
            let any = tree.add_container(root, CriteriaJoin::Or);
            tree.add(any, field("name", Operator::Equal, a));
            tree.add(any, field("name", Operator::Equal, b));
        }

        assert_eq!(
            tree.compile(),
            doc! {
                "$or": [ { "name": "Ritz" }, { "name": "Savoy" } ],
                "$and": [ { "$or": [ { "name": "Plaza" }, { "name": "Adlon" } ] } ],
            }
        );
    }

    #[test]
    fn negated_criteria() {
        let gt = FieldCriteria::new::<Hotel>("stars", Operator::GreaterThan, 3.into(), true, true, true)
            .unwrap();
        let eq = FieldCriteria::new::<Hotel>("name", Operator::Equal, "Ritz".into(), true, true, true)
            .unwrap();

        assert_eq!(gt.compile(), doc! { "stars": { "$not": { "$gt": 3 } } });
        assert_eq!(eq.compile(), doc! { "name": { "$ne": "Ritz" } });
    }

    #[test]
    fn where_criteria_compile_verbatim() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        tree.add(root, Criteria::Where(WhereCriteria::new("this.stars > 3")));

        assert_eq!(tree.compile(), doc! { "$where": "this.stars > 3" });
    }

    #[test]
    fn attach_moves_containers() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        let a = tree.add_container(root, CriteriaJoin::And);
        tree.add(a, field("name", Operator::Equal, "Ritz"));
        let b = tree.add_container(root, CriteriaJoin::And);
        tree.add(b, field("name", Operator::Equal, "Savoy"));
        let any = tree.add_container(root, CriteriaJoin::Or);

        tree.attach(a, any).unwrap();
        tree.attach(b, any).unwrap();

        assert_eq!(tree.children(root), &[Criteria::Container(any)]);
        assert_eq!(tree.parent(a), Some(any));
        assert_eq!(
            tree.compile(),
            doc! { "$or": [ { "name": "Ritz" }, { "name": "Savoy" } ] }
        );
    }

    #[test]
    fn attach_rejects_cycles_and_the_root() {
        let mut tree = CriteriaTree::new();
        let root = tree.root();
        let outer = tree.add_container(root, CriteriaJoin::Or);
        let inner = tree.add_container(outer, CriteriaJoin::And);

        assert!(matches!(tree.attach(root, outer), Err(DocumentStoreError::IllegalState(_))));
        assert!(matches!(tree.attach(outer, outer), Err(DocumentStoreError::IllegalState(_))));
        assert!(matches!(tree.attach(outer, inner), Err(DocumentStoreError::IllegalState(_))));
    }

    #[test]
    fn parses_conditions() {
        assert_eq!(parse_condition("age").unwrap(), ("age".to_string(), Operator::Equal));
        assert_eq!(
            parse_condition("  age >= ").unwrap(),
            ("age".to_string(), Operator::GreaterThanOrEqual)
        );
        assert_eq!(
            parse_condition("tags in extra tokens").unwrap(),
            ("tags".to_string(), Operator::In)
        );
    }

    #[test]
    fn rejects_illegal_conditions() {
        assert!(matches!(parse_condition("   "), Err(DocumentStoreError::IllegalCondition(_))));
        assert!(matches!(
            parse_condition("a > b c d e f"),
            Err(DocumentStoreError::IllegalCondition(_))
        ));
        assert!(matches!(parse_condition("age ~"), Err(DocumentStoreError::InvalidOperator(_))));
    }
}
