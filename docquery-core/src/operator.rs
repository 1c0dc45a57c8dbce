//! Comparison operators and their textual and native representations.
//!
//! Condition strings such as `"age >="` carry the operator as a token. This module
//! translates those tokens into [`Operator`] tags and maps every tag to the reserved
//! `$`-prefixed key used by the store's query grammar.

use std::{fmt, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Comparison operators understood by the query compiler.
///
/// The set is closed: unknown tokens are rejected by [`translate`], never mapped to
/// a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal to. Compiles to a bare `{ field: value }` pair.
    Equal,
    /// Not equal to (`$ne`).
    NotEqual,
    /// Greater than (`$gt`).
    GreaterThan,
    /// Greater than or equal to (`$gte`).
    GreaterThanOrEqual,
    /// Less than (`$lt`).
    LessThan,
    /// Less than or equal to (`$lte`).
    LessThanOrEqual,
    /// Value is one of the given values (`$in`).
    In,
    /// Value is none of the given values (`$nin`).
    NotIn,
    /// Array contains all of the given values (`$all`).
    All,
    /// Field exists or does not exist (`$exists`).
    Exists,
    /// At least one array element matches the sub-query (`$elemMatch`).
    ElementMatch,
    /// Array has exactly the given length (`$size`).
    Size,
    /// Location lies within the given shape (`$within`).
    Within,
    /// Sort by proximity to the given point (`$near`).
    Near,
}

impl Operator {
    /// Returns the store's native operator key for this tag.
    ///
    /// [`Operator::Equal`] has no operator key on the wire; `$eq` is returned for
    /// completeness but the compiler emits equality as a bare value.
    pub fn native(&self) -> &'static str {
        match self {
            Operator::Equal => "$eq",
            Operator::NotEqual => "$ne",
            Operator::GreaterThan => "$gt",
            Operator::GreaterThanOrEqual => "$gte",
            Operator::LessThan => "$lt",
            Operator::LessThanOrEqual => "$lte",
            Operator::In => "$in",
            Operator::NotIn => "$nin",
            Operator::All => "$all",
            Operator::Exists => "$exists",
            Operator::ElementMatch => "$elemMatch",
            Operator::Size => "$size",
            Operator::Within => "$within",
            Operator::Near => "$near",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native())
    }
}

impl FromStr for Operator {
    type Err = DocumentStoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        translate(token)
    }
}

/// Converts a textual operator (`">"`, `"<="`, `"in"`, ...) into an [`Operator`].
///
/// Surrounding whitespace is ignored. Symbolic tokens are matched exactly; `=` and `==`
/// are both equality, `!=` and `<>` are both inequality. Alphabetic tokens are matched
/// case-insensitively.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidOperator`] for any other token.
pub fn translate(token: &str) -> DocumentStoreResult<Operator> {
    let token = token.trim();

    let operator = match token {
        "=" | "==" => Operator::Equal,
        ">" => Operator::GreaterThan,
        ">=" => Operator::GreaterThanOrEqual,
        "<" => Operator::LessThan,
        "<=" => Operator::LessThanOrEqual,
        "!=" | "<>" => Operator::NotEqual,
        _ => match token.to_ascii_lowercase().as_str() {
            "in" => Operator::In,
            "nin" => Operator::NotIn,
            "all" => Operator::All,
            "exists" => Operator::Exists,
            "elem" => Operator::ElementMatch,
            "size" => Operator::Size,
            "within" => Operator::Within,
            "near" => Operator::Near,
            _ => return Err(DocumentStoreError::InvalidOperator(token.to_string())),
        },
    };

    Ok(operator)
}
