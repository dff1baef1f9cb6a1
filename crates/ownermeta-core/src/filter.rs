//! Metadata predicates for collection queries
//!
//! A [`MetaFilter`] describes one condition on one metadata key. Backends
//! translate filters into their own query language; operator validation happens
//! here, before anything reaches a backend.

use crate::error::{MetaError, MetaResult};
use crate::value::{encode, MetaValue};
use std::fmt;
use std::str::FromStr;

/// Comparison operator for [`MetaFilter::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    /// `!=`
    Ne,
    /// `<>`, same meaning as `!=`
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Eq,
        Operator::Ne,
        Operator::NotEq,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Ordering operators compare numerically.
    ///
    /// Values filtered with `<`, `<=`, `>` or `>=` must be stored as numeric
    /// text; for anything else the result depends on the backend's numeric cast.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| MetaError::InvalidOperator(s.to_string()))
    }
}

/// One predicate over an owner's metadata
#[derive(Debug, Clone, PartialEq)]
pub enum MetaFilter {
    /// Owner has a record for at least one of these keys
    KeyExists(Vec<String>),

    /// Owner has a record for `key` whose value compares to `operand`.
    ///
    /// `operand` is already in stored-text form, so equality is always
    /// text-against-encoded-text.
    Compare {
        key: String,
        op: Operator,
        operand: String,
    },
}

impl MetaFilter {
    pub fn key_exists<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        MetaFilter::KeyExists(keys.into_iter().map(Into::into).collect())
    }

    /// Build a comparison from a textual operator
    ///
    /// Fails with [`MetaError::InvalidOperator`] before the value is touched.
    pub fn compare(
        key: impl Into<String>,
        op: &str,
        value: impl Into<MetaValue>,
    ) -> MetaResult<Self> {
        let op = op.parse::<Operator>()?;
        Self::compare_with(key, op, value)
    }

    pub fn compare_with(
        key: impl Into<String>,
        op: Operator,
        value: impl Into<MetaValue>,
    ) -> MetaResult<Self> {
        let encoded = encode(&value.into())?;
        Ok(MetaFilter::Compare {
            key: key.into(),
            op,
            operand: encoded.value,
        })
    }

    /// Implicit `=` comparison
    pub fn equals(key: impl Into<String>, value: impl Into<MetaValue>) -> MetaResult<Self> {
        Self::compare_with(key, Operator::Eq, value)
    }
}
