// ── Query engine ──
//
// Declarative predicates over device attributes. Query subscribers are
// re-evaluated against the post-patch device on every delta, so a
// subscription can start or stop matching as state changes.

mod eval;

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use eval::Outcome;

/// A predicate over one device.
///
/// Leaf predicates address an attribute by dotted path (see
/// [`Device::lookup`](crate::model::Device::lookup)). Connectives combine
/// outcomes with three-valued logic: a predicate on an absent attribute
/// yields [`Outcome::Missing`], which is never a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Query {
    /// Matches every device.
    All,
    Eq { path: String, value: Value },
    Ne { path: String, value: Value },
    Lt { path: String, value: Value },
    Le { path: String, value: Value },
    Gt { path: String, value: Value },
    Ge { path: String, value: Value },
    /// Substring for strings, element membership for arrays.
    Contains { path: String, value: Value },
    /// Attribute equals one of `values` (must be an array).
    In { path: String, values: Value },
    /// Attribute is a string matching the regular expression.
    Matches { path: String, pattern: Pattern },
    /// Attribute is present (JSON `null` counts as present).
    Exists { path: String },
    And { all: Vec<Query> },
    Or { any: Vec<Query> },
    Not { not: Box<Query> },
}

/// A query that cannot be evaluated against any device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Malformed query: {reason}")]
    Malformed { reason: String },
}

impl QueryError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

// ── Pattern ──────────────────────────────────────────────────────────

/// Regular expression source, compiled on first evaluation and kept with
/// the query (and its clones) from then on.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Pattern {
    source: String,
    compiled: OnceLock<Result<Regex, String>>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            compiled: OnceLock::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn regex(&self) -> Result<&Regex, &str> {
        self.compiled
            .get_or_init(|| Regex::new(&self.source).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(String::as_str)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

// ── Builders ─────────────────────────────────────────────────────────

impl Query {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self::Exists { path: path.into() }
    }

    pub fn matches(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Matches {
            path: path.into(),
            pattern: Pattern::new(pattern),
        }
    }

    pub fn and(all: impl IntoIterator<Item = Query>) -> Self {
        Self::And {
            all: all.into_iter().collect(),
        }
    }

    pub fn or(any: impl IntoIterator<Item = Query>) -> Self {
        Self::Or {
            any: any.into_iter().collect(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(query: Query) -> Self {
        Self::Not {
            not: Box::new(query),
        }
    }
}
