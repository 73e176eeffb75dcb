use serde::{Deserialize, Serialize};
use std::fmt;

/// Retrieval strategy chosen for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Generated SQL against the catalog database.
    Structured,
    /// Similarity search over the catalog indexes.
    Semantic,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Structured => f.write_str("structured"),
            Route::Semantic => f.write_str("semantic"),
        }
    }
}

/// Raw SQL text produced by the generator. Untrusted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery(String);

impl CandidateQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A query that passed every guard rule. Only the guard can build one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub(crate) fn new(sql: String) -> Self {
        Self(sql)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub code: &'static str,
    pub message: String,
}

impl Rejection {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
