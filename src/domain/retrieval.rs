use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pre-built index a semantic lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// One passage per row across every catalog table.
    Catalog,
    /// One passage per product description.
    Description,
}

impl fmt::Display for IndexMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexMode::Catalog => f.write_str("catalog"),
            IndexMode::Description => f.write_str("description"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassageMetadata {
    Row {
        table: String,
        columns: Vec<String>,
        data: serde_json::Map<String, serde_json::Value>,
        row_index: usize,
    },
    Product {
        name: String,
        description: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub metadata: PassageMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Found(Vec<RetrievedPassage>),
    /// The index for the requested mode was never built.
    Unavailable,
}
