//! In-process similarity index over catalog passages.
//!
//! An index is built once from a batch of passages, persisted as JSON under its
//! directory, and reused on the next start when the stored fingerprint still
//! matches the source passages and embedding model.

use super::embedding_service::{Embedder, EmbeddingService};
use crate::domain::error::{AppError, Result};
use crate::domain::retrieval::RetrievedPassage;
use crate::infrastructure::storage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const INDEX_FILE: &str = "index.json";

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    passage: RetrievedPassage,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct StoredIndex {
    fingerprint: String,
    model: String,
    entries: Vec<IndexEntry>,
}

pub struct EmbeddedIndex {
    embedder: Arc<dyn Embedder>,
    fingerprint: String,
    entries: Vec<IndexEntry>,
}

impl EmbeddedIndex {
    pub async fn build(embedder: Arc<dyn Embedder>, documents: Vec<RetrievedPassage>) -> Result<Self> {
        let fingerprint = fingerprint(embedder.as_ref(), &documents);
        let mut entries = Vec::with_capacity(documents.len());
        for passage in documents {
            let vector = embedder.embed(&passage.text).await?;
            entries.push(IndexEntry { passage, vector });
        }

        Ok(Self {
            embedder,
            fingerprint,
            entries,
        })
    }

    /// Reuses the persisted index in `dir` when it was built from the same passages,
    /// otherwise builds a fresh one and persists it.
    pub async fn load_or_build(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        documents: Vec<RetrievedPassage>,
    ) -> Result<Self> {
        let expected = fingerprint(embedder.as_ref(), &documents);
        let model = embedder.model_id();

        match Self::read_stored(dir).await {
            Ok(Some(stored)) => match staleness(&stored, &model, &expected) {
                Staleness::Fresh => {
                    info!(dir = %dir.display(), entries = stored.entries.len(), "Reusing persisted index");
                    return Ok(Self {
                        embedder,
                        fingerprint: stored.fingerprint,
                        entries: stored.entries,
                    });
                }
                Staleness::ModelChanged => info!(
                    dir = %dir.display(),
                    stored = %stored.model,
                    current = %model,
                    "Embedding model changed, rebuilding"
                ),
                Staleness::DocumentsChanged => {
                    info!(dir = %dir.display(), "Catalog changed since the index was built, rebuilding")
                }
            },
            Ok(None) => info!(dir = %dir.display(), "No persisted index, building"),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Unreadable persisted index, rebuilding"),
        }

        let index = Self::build(embedder, documents).await?;
        if let Err(e) = index.save(dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to persist index");
        }
        Ok(index)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        let stored = StoredIndex {
            fingerprint: self.fingerprint.clone(),
            model: self.embedder.model_id(),
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec(&stored)?;
        storage::write_atomic(&dir.join(INDEX_FILE), &bytes).await?;
        Ok(())
    }

    async fn read_stored(dir: &Path) -> Result<Option<StoredIndex>> {
        let path = dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&path).await?;
        let stored = serde_json::from_slice(&bytes)?;
        Ok(Some(stored))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for EmbeddedIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Err(AppError::ValidationError("k must be greater than zero".to_string()));
        }

        let query_vector = self.embedder.embed(query).await?;
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    EmbeddingService::cosine_similarity(&query_vector, &entry.vector),
                    entry,
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(_, entry)| entry.passage.clone())
            .collect())
    }
}

/// SHA-256 over the model id and every passage, in order.
#[derive(Debug, PartialEq, Eq)]
enum Staleness {
    Fresh,
    ModelChanged,
    DocumentsChanged,
}

fn staleness(stored: &StoredIndex, model: &str, expected: &str) -> Staleness {
    if stored.model != model {
        Staleness::ModelChanged
    } else if stored.fingerprint != expected {
        Staleness::DocumentsChanged
    } else {
        Staleness::Fresh
    }
}

fn fingerprint(embedder: &dyn Embedder, documents: &[RetrievedPassage]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(embedder.model_id().as_bytes());
    for document in documents {
        hasher.update([0u8]);
        hasher.update(document.text.as_bytes());
        if let Ok(metadata) = serde_json::to_vec(&document.metadata) {
            hasher.update(&metadata);
        }
    }
    hex::encode(hasher.finalize())
}
