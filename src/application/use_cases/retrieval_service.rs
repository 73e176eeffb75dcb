use crate::application::use_cases::vector_index::VectorIndex;
use crate::domain::error::{AppError, Result};
use crate::domain::retrieval::{IndexMode, Retrieval, RetrievedPassage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Similarity search over the catalog-row and product-description indexes.
///
/// Either index may be missing when its build failed at startup; lookups
/// against a missing index return [`Retrieval::Unavailable`].
pub struct SemanticRetriever {
    catalog: Option<Arc<dyn VectorIndex>>,
    description: Option<Arc<dyn VectorIndex>>,
    timeout: Duration,
}

impl SemanticRetriever {
    pub fn new(
        catalog: Option<Arc<dyn VectorIndex>>,
        description: Option<Arc<dyn VectorIndex>>,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            description,
            timeout,
        }
    }

    pub fn is_available(&self, mode: IndexMode) -> bool {
        self.index(mode).is_some()
    }

    fn index(&self, mode: IndexMode) -> Option<&Arc<dyn VectorIndex>> {
        match mode {
            IndexMode::Catalog => self.catalog.as_ref(),
            IndexMode::Description => self.description.as_ref(),
        }
    }

    pub async fn retrieve(&self, query: &str, k: usize, mode: IndexMode) -> Result<Retrieval> {
        if k == 0 {
            return Err(AppError::ValidationError(
                "Result count must be greater than zero".to_string(),
            ));
        }

        let Some(index) = self.index(mode) else {
            warn!(%mode, "Index unavailable");
            return Ok(Retrieval::Unavailable);
        };

        let passages: Vec<RetrievedPassage> = tokio::time::timeout(self.timeout, index.search(query, k))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "{} search timed out after {:?}",
                    mode, self.timeout
                ))
            })??;

        debug!(%mode, k, found = passages.len(), "Semantic search finished");
        Ok(Retrieval::Found(passages))
    }
}
