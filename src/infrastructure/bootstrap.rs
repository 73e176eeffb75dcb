use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::application::use_cases::completion::CompletionService;
use crate::application::use_cases::conversation_service::ConversationStore;
use crate::application::use_cases::embedding_service::{Embedder, EmbeddingService};
use crate::application::use_cases::retrieval_service::SemanticRetriever;
use crate::application::use_cases::vector_index::{EmbeddedIndex, VectorIndex};
use crate::application::{OrchestratorDeps, QueryOrchestrator};
use crate::domain::error::Result;
use crate::domain::retrieval::{IndexMode, RetrievedPassage};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::catalog::CatalogRepository;
use crate::infrastructure::db::executor::RelationalExecutor;
use crate::infrastructure::db::schema::SchemaDescriber;
use crate::infrastructure::db::sqlite::CatalogDb;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};

/// Builds every long-lived service once. A missing catalog database is fatal;
/// an index that cannot be built only disables its search mode.
pub async fn setup(config: &AppConfig) -> Result<Arc<QueryOrchestrator>> {
    let db = Arc::new(
        CatalogDb::open(&config.database.path, config.database.timeout_secs).map_err(|err| {
            error!(
                error = %err,
                path = %config.database.path.display(),
                "Failed to open catalog database"
            );
            err
        })?,
    );
    let catalog = Arc::new(CatalogRepository::new(db.clone()));

    let embedder: Arc<dyn Embedder> =
        Arc::new(EmbeddingService::new(config.retrieval.embedding.clone()));

    let catalog_documents = catalog.load_catalog_documents().await;
    let catalog_index = prepare_index(
        IndexMode::Catalog,
        &config.retrieval.catalog_index_path,
        embedder.clone(),
        catalog_documents,
    )
    .await;

    let description_documents = catalog.load_product_descriptions().await;
    let description_index = prepare_index(
        IndexMode::Description,
        &config.retrieval.description_index_path,
        embedder,
        description_documents,
    )
    .await;

    let llm_client: Arc<dyn LLMClient + Send + Sync> = Arc::new(RouterClient::new());
    let completion = Arc::new(CompletionService::new(
        llm_client,
        config.llm.client.clone(),
        config.llm_timeout(),
    ));

    let conversations = Arc::new(
        ConversationStore::load(
            &config.conversation.history_file,
            config.conversation.capacity,
        )
        .await,
    );

    let orchestrator = QueryOrchestrator::new(OrchestratorDeps {
        completion,
        executor: Arc::new(RelationalExecutor::new(db.clone())),
        schema: Arc::new(SchemaDescriber::new(db)),
        retriever: Arc::new(SemanticRetriever::new(
            catalog_index,
            description_index,
            config.search_timeout(),
        )),
        conversations,
        catalog,
        top_k: config.retrieval.top_k,
    });

    info!(
        provider = ?config.llm.client.provider,
        model = %config.llm.client.model,
        "Services ready"
    );
    Ok(Arc::new(orchestrator))
}

async fn prepare_index(
    mode: IndexMode,
    dir: &Path,
    embedder: Arc<dyn Embedder>,
    documents: Result<Vec<RetrievedPassage>>,
) -> Option<Arc<dyn VectorIndex>> {
    let documents = match documents {
        Ok(documents) => documents,
        Err(err) => {
            error!(%mode, error = %err, "Failed to load index documents");
            return None;
        }
    };

    match EmbeddedIndex::load_or_build(dir, embedder, documents).await {
        Ok(index) => {
            info!(%mode, entries = index.len(), "Index ready");
            Some(Arc::new(index))
        }
        Err(err) => {
            error!(%mode, error = %err, dir = %dir.display(), "Index unavailable");
            None
        }
    }
}
