//! Request lifecycle for one customer question.
//!
//! ```text
//! Received -> Classified -> Generating -> Validating -> Executing -> Formatting -> Composing -> Recorded
//!                        \-> Retrieving ----------------------------------------/
//! ```
//!
//! Every request ends with exactly one conversation entry, whatever happened
//! along the way, and no error escapes to the caller.

use super::completion::CompletionService;
use super::conversation_service::ConversationStore;
use super::drink_extractor::DrinkTraitExtractor;
use super::query_classifier::QueryClassifier;
use super::response_composer::{AnswerContext, ResponseComposer};
use super::retrieval_service::SemanticRetriever;
use super::sql_generator::SqlGenerator;
use super::sql_guard::SqlGuard;
use crate::domain::conversation::UserKey;
use crate::domain::customer::CallerProfile;
use crate::domain::error::{AppError, Result};
use crate::domain::query::Route;
use crate::domain::retrieval::{IndexMode, Retrieval};
use crate::infrastructure::db::catalog::CatalogRepository;
use crate::infrastructure::db::executor::{format_rows, RelationalExecutor};
use crate::infrastructure::db::schema::SchemaDescriber;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

pub const VALIDATION_APOLOGY: &str =
    "Xin lỗi, tôi không thể thực hiện truy vấn này vì lý do an toàn hoặc truy vấn không hợp lệ.";
pub const GENERIC_APOLOGY: &str = "Xin lỗi, đã có lỗi xảy ra khi xử lý yêu cầu của bạn.";
pub const SEARCH_UNAVAILABLE: &str = "Không thể tìm kiếm vì dữ liệu tìm kiếm chưa sẵn sàng.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    /// Generated SQL failed the guard.
    Rejected,
    /// The model could not produce SQL.
    GenerationFailed,
    SearchUnavailable,
    /// Any other failure; the text carries the cause.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub route: Option<Route>,
    pub outcome: Outcome,
}

impl Answer {
    fn new(text: impl Into<String>, route: Route, outcome: Outcome) -> Self {
        Self {
            text: text.into(),
            route: Some(route),
            outcome,
        }
    }

    fn failed(route: Option<Route>, error: &AppError) -> Self {
        Self {
            text: format!("Lỗi hệ thống: {}", error),
            route,
            outcome: Outcome::Failed,
        }
    }
}

/// Collaborators built once at startup.
pub struct OrchestratorDeps {
    pub completion: Arc<CompletionService>,
    pub executor: Arc<RelationalExecutor>,
    pub schema: Arc<SchemaDescriber>,
    pub retriever: Arc<SemanticRetriever>,
    pub conversations: Arc<ConversationStore>,
    pub catalog: Arc<CatalogRepository>,
    pub top_k: usize,
}

pub struct QueryOrchestrator {
    classifier: QueryClassifier,
    generator: SqlGenerator,
    guard: SqlGuard,
    executor: Arc<RelationalExecutor>,
    schema: Arc<SchemaDescriber>,
    retriever: Arc<SemanticRetriever>,
    composer: ResponseComposer,
    extractor: DrinkTraitExtractor,
    conversations: Arc<ConversationStore>,
    catalog: Arc<CatalogRepository>,
    top_k: usize,
}

impl QueryOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            classifier: QueryClassifier::new(deps.completion.clone(), deps.conversations.clone()),
            generator: SqlGenerator::new(deps.completion.clone()),
            guard: SqlGuard::new(),
            executor: deps.executor,
            schema: deps.schema,
            retriever: deps.retriever,
            composer: ResponseComposer::new(deps.completion.clone()),
            extractor: DrinkTraitExtractor::new(deps.completion),
            conversations: deps.conversations,
            catalog: deps.catalog,
            top_k: deps.top_k,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Answers a question. `profile` may be supplied by the caller's session;
    /// otherwise it is looked up for account keys.
    pub async fn answer(
        &self,
        user_key: &UserKey,
        query: &str,
        profile: Option<CallerProfile>,
    ) -> Answer {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("answer", %request_id, %user_key);

        async move {
            let route = self.classifier.classify(query, user_key).await;
            let answer = match self.answer_on_route(route, user_key, query, profile).await {
                Ok(answer) => answer,
                Err(e) => {
                    error!(error = %e, %route, "Request failed");
                    Answer::failed(Some(route), &e)
                }
            };

            self.record(user_key, query, &answer.text).await;
            info!(outcome = ?answer.outcome, "Request finished");
            answer
        }
        .instrument(span)
        .await
    }

    /// Suggests catalog drinks for a drink description (for example one derived
    /// from a photo). Only account callers get the exchange recorded.
    pub async fn answer_drink_description(
        &self,
        user_key: &UserKey,
        description: &str,
        profile: Option<CallerProfile>,
    ) -> Answer {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("describe", %request_id, %user_key);

        async move {
            let (answer, searched) = self.describe(user_key, description, profile).await;
            if !user_key.is_anonymous() {
                self.record(user_key, &searched, &answer.text).await;
            }
            answer
        }
        .instrument(span)
        .await
    }

    async fn answer_on_route(
        &self,
        route: Route,
        user_key: &UserKey,
        query: &str,
        profile: Option<CallerProfile>,
    ) -> Result<Answer> {
        let ctx = self.context(user_key, query, profile, true).await;
        match route {
            Route::Structured => self.answer_structured(&ctx).await,
            Route::Semantic => self.answer_semantic(&ctx).await,
        }
    }

    async fn answer_structured(&self, ctx: &AnswerContext) -> Result<Answer> {
        let candidate = match self.schema.describe().await {
            Ok(schema) => self.generator.generate(&ctx.query, &schema).await,
            Err(e) => Err(e),
        };
        let candidate = match candidate {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(error = %e, "SQL generation failed");
                return Ok(Answer::new(
                    GENERIC_APOLOGY,
                    Route::Structured,
                    Outcome::GenerationFailed,
                ));
            }
        };

        let query = match self.guard.check(candidate.as_str()) {
            Ok(query) => query,
            Err(_) => {
                return Ok(Answer::new(
                    VALIDATION_APOLOGY,
                    Route::Structured,
                    Outcome::Rejected,
                ))
            }
        };

        let rows = self.executor.execute_or_empty(&query).await;
        let formatted = format_rows(&rows);
        let text = self.composer.compose_structured(ctx, &formatted).await?;
        Ok(Answer::new(text, Route::Structured, Outcome::Answered))
    }

    async fn answer_semantic(&self, ctx: &AnswerContext) -> Result<Answer> {
        match self
            .retriever
            .retrieve(&ctx.query, self.top_k, IndexMode::Catalog)
            .await?
        {
            Retrieval::Found(passages) => {
                let text = self.composer.compose_semantic(ctx, &passages).await?;
                Ok(Answer::new(text, Route::Semantic, Outcome::Answered))
            }
            Retrieval::Unavailable => Ok(Answer::new(
                SEARCH_UNAVAILABLE,
                Route::Semantic,
                Outcome::SearchUnavailable,
            )),
        }
    }

    /// Returns the answer and the text to record as the question: the search
    /// sentence once traits were extracted, the raw description before that.
    async fn describe(
        &self,
        user_key: &UserKey,
        description: &str,
        profile: Option<CallerProfile>,
    ) -> (Answer, String) {
        if !self.retriever.is_available(IndexMode::Description) {
            let answer = Answer::new(
                SEARCH_UNAVAILABLE,
                Route::Semantic,
                Outcome::SearchUnavailable,
            );
            return (answer, description.to_string());
        }

        let search_query = match self.extractor.extract(description).await {
            Ok(traits) => traits.to_search_query(),
            Err(e) => {
                error!(error = %e, "Drink trait extraction failed");
                return (Answer::failed(Some(Route::Semantic), &e), description.to_string());
            }
        };
        info!(search_query = %search_query, "Searching product descriptions");

        let answer = match self
            .suggest(user_key, description, &search_query, profile)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Drink description request failed");
                Answer::failed(Some(Route::Semantic), &e)
            }
        };
        (answer, search_query)
    }

    async fn suggest(
        &self,
        user_key: &UserKey,
        description: &str,
        search_query: &str,
        profile: Option<CallerProfile>,
    ) -> Result<Answer> {
        match self
            .retriever
            .retrieve(search_query, self.top_k, IndexMode::Description)
            .await?
        {
            Retrieval::Found(passages) => {
                let ctx = self.context(user_key, description, profile, false).await;
                let text = self.composer.compose_image(&ctx, &passages).await?;
                Ok(Answer::new(text, Route::Semantic, Outcome::Answered))
            }
            Retrieval::Unavailable => Ok(Answer::new(
                SEARCH_UNAVAILABLE,
                Route::Semantic,
                Outcome::SearchUnavailable,
            )),
        }
    }

    /// Lookup failures degrade to an anonymous-looking context.
    async fn context(
        &self,
        user_key: &UserKey,
        query: &str,
        profile: Option<CallerProfile>,
        with_purchases: bool,
    ) -> AnswerContext {
        let profile = match profile {
            Some(profile) => Some(profile),
            None => self.catalog.caller_profile(user_key).await.unwrap_or_else(|e| {
                warn!(error = %e, "Caller profile lookup failed");
                None
            }),
        };

        let purchases = if with_purchases {
            self.catalog
                .purchase_history(user_key)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Purchase history lookup failed");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        AnswerContext {
            query: query.to_string(),
            history: self.conversations.recent(user_key).await,
            profile,
            purchases,
        }
    }

    async fn record(&self, user_key: &UserKey, query: &str, response: &str) {
        if let Err(e) = self.conversations.append(user_key, query, response).await {
            warn!(error = %e, "Failed to persist conversation history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::completion::test_support::{scripted, ScriptedClient};
    use crate::application::use_cases::embedding_service::test_support::HashingEmbedder;
    use crate::application::use_cases::vector_index::{EmbeddedIndex, VectorIndex};
    use crate::infrastructure::db::executor::NO_RESULTS;
    use crate::infrastructure::db::sqlite::test_support::{
        seeded_db, CROSS_JOIN_TABLE, SHOP_SCHEMA, SLOW_COUNT,
    };
    use crate::infrastructure::db::sqlite::CatalogDb;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    struct Harness {
        client: Arc<ScriptedClient>,
        orchestrator: QueryOrchestrator,
        db_path: PathBuf,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.db_path);
        }
    }

    async fn harness(replies: Vec<std::result::Result<&str, &str>>, with_indexes: bool) -> Harness {
        harness_on(SHOP_SCHEMA, 5, replies, with_indexes).await
    }

    async fn harness_on(
        statements: &[&str],
        timeout_secs: u64,
        replies: Vec<std::result::Result<&str, &str>>,
        with_indexes: bool,
    ) -> Harness {
        let db_path = seeded_db(statements).await;
        let db = Arc::new(CatalogDb::open(&db_path, timeout_secs).unwrap());
        let catalog = Arc::new(CatalogRepository::new(db.clone()));

        let mut catalog_index: Option<Arc<dyn VectorIndex>> = None;
        let mut description_index: Option<Arc<dyn VectorIndex>> = None;
        if with_indexes {
            let rows = catalog.load_catalog_documents().await.unwrap();
            let products = catalog.load_product_descriptions().await.unwrap();
            let rows = EmbeddedIndex::build(Arc::new(HashingEmbedder), rows).await.unwrap();
            let products = EmbeddedIndex::build(Arc::new(HashingEmbedder), products)
                .await
                .unwrap();
            catalog_index = Some(Arc::new(rows));
            description_index = Some(Arc::new(products));
        }

        let (client, completion) = scripted(replies);
        let orchestrator = QueryOrchestrator::new(OrchestratorDeps {
            completion,
            executor: Arc::new(RelationalExecutor::new(db.clone())),
            schema: Arc::new(SchemaDescriber::new(db)),
            retriever: Arc::new(SemanticRetriever::new(
                catalog_index,
                description_index,
                Duration::from_secs(5),
            )),
            conversations: Arc::new(ConversationStore::in_memory(3)),
            catalog,
            top_k: 3,
        });

        Harness {
            client,
            orchestrator,
            db_path,
        }
    }

    #[tokio::test]
    async fn test_structured_end_to_end() {
        let h = harness(
            vec![
                Ok("true"),
                Ok("```sql\nSELECT Name, Price FROM Product WHERE Price < 30000 ORDER BY Price LIMIT 3\n```"),
                Ok("Có 2 món dưới 30000đ: Cà phê sữa đá và Bạc xỉu."),
            ],
            false,
        )
        .await;
        let key = UserKey::Anonymous;

        let answer = h
            .orchestrator
            .answer(&key, "Liệt kê 3 sản phẩm giá dưới 30000", None)
            .await;
        assert_eq!(answer.route, Some(Route::Structured));
        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.text, "Có 2 món dưới 30000đ: Cà phê sữa đá và Bạc xỉu.");

        let prompts = h.client.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Table: Product"));
        assert!(prompts[2].contains("Name: Cà phê sữa đá, Price: 25000"));
        assert!(prompts[2].contains("Name: Bạc xỉu, Price: 29000"));
        assert!(!prompts[2].contains(NO_RESULTS));
        assert!(!answer.text.contains("SELECT"));

        let history = h.orchestrator.conversations().history(&key).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].response, answer.text);
    }

    #[tokio::test]
    async fn test_rejected_sql_gets_fixed_apology() {
        let h = harness(
            vec![Ok("true"), Ok("SELECT * FROM Product; DROP TABLE Product;")],
            false,
        )
        .await;
        let key = UserKey::Account(1);

        let answer = h.orchestrator.answer(&key, "Xoá hết sản phẩm", None).await;
        assert_eq!(answer.outcome, Outcome::Rejected);
        assert_eq!(answer.text, VALIDATION_APOLOGY);
        assert!(!answer.text.contains("DROP"));
        assert_eq!(h.client.prompts().len(), 2);

        let history = h.orchestrator.conversations().history(&key).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].response, VALIDATION_APOLOGY);
    }

    #[tokio::test]
    async fn test_execution_failure_still_composes() {
        let h = harness(
            vec![
                Ok("true"),
                Ok("SELECT Flavour FROM Product"),
                Ok("Xin lỗi, tôi không có đủ thông tin về vấn đề này."),
            ],
            false,
        )
        .await;

        let answer = h
            .orchestrator
            .answer(&UserKey::Anonymous, "Món nào vị dâu?", None)
            .await;
        assert_eq!(answer.outcome, Outcome::Answered);
        assert!(h.client.prompts()[2].contains(NO_RESULTS));
    }

    #[tokio::test]
    async fn test_generation_failure_is_generic_apology() {
        let h = harness(vec![Ok("true"), Err("quota exceeded")], false).await;

        let answer = h
            .orchestrator
            .answer(&UserKey::Anonymous, "Tổng doanh thu?", None)
            .await;
        assert_eq!(answer.outcome, Outcome::GenerationFailed);
        assert_eq!(answer.text, GENERIC_APOLOGY);
    }

    #[tokio::test]
    async fn test_classifier_outage_falls_back_to_keywords() {
        let h = harness(
            vec![
                Err("unreachable"),
                Ok("SELECT Name FROM Product"),
                Ok("Đây là danh sách món."),
            ],
            false,
        )
        .await;

        let answer = h
            .orchestrator
            .answer(&UserKey::Anonymous, "Liệt kê các món", None)
            .await;
        assert_eq!(answer.route, Some(Route::Structured));
        assert_eq!(answer.outcome, Outcome::Answered);
    }

    #[tokio::test]
    async fn test_missing_index_reports_unavailable() {
        let h = harness(vec![Ok("false")], false).await;
        let key = UserKey::Account(2);

        let answer = h.orchestrator.answer(&key, "Bạc xỉu có vị thế nào?", None).await;
        assert_eq!(answer.outcome, Outcome::SearchUnavailable);
        assert_eq!(answer.text, SEARCH_UNAVAILABLE);
        assert_eq!(h.orchestrator.conversations().history(&key).await.len(), 1);
    }

    #[tokio::test]
    async fn test_semantic_answer_uses_profile_and_purchases() {
        let h = harness(vec![Ok("false"), Ok("Bạn thử Trà đào cam sả nhé!")], true).await;
        let key = UserKey::Account(1);

        let answer = h
            .orchestrator
            .answer(&key, "Gợi ý cho tôi một món trà", None)
            .await;
        assert_eq!(answer.outcome, Outcome::Answered);

        let prompt = &h.client.prompts()[1];
        assert!(prompt.contains("Customer: Lan"));
        assert!(prompt.contains("Recent purchases:"));
        assert!(prompt.contains("Bảng "));
    }

    #[tokio::test]
    async fn test_composition_failure_is_recorded() {
        let h = harness(vec![Ok("false"), Err("connection reset")], true).await;
        let key = UserKey::Anonymous;

        let answer = h.orchestrator.answer(&key, "Cửa hàng mở cửa lúc mấy giờ?", None).await;
        assert_eq!(answer.outcome, Outcome::Failed);
        assert!(answer.text.starts_with("Lỗi hệ thống: "));
        assert!(answer.text.contains("connection reset"));

        let history = h.orchestrator.conversations().history(&key).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].response, answer.text);
    }

    #[tokio::test]
    async fn test_supplied_profile_wins() {
        let h = harness(vec![Ok("false"), Ok("ok")], true).await;
        let profile = CallerProfile {
            id: 1,
            name: "Chị Lan".to_string(),
            attribute: None,
        };

        h.orchestrator
            .answer(&UserKey::Account(1), "Có món gì mới?", Some(profile))
            .await;
        assert!(h.client.prompts()[1].contains("Customer: Chị Lan"));
    }

    #[tokio::test]
    async fn test_drink_description_recorded_only_for_accounts() {
        let traits = r#"{"drink_type": "trà", "drink_color": "cam", "container_type": "ly nhựa", "ingredients": "trà, đào, cam, sả", "topping": null, "suitable_for": "ngày nóng"}"#;
        let h = harness(
            vec![
                Ok(traits),
                Ok("Bạn thử Trà đào cam sả nhé!"),
                Ok(traits),
                Ok("Bạn thử Trà đào cam sả nhé!"),
            ],
            true,
        )
        .await;

        let anonymous = h
            .orchestrator
            .answer_drink_description(&UserKey::Anonymous, "ly trà màu cam", None)
            .await;
        assert_eq!(anonymous.outcome, Outcome::Answered);
        assert!(h.client.prompts()[1].contains("Tên: "));
        assert!(h
            .orchestrator
            .conversations()
            .history(&UserKey::Anonymous)
            .await
            .is_empty());

        let key = UserKey::Account(2);
        h.orchestrator
            .answer_drink_description(&key, "ly trà màu cam", None)
            .await;
        let history = h.orchestrator.conversations().history(&key).await;
        assert_eq!(history.len(), 1);
        assert!(history[0]
            .query
            .starts_with("Sự kết hợp từ các thành phần như trà, đào, cam, sả"));
        assert!(history[0].query.contains("màu cam"));
    }

    #[tokio::test]
    async fn test_failed_extraction_records_description() {
        let h = harness(vec![Ok("not json")], true).await;
        let key = UserKey::Account(1);

        let answer = h
            .orchestrator
            .answer_drink_description(&key, "ly trà màu cam", None)
            .await;
        assert_eq!(answer.outcome, Outcome::Failed);

        let history = h.orchestrator.conversations().history(&key).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "ly trà màu cam");
    }

    #[tokio::test]
    async fn test_query_timeout_still_answers() {
        let statements: Vec<&str> = SHOP_SCHEMA
            .iter()
            .chain(CROSS_JOIN_TABLE.iter())
            .copied()
            .collect();
        let h = harness_on(
            &statements,
            1,
            vec![
                Ok("true"),
                Ok(SLOW_COUNT),
                Ok("Xin lỗi, tôi không có đủ thông tin về vấn đề này."),
            ],
            false,
        )
        .await;
        let key = UserKey::Anonymous;

        let started = Instant::now();
        let answer = h.orchestrator.answer(&key, "Thống kê tổ hợp món", None).await;
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());

        assert_eq!(answer.outcome, Outcome::Answered);
        assert_eq!(answer.route, Some(Route::Structured));
        assert!(h.client.prompts()[2].contains(NO_RESULTS));
        assert_eq!(h.orchestrator.conversations().history(&key).await.len(), 1);
    }

    #[tokio::test]
    async fn test_drink_description_without_index() {
        let h = harness(vec![], false).await;

        let answer = h
            .orchestrator
            .answer_drink_description(&UserKey::Account(1), "ly trà màu cam", None)
            .await;
        assert_eq!(answer.outcome, Outcome::SearchUnavailable);
        assert!(h.client.prompts().is_empty());
    }
}
