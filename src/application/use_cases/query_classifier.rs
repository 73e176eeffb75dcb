use super::completion::CompletionService;
use super::conversation_service::ConversationStore;
use super::prompts::build_classification_prompt;
use crate::domain::conversation::UserKey;
use crate::domain::query::Route;
use std::sync::Arc;
use tracing::{info, warn};

/// Terms that suggest aggregation, counting, comparison or listing.
const STRUCTURED_KEYWORDS: &[&str] = &[
    "tính",
    "tổng",
    "trung bình",
    "số lượng",
    "count",
    "sum",
    "average",
    "nhiều nhất",
    "ít nhất",
    "max",
    "min",
    "so sánh",
    "thống kê",
    "danh sách",
    "liệt kê",
    "hiển thị",
    "show",
    "list",
    "display",
];

pub struct QueryClassifier {
    completion: Arc<CompletionService>,
    conversations: Arc<ConversationStore>,
}

impl QueryClassifier {
    pub fn new(completion: Arc<CompletionService>, conversations: Arc<ConversationStore>) -> Self {
        Self {
            completion,
            conversations,
        }
    }

    /// Never fails: a completion error falls back to [`classify_by_keywords`].
    pub async fn classify(&self, query: &str, user_key: &UserKey) -> Route {
        let history = self.conversations.recent(user_key).await;
        let prompt = build_classification_prompt(query, &history);

        match self.completion.complete(&prompt).await {
            Ok(answer) => {
                let route = if answer.trim().to_lowercase() == "true" {
                    Route::Structured
                } else {
                    Route::Semantic
                };
                info!(%route, "Classified query");
                route
            }
            Err(e) => {
                let route = classify_by_keywords(query);
                warn!(error = %e, %route, "Classifier unavailable, using keyword fallback");
                route
            }
        }
    }
}

pub fn classify_by_keywords(query: &str) -> Route {
    let lowered = query.to_lowercase();
    if STRUCTURED_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        Route::Structured
    } else {
        Route::Semantic
    }
}
