use super::completion::CompletionService;
use super::prompts::build_sql_generation_prompt;
use crate::domain::error::Result;
use crate::domain::query::CandidateQuery;
use crate::infrastructure::response::strip_code_fence;
use std::sync::Arc;
use tracing::debug;

/// Asks the model for a SELECT answering the question. The result is untrusted.
pub struct SqlGenerator {
    completion: Arc<CompletionService>,
}

impl SqlGenerator {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn generate(&self, question: &str, schema: &str) -> Result<CandidateQuery> {
        let prompt = build_sql_generation_prompt(question, schema);
        let reply = self.completion.complete(&prompt).await?;
        let sql = strip_code_fence(&reply);
        debug!(sql = %sql, "Generated SQL");
        Ok(CandidateQuery::new(sql))
    }
}
