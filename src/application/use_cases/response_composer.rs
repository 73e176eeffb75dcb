use super::completion::CompletionService;
use super::prompts::{
    build_image_answer_prompt, build_semantic_answer_prompt, build_structured_answer_prompt,
};
use crate::domain::customer::{CallerProfile, PurchaseRecord};
use crate::domain::error::Result;
use crate::domain::retrieval::{PassageMetadata, RetrievedPassage};
use std::sync::Arc;

/// Everything known about the caller and the conversation for one request.
#[derive(Debug, Clone, Default)]
pub struct AnswerContext {
    pub query: String,
    pub history: String,
    pub profile: Option<CallerProfile>,
    pub purchases: Vec<PurchaseRecord>,
}

pub struct ResponseComposer {
    completion: Arc<CompletionService>,
}

impl ResponseComposer {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    pub async fn compose_structured(&self, ctx: &AnswerContext, rows: &str) -> Result<String> {
        let prompt = build_structured_answer_prompt(
            &ctx.query,
            rows,
            &ctx.history,
            ctx.profile.as_ref(),
            &ctx.purchases,
        );
        self.finish(&prompt).await
    }

    pub async fn compose_semantic(
        &self,
        ctx: &AnswerContext,
        passages: &[RetrievedPassage],
    ) -> Result<String> {
        let context = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = build_semantic_answer_prompt(
            &ctx.query,
            &context,
            &ctx.history,
            ctx.profile.as_ref(),
            &ctx.purchases,
        );
        self.finish(&prompt).await
    }

    /// Answers from a drink description; purchase history is not used here.
    pub async fn compose_image(
        &self,
        ctx: &AnswerContext,
        passages: &[RetrievedPassage],
    ) -> Result<String> {
        let matches = passages
            .iter()
            .map(describe_match)
            .collect::<Vec<_>>()
            .join("\n");
        let prompt =
            build_image_answer_prompt(&ctx.query, &matches, &ctx.history, ctx.profile.as_ref());
        self.finish(&prompt).await
    }

    async fn finish(&self, prompt: &str) -> Result<String> {
        Ok(self.completion.complete(prompt).await?.trim().to_string())
    }
}

fn describe_match(passage: &RetrievedPassage) -> String {
    match &passage.metadata {
        PassageMetadata::Product { name, .. } => format!("Tên: {}, Mô tả: {}", name, passage.text),
        PassageMetadata::Row { .. } => passage.text.clone(),
    }
}
