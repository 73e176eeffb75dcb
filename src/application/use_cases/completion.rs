use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::clean_llm_response;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Single-prompt completions against the configured model, bounded in time.
pub struct CompletionService {
    llm_client: Arc<dyn LLMClient + Send + Sync>,
    config: LLMConfig,
    timeout: Duration,
}

impl CompletionService {
    pub fn new(
        llm_client: Arc<dyn LLMClient + Send + Sync>,
        config: LLMConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            llm_client,
            config,
            timeout,
        }
    }

    /// Sends `prompt` as the user turn and returns the cleaned reply. No retries.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let raw = tokio::time::timeout(
            self.timeout,
            self.llm_client.generate(&self.config, "", prompt),
        )
        .await
        .map_err(|_| {
            AppError::Timeout(format!(
                "Completion timed out after {} seconds",
                self.timeout.as_secs()
            ))
        })??;

        debug!(model = %self.config.model, chars = raw.len(), "Completion received");
        Ok(clean_llm_response(&raw))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every prompt it receives.
    /// `Err` entries fail that call; an exhausted script fails every further call.
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<std::result::Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new(replies: Vec<std::result::Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn generate(&self, _config: &LLMConfig, _system: &str, user: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(AppError::LLMError(message)),
                None => Err(AppError::LLMError("script exhausted".to_string())),
            }
        }
    }

    pub fn scripted(
        replies: Vec<std::result::Result<&str, &str>>,
    ) -> (Arc<ScriptedClient>, Arc<CompletionService>) {
        let client = Arc::new(ScriptedClient::new(replies));
        let service = Arc::new(CompletionService::new(
            client.clone(),
            LLMConfig::default(),
            Duration::from_secs(5),
        ));
        (client, service)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::scripted;
    use super::*;

    #[tokio::test]
    async fn test_complete_cleans_reply() {
        let (client, service) = scripted(vec![Ok("<think>hmm</think>  Xin chào!  ")]);
        assert_eq!(service.complete("chào").await.unwrap(), "Xin chào!");
        assert_eq!(client.prompts(), vec!["chào".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_propagates_failure() {
        let (_, service) = scripted(vec![Err("quota exceeded")]);
        assert!(matches!(
            service.complete("chào").await,
            Err(AppError::LLMError(_))
        ));
    }
}
