use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum LLMProvider {
    Local,
    OpenAI,
    Google,
    Ollama,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Google,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model: "gemini-1.5-flash-latest".to_string(),
            api_key: None,
            max_tokens: Some(2048),
            temperature: Some(0.8),
        }
    }
}

impl LLMConfig {
    /// Embedding defaults: a local model so indexes can be built offline.
    pub fn local_embedding() -> Self {
        Self {
            provider: LLMProvider::Local,
            base_url: String::new(),
            model: "all-minilm-l6-v2".to_string(),
            api_key: None,
            max_tokens: None,
            temperature: None,
        }
    }
}
