use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::domain::llm_config::LLMProvider;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingRequest {
    content: GeminiEmbeddingContent,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingContent {
    parts: Vec<GeminiEmbeddingPart>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingResult,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResult {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Turns text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifies the model; vectors from different models are not comparable.
    fn model_id(&self) -> String;
}

pub struct EmbeddingService {
    client: Client,
    config: LLMConfig,
    local_embedder: Arc<Mutex<Option<TextEmbedding>>>,
}

impl EmbeddingService {
    pub fn new(config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            local_embedder: Arc::new(Mutex::new(None)),
        }
    }

    fn resolve_gemini_embedding_model(model: &str) -> String {
        let trimmed = model.trim().trim_start_matches("models/");
        if trimmed.contains("embedding") {
            trimmed.to_string()
        } else {
            "text-embedding-004".to_string()
        }
    }

    fn resolve_local_embedding_model(model: &str) -> EmbeddingModel {
        match model.trim().to_lowercase().as_str() {
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "multilingual-e5-small" => EmbeddingModel::MultilingualE5Small,
            _ => EmbeddingModel::AllMiniLML6V2,
        }
    }

    async fn generate_local_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let model = Self::resolve_local_embedding_model(&self.config.model);
        let local_embedder = Arc::clone(&self.local_embedder);
        let text = text.to_string();

        // ONNX inference is CPU bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let mut guard = local_embedder
                .lock()
                .map_err(|_| AppError::Internal("Local embedder lock poisoned".to_string()))?;
            if guard.is_none() {
                let mut options = InitOptions::default();
                options.model_name = model;
                let embedder = TextEmbedding::try_new(options).map_err(|e| {
                    AppError::Internal(format!("Failed to init local embedder: {}", e))
                })?;
                *guard = Some(embedder);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| AppError::Internal("Local embedder unavailable".to_string()))?;
            let embeddings = embedder
                .embed(vec![text], None)
                .map_err(|e| AppError::Internal(format!("Failed to embed text: {}", e)))?;
            let embedding = embeddings
                .into_iter()
                .next()
                .ok_or_else(|| AppError::Internal("Empty embedding response".to_string()))?;
            if embedding.is_empty() {
                return Err(AppError::Internal("Empty embedding response".to_string()));
            }
            Ok(embedding)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Embedding task failed: {}", e)))?
    }

    async fn generate_openai_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let config = &self.config;
        let url = if config.base_url.ends_with("/") {
            format!("{}embeddings", config.base_url)
        } else {
            format!("{}/embeddings", config.base_url)
        };

        let request = OpenAIEmbeddingRequest {
            model: config.model.clone(),
            input: text.to_string(),
        };

        let mut req = self.client.post(&url);
        if let Some(api_key) = &config.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::Internal(format!("Failed to call embedding API ({}): {}", url, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Internal(format!(
                "Embedding API returned error {} (URL: {}): {}",
                status, url, error_text
            )));
        }

        let embedding_response: OpenAIEmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = embedding_response
            .data
            .first()
            .map(|d| d.embedding.clone())
            .ok_or_else(|| AppError::Internal("No embedding data in response".to_string()))?;

        if embedding.is_empty() {
            return Err(AppError::Internal("Empty embedding response".to_string()));
        }

        Ok(embedding)
    }

    async fn generate_gemini_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let config = &self.config;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Internal("Missing API key for Google provider".to_string()))?;
        let mut base_url = config.base_url.trim_end_matches('/').to_string();
        if !base_url.ends_with("/models") {
            base_url = format!("{}/models", base_url);
        }
        let model_id = Self::resolve_gemini_embedding_model(&config.model);
        let url = format!("{}/{}:embedContent", base_url, model_id);

        let request = GeminiEmbeddingRequest {
            content: GeminiEmbeddingContent {
                parts: vec![GeminiEmbeddingPart {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::Internal(format!("Failed to call embedding API ({}): {}", url, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Internal(format!(
                "Embedding API returned error {} (URL: {}): {}",
                status, url, error_text
            )));
        }

        let embedding_response: GeminiEmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = embedding_response.embedding.values;
        if embedding.is_empty() {
            return Err(AppError::Internal("Empty embedding response".to_string()));
        }

        Ok(embedding)
    }

    async fn generate_ollama_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let config = &self.config;
        let mut url = config.base_url.clone();

        if url.ends_with("/v1") || url.ends_with("/v1/") {
            url = url.trim_end_matches("/v1").to_string();
            url = url.trim_end_matches("/").to_string();
        }

        url = if url.ends_with("/") {
            format!("{}api/embeddings", url)
        } else {
            format!("{}/api/embeddings", url)
        };

        let request = OllamaEmbeddingRequest {
            model: config.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::Internal(format!("Failed to call embedding API ({}): {}", url, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Internal(format!(
                "Embedding API returned error {} (URL: {}): {}",
                status, url, error_text
            )));
        }

        let embedding_response: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse embedding response: {}", e))
        })?;

        let embedding = embedding_response.embedding;

        if embedding.is_empty() {
            return Err(AppError::Internal("Empty embedding response".to_string()));
        }

        Ok(embedding)
    }

    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot_product / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self.config.provider {
            LLMProvider::Local => self.generate_local_embedding(text).await,
            LLMProvider::OpenAI => self.generate_openai_embedding(text).await,
            LLMProvider::Google => self.generate_gemini_embedding(text).await,
            LLMProvider::Ollama => self.generate_ollama_embedding(text).await,
        }
    }

    fn model_id(&self) -> String {
        format!("{:?}/{}", self.config.provider, self.config.model)
    }
}
