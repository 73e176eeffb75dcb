use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use crate::infrastructure::security::keyring::KeyringManager;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_CONFIG_FILE: &str = "brewdesk.toml";
const CONFIG_PATH_VAR: &str = "BREWDESK_CONFIG";
const ENV_PREFIX: &str = "BREWDESK_";
const KEYRING_SERVICE: &str = "brewdesk";
const FALLBACK_KEY_VAR: &str = "GOOGLE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub catalog_index_path: PathBuf,
    pub description_index_path: PathBuf,
    pub search_timeout_secs: u64,
    pub embedding: LLMConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(flatten)]
    pub client: LLMConfig,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub history_file: PathBuf,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmSettings,
    pub conversation: ConversationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                path: PathBuf::from("Database.db"),
                timeout_secs: 30,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                catalog_index_path: PathBuf::from("vector_store"),
                description_index_path: PathBuf::from("description_vector_store"),
                search_timeout_secs: 30,
                embedding: LLMConfig::local_embedding(),
            },
            llm: LlmSettings {
                client: LLMConfig::default(),
                timeout_secs: 60,
            },
            conversation: ConversationConfig {
                history_file: PathBuf::from("chat_histories.json"),
                capacity: 3,
            },
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `BREWDESK_*` variables (`__` separates sections).
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }

        let file = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        let mut config = Self::from_figment(
            Figment::from(Serialized::defaults(AppConfig::default()))
                .merge(Toml::file(&file))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )?;

        let keys = ConfigService::new();
        if config.llm.client.api_key.is_none() {
            config.llm.client.api_key = keys.resolve_api_key(&config.llm.client);
        }
        let embedding = &config.retrieval.embedding;
        if embedding.api_key.is_none() && embedding.provider != LLMProvider::Local {
            config.retrieval.embedding.api_key = keys.resolve_api_key(embedding);
        }

        info!(
            config_file = %file,
            database = %config.database.path.display(),
            model = %config.llm.client.model,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(AppError::ConfigError(
                "database.path must be non-empty".to_string(),
            ));
        }
        if self.database.timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "database.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::ConfigError(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.search_timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "retrieval.search_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "llm.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.conversation.capacity == 0 {
            return Err(AppError::ConfigError(
                "conversation.capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.search_timeout_secs)
    }
}

/// API keys that are not in the config file come from the environment or the OS keyring.
pub struct ConfigService {
    keyring: KeyringManager,
}

impl ConfigService {
    pub fn new() -> Self {
        Self {
            keyring: KeyringManager::new(KEYRING_SERVICE),
        }
    }

    pub fn get_api_key(&self, provider: &LLMProvider) -> Result<String> {
        self.keyring.get_secret(&provider_entry(provider))
    }

    pub fn resolve_api_key(&self, config: &LLMConfig) -> Option<String> {
        if config.provider == LLMProvider::Google {
            if let Ok(key) = std::env::var(FALLBACK_KEY_VAR) {
                if !key.trim().is_empty() {
                    return Some(key);
                }
            }
        }

        match self.get_api_key(&config.provider) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(error = %e, "No API key in keyring");
                None
            }
        }
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

fn provider_entry(provider: &LLMProvider) -> String {
    format!("{:?}", provider).to_lowercase()
}
