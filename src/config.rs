//! Environment-driven configuration
//!
//! `.env` is loaded by the binaries; everything here reads process env.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AdvisorError;
use crate::Result;

pub const DEFAULT_MODEL_ID: &str = "meta-llama/Llama-3.1-8B-Instruct";
pub const DEFAULT_CHAT_URL: &str = "https://router.huggingface.co/v1/chat/completions";
pub const DEFAULT_TEXT_URL: &str = "https://api-inference.huggingface.co/models";

/// Character budget for the joined context block of the plan prompt
pub const MAX_CONTEXT_CHARS: usize = 3500;

/// Fan-out limits for context retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Passages requested per query (K_each)
    pub k_each: usize,
    /// Passages retained overall (K_total)
    pub k_total: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_each: 4,
            k_total: 8,
        }
    }
}

/// Inference endpoint settings
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub model_id: String,
    pub api_token: Option<String>,
    pub chat_url: String,
    pub text_url: String,
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_token: None,
            chat_url: DEFAULT_CHAT_URL.to_string(),
            text_url: DEFAULT_TEXT_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub inference: InferenceConfig,
    pub retrieval: RetrievalConfig,
    /// Local document store directory
    pub vector_store_dir: PathBuf,
    /// Remote similarity-search service, preferred over the local store
    pub retrieval_url: Option<String>,
    pub max_context_chars: usize,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::default(),
            retrieval: RetrievalConfig::default(),
            vector_store_dir: PathBuf::from("chroma_db"),
            retrieval_url: None,
            max_context_chars: MAX_CONTEXT_CHARS,
            port: 8000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        let inference = InferenceConfig {
            model_id: env_string("MODEL_ID").unwrap_or(defaults.inference.model_id),
            api_token: env_string("HUGGINGFACEHUB_API_TOKEN"),
            chat_url: env_string("HF_CHAT_URL").unwrap_or(defaults.inference.chat_url),
            text_url: env_string("HF_TEXT_URL").unwrap_or(defaults.inference.text_url),
            timeout: Duration::from_secs(env_parse("INFERENCE_TIMEOUT_SECS", 30u64)?),
        };

        let retrieval = RetrievalConfig {
            k_each: env_parse("TOP_K", defaults.retrieval.k_each)?,
            k_total: defaults.retrieval.k_total,
        };

        let port = match env_string("PORT").or_else(|| env_string("API_PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| AdvisorError::Config(format!("PORT must be a port number, got {}", raw)))?,
            None => defaults.port,
        };

        Ok(Self {
            inference,
            retrieval,
            vector_store_dir: env_string("CHROMA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.vector_store_dir),
            retrieval_url: env_string("RETRIEVAL_URL"),
            max_context_chars: defaults.max_context_chars,
            port,
        })
    }
}

/// Non-empty, trimmed env value
fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AdvisorError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
