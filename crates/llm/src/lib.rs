//! Chat-completion clients for course generation
//!
//! Both supported providers speak the OpenAI-compatible
//! `/chat/completions` wire format, so one pair of request/response types
//! covers them:
//!
//! - **Ollama**: a local inference server. The endpoint ignores API keys, but
//!   OpenAI-compatible clients must still send a bearer value.
//! - **Groq**: hosted inference with a real API key.
//!
//! The provider is selected from environment configuration via
//! [`LlmConfig`]; callers only see the [`ChatClient`] trait.

use thiserror::Error;

pub mod client;

pub use client::{ChatClient, GroqClient, OllamaClient};

/// LLM transport and configuration errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("response contained no choices")]
    EmptyResponse,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Which inference backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Groq,
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "groq" => Ok(Self::Groq),
            _ => Err(format!("unknown LLM provider '{s}'. Valid options: ollama, groq")),
        }
    }
}

/// LLM configuration, read from the environment
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub groq_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: std::env::var("LLM_PROVIDER")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(Provider::Ollama),
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),
            groq_api_key: std::env::var("GROQ_API_KEY").ok(),
            groq_base_url: std::env::var("GROQ_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            groq_model: std::env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
        }
    }
}

impl LlmConfig {
    /// Build the configured client
    ///
    /// # Errors
    ///
    /// Returns an error if the Groq provider is selected without an API key,
    /// or if the HTTP client cannot be constructed.
    pub fn client(&self) -> LlmResult<Box<dyn ChatClient>> {
        match self.provider {
            Provider::Ollama => Ok(Box::new(OllamaClient::new(
                self.ollama_base_url.clone(),
                self.ollama_model.clone(),
            )?)),
            Provider::Groq => {
                let api_key = self.groq_api_key.clone().ok_or_else(|| {
                    LlmError::InvalidConfig("GROQ_API_KEY is required for the groq provider".into())
                })?;
                Ok(Box::new(GroqClient::new(
                    api_key,
                    self.groq_base_url.clone(),
                    self.groq_model.clone(),
                )?))
            }
        }
    }
}

/// Extract the first complete top-level JSON object using brace counting
///
/// Returns the first balanced `{ ... }` substring, or `None` if the text
/// contains no balanced object.
#[must_use]
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
