//! OpenAI-compatible chat-completion clients

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{LlmError, LlmResult};

/// Request timeout; generation calls can run long on local inference
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A chat-completion backend
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a completion for a system + user prompt pair
    async fn generate_text(&self, system: &str, user: &str, temperature: f64)
        -> LlmResult<String>;
}

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Chat completion response body
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

fn build_request(model: &str, system: &str, user: &str, temperature: f64) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            Message {
                role: "system".to_string(),
                content: system.to_string(),
            },
            Message {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ],
        temperature,
    }
}

fn http_client() -> LlmResult<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(LlmError::from)
}

async fn post_chat(
    client: &Client,
    url: &str,
    bearer: &str,
    request: &ChatRequest,
) -> LlmResult<String> {
    let response = client
        .post(url)
        .header("Authorization", format!("Bearer {bearer}"))
        .header("Content-Type", "application/json")
        .json(request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let chat_response: ChatResponse = response.json().await?;
    let choice = chat_response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyResponse)?;
    Ok(choice.message.content)
}

/// Client for a local Ollama server's OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Create a client for `{base_url}/chat/completions`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: String, model: String) -> LlmResult<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait::async_trait]
impl ChatClient for OllamaClient {
    async fn generate_text(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> LlmResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = build_request(&self.model, system, user, temperature);
        tracing::debug!(model = %self.model, "sending chat completion to ollama");
        // Ollama ignores the key but OpenAI-compatible clients must send one
        post_chat(&self.client, &url, "ollama", &request).await
    }
}

/// Client for the Groq OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqClient {
    /// Create a client for `{base_url}/chat/completions`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(api_key: String, base_url: String, model: String) -> LlmResult<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait::async_trait]
impl ChatClient for GroqClient {
    async fn generate_text(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> LlmResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = build_request(&self.model, system, user, temperature);
        tracing::debug!(model = %self.model, "sending chat completion to groq");
        post_chat(&self.client, &url, &self.api_key, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = build_request("llama3.1", "You are a planner.", "Plan 4 weeks.", 0.1);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama3.1");
        assert_eq!(json["temperature"], 0.1);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "You are a planner.");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{
            "id": "chatcmpl-123",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"weeks\": []}"}}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content, "{\"weeks\": []}");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            OllamaClient::new("http://localhost:11434/v1/".to_string(), "llama3.1".to_string())
                .unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
    }
}
