//! Remote reasoning service — chat completion over an OpenRouter-style API
//!
//! One blocking request per turn with a bearer credential, a fixed model
//! identifier and an enforced timeout. Every failure mode is a typed
//! `ResponseError` so the orchestrator can surface it and keep the
//! conversation alive.

use crate::error::{ResponseError, VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "deepseek/deepseek-r1:free";

/// Configuration for the response client
#[derive(Debug, Clone)]
pub struct ResponseConfig {
    /// Base URL without trailing slash
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Sampling temperature (default: 0.7)
    pub temperature: f32,

    /// Response token budget (default: 800)
    pub max_tokens: u32,

    /// Call-level timeout; a slow service is reported, not waited on
    /// (default: 30 seconds)
    pub timeout: Duration,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            base_url: OPENROUTER_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 800,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Text in, text out — or a typed failure. The conversation loop never sees
/// an untyped error from this boundary.
pub trait ResponseClient: Send {
    fn generate(&self, prompt: &str) -> Result<String, ResponseError>;
}

// OpenAI-compatible request/response shapes
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Map a non-success HTTP status to its typed failure.
pub fn classify_status(status: u16, body: String) -> ResponseError {
    match status {
        401 => ResponseError::Unauthorized,
        429 => ResponseError::RateLimited,
        _ => ResponseError::Api { status, body },
    }
}

fn classify_transport(err: &reqwest::Error) -> ResponseError {
    if err.is_timeout() {
        ResponseError::Timeout
    } else {
        ResponseError::Connection(err.to_string())
    }
}

/// Blocking OpenRouter chat client.
pub struct OpenRouterClient {
    config: ResponseConfig,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl OpenRouterClient {
    /// Build from environment: `OPENROUTER_API_KEY`. A missing credential is
    /// a setup error — the conversation must not start without one.
    pub fn from_env() -> VoiceResult<Self> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| VoiceError::Config("OPENROUTER_API_KEY not set".to_string()))?;
        Self::new(api_key, ResponseConfig::default())
    }

    pub fn new(api_key: impl Into<String>, config: ResponseConfig) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            config,
            api_key: api_key.into(),
            client,
        })
    }

    /// Override the model (e.g. `deepseek/deepseek-r1:free`,
    /// `meta-llama/llama-3.3-70b-instruct`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }
}

impl ResponseClient for OpenRouterClient {
    fn generate(&self, prompt: &str) -> Result<String, ResponseError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(model = %self.config.model, "requesting chat completion");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| classify_transport(&e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = res.json().map_err(|e| ResponseError::Api {
            status: status.as_u16(),
            body: format!("malformed response: {}", e),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ResponseError::Api {
                status: status.as_u16(),
                body: "no choices in response".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_the_service_contract() {
        let config = ResponseConfig::default();
        assert_eq!(config.model, "deepseek/deepseek-r1:free");
        assert!((config.temperature - 0.7).abs() < 1e-6);
        assert_eq!(config.max_tokens, 800);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(401, String::new()),
            ResponseError::Unauthorized
        );
        assert_eq!(
            classify_status(429, String::new()),
            ResponseError::RateLimited
        );
        assert_eq!(
            classify_status(500, "boom".to_string()),
            ResponseError::Api {
                status: 500,
                body: "boom".to_string()
            }
        );
    }

    #[test]
    fn request_body_serializes_expected_shape() {
        let body = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            temperature: 0.7,
            max_tokens: 800,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "deepseek/deepseek-r1:free");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 800);
    }
}
