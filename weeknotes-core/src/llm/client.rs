//! HTTP completion client for Ollama, Claude and OpenAI

use super::LlmClient;
use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::time::Duration;

const MAX_OUTPUT_TOKENS: u32 = 1024;

/// Blocking completion client over reqwest.
pub struct HttpLlmClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string())
            .trim_end_matches('/')
            .to_string();
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Llm(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            runtime,
            http,
        })
    }

    fn request(&self, system: &str, prompt: &str) -> Result<reqwest::RequestBuilder> {
        let builder = match self.provider {
            LlmProvider::Ollama => self
                .http
                .post(format!("{}/api/generate", self.endpoint))
                .json(&json!({
                    "model": self.model,
                    "system": system,
                    "prompt": prompt,
                    "stream": false,
                })),
            LlmProvider::Claude => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                        .map_err(|e| Error::Config(format!("invalid claude api key header: {e}")))?,
                );
                headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
                self.http
                    .post(format!("{}/v1/messages", self.endpoint))
                    .headers(headers)
                    .json(&json!({
                        "model": self.model,
                        "max_tokens": MAX_OUTPUT_TOKENS,
                        "temperature": 0,
                        "system": system,
                        "messages": [{ "role": "user", "content": prompt }],
                    }))
            }
            LlmProvider::OpenAI => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!(
                        "Bearer {}",
                        self.api_key.as_deref().unwrap_or_default()
                    ))
                    .map_err(|e| Error::Config(format!("invalid auth header: {e}")))?,
                );
                self.http
                    .post(format!("{}/v1/chat/completions", self.endpoint))
                    .headers(headers)
                    .json(&json!({
                        "model": self.model,
                        "temperature": 0,
                        "messages": [
                            { "role": "system", "content": system },
                            { "role": "user", "content": prompt }
                        ]
                    }))
            }
        };
        Ok(builder)
    }
}

impl LlmClient for HttpLlmClient {
    fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = self.request(system, prompt)?;
        let provider = self.provider;

        self.runtime.block_on(async move {
            let resp = request.send().await.map_err(request_error)?;
            let status = resp.status();
            let body = resp.text().await.map_err(request_error)?;
            if !status.is_success() {
                let message = format!("{provider:?} returned {}: {}", status.as_u16(), body);
                return Err(if is_transient_status(status) {
                    Error::TransientExternal(message)
                } else {
                    Error::Llm(message)
                });
            }
            let json: serde_json::Value = serde_json::from_str(&body)?;
            extract_text(provider, &json)
        })
    }
}

/// Pull the completion text out of a provider response body.
fn extract_text(provider: LlmProvider, json: &serde_json::Value) -> Result<String> {
    let text = match provider {
        LlmProvider::Ollama => json.get("response").and_then(|v| v.as_str()),
        LlmProvider::Claude => json
            .get("content")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str()),
        LlmProvider::OpenAI => json
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str()),
    };
    text.map(ToString::to_string)
        .ok_or_else(|| Error::Llm(format!("{provider:?} response missing completion text")))
}

fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Error::TransientExternal(format!("LLM request failed: {e}"))
    } else {
        Error::Llm(format!("LLM request failed: {e}"))
    }
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}
