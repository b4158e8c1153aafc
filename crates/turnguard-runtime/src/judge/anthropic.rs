//! Anthropic Messages API judge backend.
//!
//! Sends the judge prompt as a single user message and returns the text
//! blocks of the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use turnguard_core::JudgeError;

use super::secrets::ApiCredential;
use super::JudgeBackend;
use crate::config::AnthropicSettings;

const API_VERSION: &str = "2023-06-01";

/// Judge backed by the Anthropic Messages API.
pub struct AnthropicBackend {
    credential: Arc<ApiCredential>,
    base_url: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(
        credential: Arc<ApiCredential>,
        settings: &AnthropicSettings,
    ) -> Result<Self, JudgeError> {
        if !settings.base_url.starts_with("http://") && !settings.base_url.starts_with("https://") {
            return Err(JudgeError::Unavailable(format!(
                "Anthropic base_url must start with http:// or https://, got '{}'",
                settings.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| JudgeError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            credential,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl JudgeBackend for AnthropicBackend {
    async fn ask(&self, prompt: &str, timeout: Duration) -> Result<String, JudgeError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout(timeout)
                } else {
                    JudgeError::Backend(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(JudgeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::Malformed(e.to_string()))?;

        Ok(body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
