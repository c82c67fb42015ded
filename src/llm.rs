//! Client for OpenAI-compatible chat completion APIs.
//!
//! The rewrite pipeline only sees the `CompletionClient` trait; the HTTP
//! client here is the production implementation.

use crate::config::Config;
use crate::error::{RewriteError, RunError};
use crate::retry::{with_retry_if, RetryConfig};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A validated API credential for the rewrite service.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    const MIN_LENGTH: usize = 8;

    /// Check the credential's shape before any remote call is made.
    pub fn parse(raw: &str) -> Result<Self, RunError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(RunError::MissingCredential);
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(RunError::MalformedCredential("contains whitespace"));
        }
        if !key.is_ascii() {
            return Err(RunError::MalformedCredential("contains non-ASCII characters"));
        }
        if key.len() < Self::MIN_LENGTH {
            return Err(RunError::MalformedCredential("too short"));
        }
        Ok(Credential(key.to_string()))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// One completion call: a system instruction and the user message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A remote text-transform function.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, RewriteError>> + Send;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    credential: Credential,
    timeout: Duration,
    retry: RetryConfig,
}

impl OpenAiClient {
    pub fn new(config: &Config, credential: Credential) -> Result<Self, RewriteError> {
        let timeout = Duration::from_secs(config.rewrite_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RewriteError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: config.rewrite_api_url.clone(),
            model: config.rewrite_model.clone(),
            credential,
            timeout,
            retry: RetryConfig::rewrite_call(config.rewrite_max_attempts),
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, RewriteError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", self.credential.bearer())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RewriteError::Timeout(self.timeout)
                } else {
                    RewriteError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(match status.as_u16() {
                401 | 403 => RewriteError::Auth {
                    status: status.as_u16(),
                },
                429 => RewriteError::RateLimited,
                code => RewriteError::Api { status: code, body },
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| RewriteError::MalformedResponse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(RewriteError::EmptyResponse)
    }
}

impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, RewriteError> {
        debug!(
            "Requesting completion from {} ({} prompt chars)",
            self.model,
            request.user.len()
        );
        with_retry_if(
            &self.retry,
            "Rewrite call",
            || self.send_once(request),
            RewriteError::is_retryable,
        )
        .await
    }
}
