//! HTTP generation backend.
//!
//! Talks to an Anthropic-compatible `/v1/messages` endpoint. Base URL, key and
//! model arrive through the constructor; this module never reads the
//! environment.

use super::{Completion, CompletionRequest, GenerationOracle, OracleError};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

/// Oracle backed by a messages-style HTTP API.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_message: String,
}

impl HttpOracle {
    /// Build a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Permanent`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        max_tokens: u32,
        system_message: &str,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| OracleError::permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_tokens,
            system_message: system_message.to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: request.system.as_deref().unwrap_or(&self.system_message),
            messages: vec![ApiMessage {
                role: "user",
                content: request.render_prompt(),
            }],
        }
    }
}

/// Map an HTTP status to the oracle error taxonomy.
pub fn classify_status(status: reqwest::StatusCode, body: &str) -> OracleError {
    let message = format!("API error {}: {}", status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        OracleError::transient(message)
    } else {
        OracleError::permanent(message)
    }
}

fn classify_transport(err: reqwest::Error) -> OracleError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        OracleError::transient(format!("HTTP request failed: {}", err))
    } else {
        OracleError::permanent(format!("HTTP request failed: {}", err))
    }
}

#[async_trait]
impl GenerationOracle for HttpOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        debug!(
            "POST {} ({} chars prompt, {} grounding docs)",
            self.endpoint(),
            request.prompt.len(),
            request.grounding.len()
        );

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(request))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OracleError::malformed(format!("response is not JSON: {}", e)))?;

        Completion::from_envelope(&value)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
