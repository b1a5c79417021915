//! Generation oracle abstraction.
//!
//! The oracle is the external text-generation service used for impact
//! analysis, plan extraction, and per-file code synthesis. Every backend
//! adapts its own response envelope into the single canonical [`Completion`]
//! at the boundary, so nothing downstream branches on response shape.
//!
//! # Architecture
//!
//! - [`GenerationOracle`] - object-safe async trait implemented by backends
//! - [`http::HttpOracle`] - Anthropic-compatible messages endpoint
//! - [`command::CommandOracle`] - local CLI, prompt on stdin, answer on stdout
//! - [`retry::RetryingOracle`] - per-call timeout plus bounded retry
//! - [`retry::generate_all`] - ordered fan-out under a concurrency ceiling
//! - [`MockOracle`] - scripted oracle for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use feature_factory::llm::{CompletionRequest, GenerationOracle, MockOracle};
//!
//! let oracle = MockOracle::new().with_response("print(1)");
//! let completion = oracle.complete(&CompletionRequest::new("write it")).await?;
//! assert_eq!(completion.text, "print(1)");
//! ```

pub mod command;
pub mod http;
pub mod retry;

pub use command::CommandOracle;
pub use http::HttpOracle;
pub use retry::{generate_all, RetryPolicy, RetryingOracle};

use crate::config::{FactoryConfig, OracleBackend};
use crate::snapshot::SourceRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Failure of the generation (or retrieval) service.
///
/// Only [`OracleError::is_transient`] failures are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Connection drops, rate limits, server errors
    #[error("transient oracle failure: {message}")]
    Transient { message: String },

    /// The call did not finish within the per-call timeout
    #[error("oracle call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Authentication, bad request, missing backend
    #[error("permanent oracle failure: {message}")]
    Permanent { message: String },

    /// The response envelope could not be understood
    #[error("malformed oracle response: {message}")]
    Malformed { message: String },
}

impl OracleError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Check if a retry could succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

// =============================================================================
// Request / response
// =============================================================================

/// One generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    /// System message; backends fall back to their configured default.
    pub system: Option<String>,
    /// Retrieved records grounding the request.
    pub grounding: Vec<SourceRecord>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            grounding: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_grounding(mut self, grounding: Vec<SourceRecord>) -> Self {
        self.grounding = grounding;
        self
    }

    /// Prompt text with any grounding documents rendered ahead of it.
    #[must_use]
    pub fn render_prompt(&self) -> String {
        if self.grounding.is_empty() {
            return self.prompt.clone();
        }

        let mut out = String::from("Relevant project files:\n\n");
        for record in &self.grounding {
            out.push_str(&format!(
                "Path: {}\nContent:\n{}\n\n",
                record.path.display(),
                record.content
            ));
        }
        out.push_str(&self.prompt);
        out
    }
}

/// Canonical oracle response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
        }
    }

    /// Adapt a backend response envelope.
    ///
    /// Accepts a bare string, `{"result": ..}`, `{"text": ..}`, or a
    /// messages-style `{"content": [{"type": "text", "text": ..}]}`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Malformed`] for any other shape. Empty text is
    /// a valid completion.
    pub fn from_envelope(value: &serde_json::Value) -> Result<Self, OracleError> {
        use serde_json::Value;

        let text = match value {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => {
                if let Some(Value::String(s)) = map.get("result") {
                    Some(s.clone())
                } else if let Some(Value::String(s)) = map.get("text") {
                    Some(s.clone())
                } else if let Some(Value::Array(blocks)) = map.get("content") {
                    let joined: String = blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .collect();
                    Some(joined)
                } else {
                    None
                }
            }
            _ => None,
        };

        match text {
            Some(t) => Ok(Self::new(t)),
            None => Err(OracleError::malformed(format!(
                "unrecognised response envelope: {}",
                truncate(&value.to_string(), 200)
            ))),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

// =============================================================================
// Trait
// =============================================================================

/// Abstraction over a text-generation backend.
///
/// Object-safe and `Send + Sync`, so a single `Arc<dyn GenerationOracle>` can
/// be shared by concurrent callers.
#[async_trait]
pub trait GenerationOracle: Send + Sync {
    /// Generate text for one request.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: GenerationOracle + ?Sized> GenerationOracle for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        (**self).complete(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Create the configured backend wrapped in the retry/timeout policy.
///
/// `api_key` is only required by the HTTP backend; the caller resolves it
/// once from the environment.
///
/// # Errors
///
/// Returns an error if the HTTP backend is selected without an API key or
/// the HTTP client cannot be built.
pub fn create_oracle(
    config: &FactoryConfig,
    api_key: Option<String>,
) -> Result<Arc<dyn GenerationOracle>, OracleError> {
    let oracle = &config.oracle;
    let policy = RetryPolicy::from_config(oracle);

    let backend: Arc<dyn GenerationOracle> = match oracle.backend {
        OracleBackend::Http => {
            let key = api_key.ok_or_else(|| {
                OracleError::permanent(format!(
                    "the http backend needs an API key ({} is not set)",
                    oracle.api_key_env
                ))
            })?;
            Arc::new(HttpOracle::new(
                &oracle.base_url,
                key,
                &oracle.model,
                oracle.max_tokens,
                &oracle.system_message,
            )?)
        }
        OracleBackend::Command => Arc::new(
            CommandOracle::new(&oracle.command)
                .with_args(oracle.args.clone())
                .with_system_message(&oracle.system_message),
        ),
    };

    Ok(Arc::new(RetryingOracle::new(backend, policy)))
}

// =============================================================================
// Mock
// =============================================================================

/// Mock oracle for testing.
///
/// Responses are routed by substring: the first route whose needle occurs in
/// the rendered prompt answers; otherwise the default response is returned.
/// Thread-safe for use in async contexts.
///
/// # Example
///
/// ```rust,ignore
/// let oracle = MockOracle::new()
///     .with_route("impacted nodes", "nodes: a.py")
///     .with_response("fallback");
/// ```
#[derive(Debug, Default)]
pub struct MockOracle {
    routes: Vec<(String, Result<String, OracleError>)>,
    response: String,
    /// Transient failures served before any success.
    fail_count: AtomicU32,
    delay: Option<Duration>,
    call_count: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl MockOracle {
    /// Create a new mock oracle answering with an empty string.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default response.
    #[must_use]
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Answer prompts containing `needle` with `response`.
    #[must_use]
    pub fn with_route(mut self, needle: &str, response: &str) -> Self {
        self.routes
            .push((needle.to_string(), Ok(response.to_string())));
        self
    }

    /// Fail prompts containing `needle` with `error`.
    #[must_use]
    pub fn with_failure_on(mut self, needle: &str, error: OracleError) -> Self {
        self.routes.push((needle.to_string(), Err(error)));
        self
    }

    /// Fail the first `count` calls with a transient error.
    #[must_use]
    pub fn with_fail_count(self, count: u32) -> Self {
        self.fail_count.store(count, Ordering::SeqCst);
        self
    }

    /// Sleep before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `complete` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Rendered prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationOracle for MockOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let prompt = request.render_prompt();
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.fail_count.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::SeqCst);
            return Err(OracleError::transient("mock failure"));
        }

        for (needle, outcome) in &self.routes {
            if prompt.contains(needle.as_str()) {
                return outcome.clone().map(Completion::new);
            }
        }

        Ok(Completion::new(self.response.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
