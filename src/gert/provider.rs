//! Uniform provider contract and the gateway that enforces it.
//!
//! Every model backend — the local runtime as well as each remote vendor —
//! is a [`ProviderClient`] implementation registered in a [`ProviderGateway`]
//! under a short identifier (`"ollama"`, `"gemini"`, `"grok"`, ...). Callers
//! never talk to a concrete client directly; they go through
//! [`ProviderGateway::invoke`], which applies the caller's timeout, measures
//! latency, and folds every failure mode into a [`ProviderResponse`] status
//! instead of propagating an error.
//!
//! ```text
//! invoke("grok", prompt, history, 600s)
//!     └─ tokio::time::timeout ── GrokClient::send_message
//!            ├─ Ok(msg)              → status: Ok
//!            ├─ Err(Auth/Api)        → status: Error  (classified detail)
//!            └─ deadline elapsed     → status: Timeout
//! ```
//!
//! The gateway's provider table is built once at startup and is read-only for
//! the life of the process.

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Role of a chat message sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Steering instructions set by the application.
    System,
    /// Input attributed to the human user.
    User,
    /// Content previously generated by a model.
    Assistant,
}

/// A single chat message in a provider request.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Error raised by a concrete provider client.
///
/// Credential and configuration problems are classified as [`Auth`](ProviderError::Auth)
/// so the caller can tell a misconfigured key apart from an upstream outage.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Missing, rejected, or malformed credentials.
    Auth(String),
    /// Any other upstream failure (transport, 5xx, malformed body).
    Api(String),
}

impl ProviderError {
    /// Classify an error message from the wire layer.
    pub fn classify(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lowered = detail.to_lowercase();
        if lowered.contains("401")
            || lowered.contains("403")
            || lowered.contains("unauthorized")
            || lowered.contains("forbidden")
            || lowered.contains("api key")
        {
            ProviderError::Auth(detail)
        } else {
            ProviderError::Api(detail)
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(detail) => write!(f, "authentication failed: {}", detail),
            ProviderError::Api(detail) => write!(f, "provider call failed: {}", detail),
        }
    }
}

impl Error for ProviderError {}

/// Terminal status of one provider invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Ok,
    Timeout,
    Error,
}

/// Outcome of one provider invocation. Ephemeral — lives only for the
/// duration of a dispatch.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub provider_id: String,
    pub text: String,
    pub latency: Duration,
    pub status: ProviderStatus,
    pub error: Option<String>,
}

impl ProviderResponse {
    pub fn is_ok(&self) -> bool {
        self.status == ProviderStatus::Ok
    }
}

/// Trait implemented by every concrete model backend.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send a chat request and return the assistant message.
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ProviderError>;

    /// Model identifier used for logging.
    fn model_name(&self) -> &str;
}

/// Read-only table of provider clients keyed by identifier.
///
/// Built once before any conversation starts and shared across all
/// orchestrations via `Arc`.
pub struct ProviderGateway {
    providers: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderGateway {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a client under `provider_id`, replacing any previous entry.
    pub fn register(&mut self, provider_id: impl Into<String>, client: Arc<dyn ProviderClient>) {
        self.providers.insert(provider_id.into(), client);
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.providers.contains_key(provider_id)
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Invoke one provider with `prompt` appended to `history` as the final
    /// user message, enforcing `timeout` locally.
    ///
    /// This never returns an error: unknown ids, client failures, and blown
    /// deadlines are all folded into the returned [`ProviderResponse`] status
    /// so that one slow or broken backend degrades only its own entry.
    pub async fn invoke(
        &self,
        provider_id: &str,
        prompt: &str,
        history: &[Message],
        timeout: Duration,
    ) -> ProviderResponse {
        let client = match self.providers.get(provider_id) {
            Some(client) => client,
            None => {
                warn!("invoke: unknown provider '{}'", provider_id);
                return ProviderResponse {
                    provider_id: provider_id.to_string(),
                    text: String::new(),
                    latency: Duration::ZERO,
                    status: ProviderStatus::Error,
                    error: Some(format!("unknown provider: {}", provider_id)),
                };
            }
        };

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(Message::new(Role::User, prompt));

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, client.send_message(&messages)).await;
        let latency = started.elapsed();

        match outcome {
            Ok(Ok(message)) => {
                debug!(
                    "invoke: provider '{}' ({}) answered in {:?}",
                    provider_id,
                    client.model_name(),
                    latency
                );
                ProviderResponse {
                    provider_id: provider_id.to_string(),
                    text: message.content,
                    latency,
                    status: ProviderStatus::Ok,
                    error: None,
                }
            }
            Ok(Err(err)) => {
                warn!("invoke: provider '{}' failed: {}", provider_id, err);
                ProviderResponse {
                    provider_id: provider_id.to_string(),
                    text: String::new(),
                    latency,
                    status: ProviderStatus::Error,
                    error: Some(err.to_string()),
                }
            }
            Err(_) => {
                warn!(
                    "invoke: provider '{}' timed out after {:?}",
                    provider_id, timeout
                );
                ProviderResponse {
                    provider_id: provider_id.to_string(),
                    text: String::new(),
                    latency,
                    status: ProviderStatus::Timeout,
                    error: Some(format!("timed out after {:?}", timeout)),
                }
            }
        }
    }
}

impl Default for ProviderGateway {
    fn default() -> Self {
        Self::new()
    }
}
