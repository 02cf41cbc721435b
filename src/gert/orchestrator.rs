//! Top-level conversation entry point.
//!
//! The [`Orchestrator`] owns the wiring between the provider gateway, the
//! tool registry, and the conversation store. One call to
//! [`run_conversation`](Orchestrator::run_conversation) resolves (or creates)
//! a conversation, drives exactly one tool-calling turn against the primary
//! model, persists the outcome, and returns the final answer together with
//! the conversation id for follow-up turns.
//!
//! Independent conversations can be processed concurrently: all shared state
//! is read-only except the store, which serializes appends per conversation
//! id.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gert::{GertConfig, Orchestrator, ProviderGateway, ToolRegistry};
//! use gert::providers::ollama::OllamaClient;
//! use gert::store::ConversationStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     gert::init_logger();
//!
//!     let config = Arc::new(GertConfig::default());
//!     let mut gateway = ProviderGateway::new();
//!     gateway.register(
//!         "ollama",
//!         Arc::new(OllamaClient::new_with_model_str("gpt-oss:20b")),
//!     );
//!
//!     let store = Arc::new(ConversationStore::open(&config.conversations_dir)?);
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(gateway),
//!         Arc::new(ToolRegistry::new()),
//!         store,
//!         config,
//!     );
//!
//!     let (answer, id) = orchestrator
//!         .run_conversation("What is the capital of France?", None)
//!         .await?;
//!     println!("[{}] {}", id, answer);
//!     Ok(())
//! }
//! ```

use log::{info, warn};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::gert::config::GertConfig;
use crate::gert::conversation::{Turn, TurnRole};
use crate::gert::provider::{Message, ProviderGateway, Role};
use crate::gert::store::{ConversationStore, StoreError};
use crate::gert::tool_protocol::ToolRegistry;
use crate::gert::turn_loop::{LoopError, ToolCallingLoop};

/// Error types surfaced to the caller of [`Orchestrator::run_conversation`].
///
/// Everything else — tool failures, single-provider failures inside a
/// dispatch — is absorbed lower down and turned into data the model can
/// react to.
#[derive(Debug)]
pub enum OrchestratorError {
    /// The primary model could not complete the turn.
    Loop(LoopError),
    /// The conversation could not be read or durably written.
    Store(StoreError),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Loop(err) => write!(f, "{}", err),
            OrchestratorError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl Error for OrchestratorError {}

impl From<LoopError> for OrchestratorError {
    fn from(err: LoopError) -> Self {
        OrchestratorError::Loop(err)
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        OrchestratorError::Store(err)
    }
}

/// Wires the engine together and runs conversational turns.
pub struct Orchestrator {
    gateway: Arc<ProviderGateway>,
    registry: Arc<ToolRegistry>,
    store: Arc<ConversationStore>,
    config: Arc<GertConfig>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        registry: Arc<ToolRegistry>,
        store: Arc<ConversationStore>,
        config: Arc<GertConfig>,
    ) -> Self {
        Self {
            gateway,
            registry,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Run exactly one conversational turn.
    ///
    /// With no `conversation_id`, a fresh conversation is created. An id that
    /// does not resolve (say, after the history was cleared) also starts a
    /// fresh conversation rather than failing the user's request. Returns the
    /// final answer text and the (possibly new) conversation id.
    pub async fn run_conversation(
        &self,
        user_text: &str,
        conversation_id: Option<&str>,
    ) -> Result<(String, String), OrchestratorError> {
        let (id, history) = match conversation_id {
            Some(id) => match self.store.get(id).await {
                Ok(conversation) => {
                    info!(
                        "resuming conversation {} ({} turns)",
                        id,
                        conversation.turns.len()
                    );
                    (id.to_string(), render_history(&conversation.turns))
                }
                Err(StoreError::NotFound(_)) => {
                    warn!("conversation {} not found; starting a new one", id);
                    (self.store.create().await?, Vec::new())
                }
                Err(err) => return Err(err.into()),
            },
            None => {
                let id = self.store.create().await?;
                info!("created conversation {}", id);
                (id, Vec::new())
            }
        };

        let outcome = ToolCallingLoop::new(&self.gateway, &self.registry, &self.config)
            .run(&history, user_text)
            .await?;
        info!(
            "conversation {}: turn finished after {} tool iteration(s)",
            id, outcome.iterations
        );

        self.store.append(&id, Turn::user(user_text)).await?;
        self.store.append(&id, outcome.turn).await?;

        Ok((outcome.answer, id))
    }
}

/// Render stored turns into provider messages for the next model call.
///
/// Tool turns are folded into user-role messages, matching how tool results
/// were presented to the model when they were fresh.
fn render_history(turns: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(turns.len());
    for turn in turns {
        let content = match &turn.content {
            Some(content) if !content.is_empty() => content.clone(),
            _ => continue,
        };
        let role = match turn.role {
            TurnRole::User | TurnRole::Tool => Role::User,
            TurnRole::Assistant => Role::Assistant,
        };
        messages.push(Message { role, content });
    }
    messages
}
