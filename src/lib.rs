//! # gert
//!
//! gert is the conversation engine behind a voice-activated assistant. The
//! voice front-end (wake word, speech-to-text, text-to-speech) lives outside
//! this crate; what lives here is everything between a transcribed user
//! request and the answer that gets spoken back:
//!
//! * **Tool-calling turns**: a bounded loop that lets the local primary model
//!   request tools, observe their results, and iterate — see
//!   [`turn_loop::ToolCallingLoop`]
//! * **Multi-model consensus**: concurrent fan-out of one prompt to several
//!   independent providers, returned raw or reconciled by a judge model —
//!   see [`consensus::ConsensusDispatcher`]
//! * **Durable conversations**: append-only, hash-chained conversation files
//!   with keyword search and out-of-band summarization — see
//!   [`store::ConversationStore`]
//! * **Provider flexibility**: one [`ProviderClient`] contract implemented
//!   for the local Ollama runtime, OpenAI, xAI Grok, Google Gemini, and
//!   Anthropic Claude, all reached through the same OpenAI-compatible
//!   transport
//! * **Tools as capabilities**: a [`ToolRegistry`] keyed by name, with
//!   built-in tools for model delegation, consensus queries, and
//!   conversation recall; the embedding application registers the rest
//!
//! ## Quickstart
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
//!
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
//!     // One spoken request == one turn. Pass the returned id back in to
//!     // continue the same conversation.
//!     let (answer, conversation_id) = orchestrator
//!         .run_conversation("What is the capital of France?", None)
//!         .await?;
//!     println!("[{}] {}", conversation_id, answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Consensus
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gert::{ConsensusDispatcher, GertConfig, ProviderGateway};
//! use gert::providers::gemini::GeminiClient;
//! use gert::providers::grok::GrokClient;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut gateway = ProviderGateway::new();
//! gateway.register(
//!     "gemini",
//!     Arc::new(GeminiClient::new_with_model_str("key", "gemini-2.5-pro")),
//! );
//! gateway.register(
//!     "grok",
//!     Arc::new(GrokClient::new_with_model_str("key", "grok-4")),
//! );
//!
//! let dispatcher =
//!     ConsensusDispatcher::new(Arc::new(gateway), Arc::new(GertConfig::default()));
//! let result = dispatcher
//!     .consensus(
//!         "Explain the CAP theorem",
//!         &["gemini".to_string(), "grok".to_string()],
//!     )
//!     .await?;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Lightweight on purpose: applications embedding gert opt in to simple
/// `RUST_LOG` driven diagnostics without committing to a logging backend.
///
/// ```rust
/// gert::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `gert` module.
pub mod gert;

// Re-exporting key items for easier external access.
pub use crate::gert::config::{GertConfig, DEFAULT_SYSTEM_PROMPT};
pub use crate::gert::consensus;
pub use crate::gert::consensus::{
    AggregationMethod, ConsensusDispatcher, ConsensusError, ConsensusResult,
};
pub use crate::gert::conversation::{Conversation, ToolCall, ToolOutcome, Turn, TurnRole};
pub use crate::gert::orchestrator::{Orchestrator, OrchestratorError};
pub use crate::gert::provider::{
    Message, ProviderClient, ProviderError, ProviderGateway, ProviderResponse, ProviderStatus,
    Role,
};
pub use crate::gert::providers;
pub use crate::gert::store;
pub use crate::gert::store::{ConversationStore, StoreError};
pub use crate::gert::tool_protocol::{
    FunctionTool, Tool, ToolError, ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry,
    ToolResult,
};
pub use crate::gert::tools;
pub use crate::gert::turn_loop;
pub use crate::gert::turn_loop::{LoopError, LoopState, ToolCallingLoop, TurnOutcome};
