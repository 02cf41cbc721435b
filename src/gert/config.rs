//! Configuration for the assistant engine.
//!
//! [`GertConfig`] is built once at startup and passed by reference into the
//! [`Orchestrator`](crate::orchestrator::Orchestrator) and
//! [`ConsensusDispatcher`](crate::consensus::ConsensusDispatcher) — it is
//! never read from ambient global state. Users construct it manually; no
//! config-file parsing dependencies are introduced.
//!
//! # Example
//!
//! ```rust
//! use gert::GertConfig;
//!
//! let config = GertConfig {
//!     max_tool_iterations: 5,
//!     ..GertConfig::default()
//! };
//! assert_eq!(config.primary_provider, "ollama");
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Global settings for a running assistant.
pub struct GertConfig {
    /// Directory where conversation `.jsonl` files and the index are stored.
    pub conversations_dir: PathBuf,
    /// Provider id of the tool-calling primary model.
    pub primary_provider: String,
    /// Provider id used for out-of-band conversation summarization.
    pub summary_provider: String,
    /// Cap on model→tool round-trips within a single turn. Must be ≥ 1.
    pub max_tool_iterations: u32,
    /// Deadline for a single provider call.
    pub provider_timeout: Duration,
    /// Deadline for a single tool execution.
    pub tool_timeout: Duration,
    /// Overall deadline for one consensus fan-out; providers not settled by
    /// then are recorded as timed out.
    pub dispatch_deadline: Duration,
    /// Providers queried by the consensus tools.
    pub consensus_providers: Vec<String>,
    /// Fixed ranking used to pick a fallback answer when the superconsensus
    /// judge fails. Earlier entries win.
    pub provider_priority: Vec<String>,
    /// Provider id that judges superconsensus responses.
    pub judge_provider: String,
    /// Whether the judge sees which provider wrote which response. When
    /// false, responses are presented under anonymous labels.
    pub reveal_sources: bool,
    /// System prompt for the primary model.
    pub system_prompt: String,
}

/// Default persona for the primary model. Written for a voice pipeline: the
/// output is fed to text-to-speech, so formatting characters are discouraged.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an intelligent voice assistant with access to external tools.\n\
If you do not know something or need current information, use the tools \
instead of guessing. Be concise: your answer is read aloud by a \
text-to-speech program, so avoid formatting characters, lists, and emojis. \
The user's request arrives via speech-to-text and may contain minor \
transcription errors.";

impl Default for GertConfig {
    fn default() -> Self {
        Self {
            conversations_dir: PathBuf::from("conversations"),
            primary_provider: "ollama".to_string(),
            summary_provider: "ollama".to_string(),
            max_tool_iterations: 3,
            provider_timeout: Duration::from_secs(600),
            tool_timeout: Duration::from_secs(30),
            dispatch_deadline: Duration::from_secs(900),
            consensus_providers: vec![
                "gemini".to_string(),
                "grok".to_string(),
                "gpt".to_string(),
                "claude".to_string(),
            ],
            provider_priority: vec![
                "claude".to_string(),
                "gpt".to_string(),
                "gemini".to_string(),
                "grok".to_string(),
            ],
            judge_provider: "gpt".to_string(),
            reveal_sources: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}
