//! Built-in tools.
//!
//! These are the capabilities the assistant wires up out of the box: asking a
//! single secondary model, fanning a question out for consensus, and
//! recalling past conversations. Heavier capabilities (web search, file
//! access, code execution) are expected to be registered by the embedding
//! application.

pub mod consensus_query;
pub mod model_query;
pub mod recall;

pub use consensus_query::{ConsensusQueryTool, SuperconsensusTool};
pub use model_query::ProviderQueryTool;
pub use recall::RecallTool;
