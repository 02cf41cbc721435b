//! Conversation data model.
//!
//! A [`Conversation`] is an ordered, append-only sequence of [`Turn`]s plus an
//! optional rolling summary. Turns are immutable once committed; the only
//! field of a conversation that is ever rewritten is the summary.
//!
//! Tool activity inside an assistant turn is recorded as paired
//! [`ToolCall`] / [`ToolOutcome`] entries. Both carry a turn-scoped sequence
//! number so that results can always be matched to the request that produced
//! them, no matter in which order the executions completed.
//!
//! ```text
//! Conversation
//!   ├─ Turn #0  user       "Who created Rust?"
//!   ├─ Turn #1  assistant  calls=[{seq:0, wikipedia_search}, {seq:1, web_search}]
//!   │                      results=[{seq:0, ok}, {seq:1, ok}]
//!   └─ Turn #2  user       "And when?"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gert::tool_protocol::ToolResult;

/// Role of a single turn within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Spoken (or typed) input from the person talking to the assistant.
    User,
    /// Output produced by the primary model, including any tool activity.
    Assistant,
    /// A standalone tool execution record.
    Tool,
}

/// A structured tool request issued by the assistant within one turn.
///
/// `seq` establishes issuance order and is unique within the turn. Argument
/// keys are unique by construction (`serde_json::Map`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub seq: u32,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// The result of executing one [`ToolCall`], tagged with the same `seq`.
///
/// Never mutated after creation. A failed execution is still an outcome —
/// `result.success` is `false` and `result.error` carries the detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub seq: u32,
    pub result: ToolResult,
}

/// One role-tagged exchange within a conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    /// Text content; `None` for turns that carry only tool activity.
    pub content: Option<String>,
    /// Tool requests issued by the assistant in this turn, in issuance order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Outcomes matching `tool_calls`, ordered by `seq`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolOutcome>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// A plain user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A plain assistant turn with no tool activity.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn carrying tool requests and their outcomes.
    pub fn assistant_with_tools(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolOutcome>,
    ) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: Some(content.into()),
            tool_calls,
            tool_results,
            timestamp: Utc::now(),
        }
    }

    /// Check that every outcome references a call issued earlier in this turn
    /// and that no call is answered twice. Orphan or duplicate results mean
    /// the turn was assembled incorrectly.
    pub fn tool_results_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        for outcome in &self.tool_results {
            if !self.tool_calls.iter().any(|c| c.seq == outcome.seq) {
                return false;
            }
            if !seen.insert(outcome.seq) {
                return false;
            }
        }
        true
    }
}

/// A full conversation as returned by the store.
///
/// Owned exclusively by the store; callers receive clones. Turns are never
/// deleted or reordered after being committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub turns: Vec<Turn>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Concatenate user and assistant text, used for summarization and search.
    pub fn transcript(&self) -> String {
        let mut text = String::new();
        for turn in &self.turns {
            let label = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
                TurnRole::Tool => continue,
            };
            if let Some(content) = &turn.content {
                text.push_str(label);
                text.push_str(": ");
                text.push_str(content);
                text.push('\n');
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(seq: u32, name: &str) -> ToolCall {
        ToolCall {
            seq,
            name: name.to_string(),
            arguments: serde_json::Map::new(),
        }
    }

    fn outcome(seq: u32) -> ToolOutcome {
        ToolOutcome {
            seq,
            result: ToolResult::success(serde_json::json!({})),
        }
    }

    #[test]
    fn test_tool_results_consistent() {
        let turn = Turn::assistant_with_tools(
            "done",
            vec![call(0, "wikipedia_search"), call(1, "web_search")],
            vec![outcome(1), outcome(0)],
        );
        assert!(turn.tool_results_consistent());
    }

    #[test]
    fn test_orphan_tool_result_detected() {
        let turn = Turn::assistant_with_tools("done", vec![call(0, "web_search")], vec![outcome(7)]);
        assert!(!turn.tool_results_consistent());
    }

    #[test]
    fn test_duplicate_tool_result_detected() {
        let turn = Turn::assistant_with_tools(
            "done",
            vec![call(0, "web_search")],
            vec![outcome(0), outcome(0)],
        );
        assert!(!turn.tool_results_consistent());
    }

    #[test]
    fn test_turn_round_trips_through_json() {
        let turn = Turn::assistant_with_tools("ok", vec![call(0, "recall")], vec![outcome(0)]);
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, TurnRole::Assistant);
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_results[0].seq, 0);
    }

    #[test]
    fn test_transcript_skips_tool_turns() {
        let convo = Conversation {
            id: "c1".into(),
            turns: vec![
                Turn::user("hello"),
                Turn {
                    role: TurnRole::Tool,
                    content: Some("raw tool output".into()),
                    tool_calls: Vec::new(),
                    tool_results: Vec::new(),
                    timestamp: Utc::now(),
                },
                Turn::assistant("hi"),
            ],
            summary: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let transcript = convo.transcript();
        assert!(transcript.contains("User: hello"));
        assert!(transcript.contains("Assistant: hi"));
        assert!(!transcript.contains("raw tool output"));
    }
}
