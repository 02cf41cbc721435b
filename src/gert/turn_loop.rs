//! Bounded tool-calling loop for a single conversational turn.
//!
//! The primary model may request zero or more tools, observe their results,
//! and decide whether to request further tools or produce a final answer. The
//! loop drives that exchange as an explicit state machine so that termination
//! is auditable:
//!
//! ```text
//! AwaitingModel ──► ModelResponded ──┬─► Terminal            (no tool calls)
//!        ▲                           │
//!        └────── ExecutingTools ◄────┘   (one or more calls)
//! ```
//!
//! A bounded iteration counter caps the number of `AwaitingModel →
//! ExecutingTools` round-trips within one turn; reaching the bound forces a
//! transition to `Terminal` with the last available model text. Tool failures
//! — including requests for tools that do not exist — are captured as error
//! results and fed back to the model as data. Only a failure of the primary
//! model itself aborts the turn.
//!
//! Tool requests arrive embedded in the model's text as JSON fragments of the
//! form `{"tool_call": {"name": "...", "parameters": {...}}}`; every fragment
//! in a response is extracted and the requests are executed concurrently,
//! each tagged with a turn-scoped sequence number so results can be matched
//! to their originating call regardless of completion order.

use futures_util::future::join_all;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::gert::config::GertConfig;
use crate::gert::conversation::{ToolCall, ToolOutcome, Turn};
use crate::gert::provider::{Message, ProviderGateway, Role};
use crate::gert::tool_protocol::{ToolRegistry, ToolResult};

/// States of the turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the primary model to respond.
    AwaitingModel,
    /// A model response is in hand and has not been inspected yet.
    ModelResponded,
    /// Executing the tool calls found in the latest response.
    ExecutingTools,
    /// The turn is finished.
    Terminal,
}

/// Error raised when the turn cannot complete.
///
/// Tool-level failures never surface here; only the primary model failing
/// (or timing out) is fatal to the turn.
#[derive(Debug)]
pub enum LoopError {
    Provider { provider_id: String, detail: String },
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Provider {
                provider_id,
                detail,
            } => write!(f, "Primary model '{}' failed: {}", provider_id, detail),
        }
    }
}

impl Error for LoopError {}

/// Result of one completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Final answer text for the caller.
    pub answer: String,
    /// The assistant turn to persist, carrying all tool calls and outcomes.
    pub turn: Turn,
    /// Number of model→tool round-trips used.
    pub iterations: u32,
}

/// Drives one conversational turn against the primary model.
pub struct ToolCallingLoop<'a> {
    gateway: &'a ProviderGateway,
    registry: &'a Arc<ToolRegistry>,
    config: &'a GertConfig,
}

impl<'a> ToolCallingLoop<'a> {
    pub fn new(
        gateway: &'a ProviderGateway,
        registry: &'a Arc<ToolRegistry>,
        config: &'a GertConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            config,
        }
    }

    /// Run the turn: `history` is the prior conversation rendered as provider
    /// messages, `user_text` the new user input.
    pub async fn run(
        &self,
        history: &[Message],
        user_text: &str,
    ) -> Result<TurnOutcome, LoopError> {
        let limit = self.config.max_tool_iterations.max(1);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::new(Role::System, self.system_prompt()));
        messages.extend_from_slice(history);

        let mut state = LoopState::AwaitingModel;
        let mut iterations = 0u32;
        let mut next_seq = 0u32;
        let mut all_calls: Vec<ToolCall> = Vec::new();
        let mut all_outcomes: Vec<ToolOutcome> = Vec::new();
        let mut pending_prompt = user_text.to_string();
        let mut pending_calls: Vec<ToolCall> = Vec::new();
        let mut last_text = String::new();

        let answer = loop {
            match state {
                LoopState::AwaitingModel => {
                    let response = self
                        .gateway
                        .invoke(
                            &self.config.primary_provider,
                            &pending_prompt,
                            &messages,
                            self.config.provider_timeout,
                        )
                        .await;
                    if !response.is_ok() {
                        return Err(LoopError::Provider {
                            provider_id: response.provider_id,
                            detail: response
                                .error
                                .unwrap_or_else(|| "no response".to_string()),
                        });
                    }
                    messages.push(Message::new(Role::User, pending_prompt.clone()));
                    messages.push(Message::new(Role::Assistant, response.text.clone()));
                    last_text = response.text;
                    state = LoopState::ModelResponded;
                }
                LoopState::ModelResponded => {
                    let requests = parse_tool_calls(&last_text);
                    if requests.is_empty() {
                        state = LoopState::Terminal;
                        break last_text.clone();
                    }
                    if iterations >= limit {
                        info!(
                            "tool iteration limit ({}) reached; forcing terminal state",
                            limit
                        );
                        state = LoopState::Terminal;
                        break limit_answer(&last_text);
                    }
                    pending_calls = requests
                        .into_iter()
                        .map(|(name, arguments)| {
                            let call = ToolCall {
                                seq: next_seq,
                                name,
                                arguments,
                            };
                            next_seq += 1;
                            call
                        })
                        .collect();
                    state = LoopState::ExecutingTools;
                }
                LoopState::ExecutingTools => {
                    iterations += 1;
                    debug!(
                        "iteration {}: executing {} tool call(s)",
                        iterations,
                        pending_calls.len()
                    );
                    let outcomes = self.execute_batch(&pending_calls).await;
                    pending_prompt = render_outcomes(&pending_calls, &outcomes);
                    all_calls.append(&mut pending_calls);
                    all_outcomes.extend(outcomes);
                    state = LoopState::AwaitingModel;
                }
                LoopState::Terminal => unreachable!("terminal state breaks the loop"),
            }
        };

        debug_assert_eq!(state, LoopState::Terminal);
        let turn = Turn::assistant_with_tools(answer.clone(), all_calls, all_outcomes);
        debug_assert!(turn.tool_results_consistent());

        Ok(TurnOutcome {
            answer,
            turn,
            iterations,
        })
    }

    /// System prompt: configured persona plus a rendering of every registered
    /// tool and the calling convention.
    fn system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();
        let tools = self.registry.list_metadata();
        if tools.is_empty() {
            return prompt;
        }
        prompt.push_str("\n\nYou have access to the following tools:\n");
        for metadata in tools {
            prompt.push_str(&format!("- {}: {}\n", metadata.name, metadata.description));
            if !metadata.parameters.is_empty() {
                prompt.push_str("  Parameters:\n");
                for param in &metadata.parameters {
                    prompt.push_str(&format!(
                        "    - {} ({:?}): {}\n",
                        param.name,
                        param.param_type,
                        param.description.as_deref().unwrap_or("No description")
                    ));
                }
            }
        }
        prompt.push_str(
            "\nTo use a tool, respond with a JSON object in the following format:\n\
             {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
             You may request several tools in one response. After execution I \
             will provide the results and you can continue.\n",
        );
        prompt
    }

    /// Execute one batch of sibling tool calls concurrently.
    ///
    /// Each call runs in its own task under `tool_timeout`. There is no
    /// ordering requirement between siblings; outcomes are re-ordered by
    /// sequence number afterwards. Every failure mode — unknown tool,
    /// execution error, timeout, even a panicking tool — becomes an error
    /// result so the pairing invariant always holds.
    async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolOutcome> {
        let mut tasks = Vec::with_capacity(calls.len());
        for call in calls {
            let registry = Arc::clone(self.registry);
            let name = call.name.clone();
            let arguments = serde_json::Value::Object(call.arguments.clone());
            let timeout = self.config.tool_timeout;
            tasks.push(tokio::spawn(async move {
                match tokio::time::timeout(timeout, registry.execute(&name, arguments)).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(err)) => {
                        warn!("tool '{}' failed: {}", name, err);
                        ToolResult::failure(err.to_string())
                    }
                    Err(_) => {
                        warn!("tool '{}' timed out after {:?}", name, timeout);
                        ToolResult::failure(format!(
                            "Tool '{}' timed out after {:?}",
                            name, timeout
                        ))
                    }
                }
            }));
        }

        let mut outcomes: Vec<ToolOutcome> = Vec::with_capacity(calls.len());
        for (call, joined) in calls.iter().zip(join_all(tasks).await) {
            let result = match joined {
                Ok(result) => result,
                Err(err) => ToolResult::failure(format!("Tool task aborted: {}", err)),
            };
            outcomes.push(ToolOutcome {
                seq: call.seq,
                result,
            });
        }
        outcomes.sort_by_key(|o| o.seq);
        outcomes
    }
}

/// Extract every `{"tool_call": ...}` fragment from a model response, in
/// textual order. Uses brace counting to find each fragment's end, which
/// copes with the common case of the model wrapping calls in prose.
pub(crate) fn parse_tool_calls(
    response: &str,
) -> Vec<(String, serde_json::Map<String, serde_json::Value>)> {
    let mut found = Vec::new();
    let mut offset = 0;
    let bytes = response.as_bytes();

    while let Some(rel) = response[offset..].find("{\"tool_call\"") {
        let start = offset + rel;
        let mut depth = 0i32;
        let mut end = None;
        for (i, byte) in bytes.iter().enumerate().skip(start) {
            match byte {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = match end {
            Some(end) => end,
            None => break,
        };
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&response[start..end]) {
            if let Some(call) = value.get("tool_call") {
                if let (Some(name), Some(serde_json::Value::Object(parameters))) =
                    (call.get("name").and_then(|v| v.as_str()), call.get("parameters"))
                {
                    found.push((name.to_string(), parameters.clone()));
                }
            }
        }
        offset = end;
    }

    found
}

/// Render a batch of outcomes back to the model as plain text.
fn render_outcomes(calls: &[ToolCall], outcomes: &[ToolOutcome]) -> String {
    let mut rendered = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let name = calls
            .iter()
            .find(|c| c.seq == outcome.seq)
            .map(|c| c.name.as_str())
            .unwrap_or("unknown");
        if outcome.result.success {
            rendered.push(format!(
                "Tool '{}' executed successfully. Result: {}",
                name,
                serde_json::to_string_pretty(&outcome.result.output)
                    .unwrap_or_else(|_| format!("{:?}", outcome.result.output))
            ));
        } else {
            rendered.push(format!(
                "Tool '{}' failed. Error: {}",
                name,
                outcome
                    .result
                    .error
                    .as_deref()
                    .unwrap_or("Unknown error")
            ));
        }
    }
    rendered.push(
        "Based on these tool results, provide a helpful response to the user's \
         original question, or request another tool if needed."
            .to_string(),
    );
    rendered.join("\n\n")
}

/// Terminal answer when the iteration bound is hit: the last model text with
/// the tool-call fragments stripped, or an explicit notice if nothing but
/// tool requests was produced.
fn limit_answer(last_text: &str) -> String {
    let mut stripped = last_text.to_string();
    if let Some(idx) = stripped.find("{\"tool_call\"") {
        stripped.truncate(idx);
    }
    let stripped = stripped.trim();
    if stripped.is_empty() {
        "Tool iteration limit reached before a final answer was produced.".to_string()
    } else {
        format!("{}\n\n[Warning: maximum tool iterations reached]", stripped)
    }
}
