//! Concurrent multi-provider dispatch and reconciliation.
//!
//! The dispatcher fans a prompt out to several independent providers at the
//! same logical time and reconciles whatever comes back:
//!
//! - **consensus** returns every successful response unmodified, for the
//!   caller (usually the primary model) to compare.
//! - **superconsensus** adds a judging pass: the successful responses are
//!   presented to one more provider which selects or synthesizes the final
//!   text. If the judge itself fails, the dispatcher falls back to the
//!   successful response whose provider ranks first in the configured
//!   priority order — never to an error, since the quorum check already
//!   guaranteed at least one success.
//!
//! Each provider call carries its own timeout and a slow or failing backend
//! degrades only its own entry; an overall dispatch deadline bounds the wait
//! for stragglers. Only the case where *every* provider fails surfaces as
//! [`ConsensusError::AggregateFailure`].
//!
//! The dispatcher's own control flow is deterministic given fixed inputs and
//! timings; the model outputs themselves are, of course, not.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::gert::config::GertConfig;
use crate::gert::provider::{ProviderGateway, ProviderResponse, ProviderStatus};

/// How the gathered responses were reconciled into one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Raw,
    Superconsensus,
}

/// Outcome of one dispatch. Ephemeral — returned to the caller and optionally
/// persisted as a single assistant turn.
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    /// The successful responses gathered, in dispatch order.
    pub responses: Vec<ProviderResponse>,
    pub method: AggregationMethod,
    /// Final selected or synthesized text.
    pub answer: String,
}

/// Error types for dispatch operations.
#[derive(Debug, Clone)]
pub enum ConsensusError {
    /// Every dispatched provider failed or timed out.
    AggregateFailure { attempted: usize },
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::AggregateFailure { attempted } => {
                write!(f, "all {} dispatched providers failed", attempted)
            }
        }
    }
}

impl Error for ConsensusError {}

/// Fans prompts out to providers and reconciles the answers.
pub struct ConsensusDispatcher {
    gateway: Arc<ProviderGateway>,
    config: Arc<GertConfig>,
}

impl ConsensusDispatcher {
    pub fn new(gateway: Arc<ProviderGateway>, config: Arc<GertConfig>) -> Self {
        Self { gateway, config }
    }

    /// Query all `provider_ids` concurrently and return the successful
    /// responses unmodified.
    pub async fn consensus(
        &self,
        prompt: &str,
        provider_ids: &[String],
    ) -> Result<ConsensusResult, ConsensusError> {
        let gathered = self.dispatch(prompt, provider_ids).await;
        let ok = self.quorum(gathered, provider_ids.len())?;

        let answer = render_raw_answer(prompt, &ok);
        info!(
            "consensus: {}/{} providers answered",
            ok.len(),
            provider_ids.len()
        );
        Ok(ConsensusResult {
            responses: ok,
            method: AggregationMethod::Raw,
            answer,
        })
    }

    /// Query all `provider_ids` concurrently, then let `judge_id` select or
    /// synthesize the final answer from the successful responses.
    pub async fn superconsensus(
        &self,
        prompt: &str,
        provider_ids: &[String],
        judge_id: &str,
    ) -> Result<ConsensusResult, ConsensusError> {
        let gathered = self.dispatch(prompt, provider_ids).await;
        let ok = self.quorum(gathered, provider_ids.len())?;

        let judge_prompt = render_judge_prompt(prompt, &ok, self.config.reveal_sources);
        let verdict = self
            .gateway
            .invoke(judge_id, &judge_prompt, &[], self.config.provider_timeout)
            .await;

        let answer = if verdict.is_ok() {
            verdict.text
        } else {
            // Quorum guaranteed at least one success, so a broken judge can
            // always be papered over deterministically.
            warn!(
                "superconsensus: judge '{}' failed ({}); falling back to priority order",
                judge_id,
                verdict.error.as_deref().unwrap_or("no detail")
            );
            self.fallback_by_priority(&ok).text.clone()
        };

        Ok(ConsensusResult {
            responses: ok,
            method: AggregationMethod::Superconsensus,
            answer,
        })
    }

    /// Launch one call per provider at the same logical time and wait for all
    /// of them to settle, up to the overall dispatch deadline. A provider not
    /// settled by the deadline is recorded as timed out.
    async fn dispatch(&self, prompt: &str, provider_ids: &[String]) -> Vec<ProviderResponse> {
        let mut tasks = Vec::with_capacity(provider_ids.len());
        for provider_id in provider_ids {
            let gateway = Arc::clone(&self.gateway);
            let provider_id = provider_id.clone();
            let prompt = prompt.to_string();
            let timeout = self.config.provider_timeout;
            tasks.push(tokio::spawn(async move {
                gateway.invoke(&provider_id, &prompt, &[], timeout).await
            }));
        }

        let deadline = tokio::time::Instant::now() + self.config.dispatch_deadline;
        let mut responses = Vec::with_capacity(tasks.len());
        for (provider_id, mut task) in provider_ids.iter().zip(tasks) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, &mut task).await {
                Ok(Ok(response)) => responses.push(response),
                Ok(Err(join_err)) => {
                    warn!("dispatch: task for '{}' aborted: {}", provider_id, join_err);
                    responses.push(ProviderResponse {
                        provider_id: provider_id.clone(),
                        text: String::new(),
                        latency: std::time::Duration::ZERO,
                        status: ProviderStatus::Error,
                        error: Some(format!("dispatch task aborted: {}", join_err)),
                    });
                }
                Err(_) => {
                    task.abort();
                    warn!("dispatch: '{}' not settled by deadline", provider_id);
                    responses.push(ProviderResponse {
                        provider_id: provider_id.clone(),
                        text: String::new(),
                        latency: self.config.dispatch_deadline,
                        status: ProviderStatus::Timeout,
                        error: Some("dispatch deadline exceeded".to_string()),
                    });
                }
            }
        }
        responses
    }

    /// Keep the successful subset; fail the dispatch as a whole only when it
    /// is empty.
    fn quorum(
        &self,
        gathered: Vec<ProviderResponse>,
        attempted: usize,
    ) -> Result<Vec<ProviderResponse>, ConsensusError> {
        let ok: Vec<ProviderResponse> = gathered.into_iter().filter(|r| r.is_ok()).collect();
        if ok.is_empty() {
            warn!("dispatch failed: none of {} providers answered", attempted);
            return Err(ConsensusError::AggregateFailure { attempted });
        }
        Ok(ok)
    }

    /// Deterministic judge fallback: the first entry of the configured
    /// priority ranking that actually answered, or the first success when the
    /// ranking names none of them.
    fn fallback_by_priority<'r>(&self, ok: &'r [ProviderResponse]) -> &'r ProviderResponse {
        for provider_id in &self.config.provider_priority {
            if let Some(response) = ok.iter().find(|r| &r.provider_id == provider_id) {
                return response;
            }
        }
        &ok[0]
    }
}

fn render_raw_answer(prompt: &str, ok: &[ProviderResponse]) -> String {
    let mut answer = format!("Responses for prompt: {}\n", prompt);
    for response in ok {
        answer.push_str(&format!(
            "\n{} response: {}\n",
            response.provider_id, response.text
        ));
    }
    answer
}

fn render_judge_prompt(prompt: &str, ok: &[ProviderResponse], reveal_sources: bool) -> String {
    let mut judge_prompt = format!(
        "The following are {} responses to this prompt: \
         <start_prompt>{}</start_prompt>\n",
        ok.len(),
        prompt
    );
    for (i, response) in ok.iter().enumerate() {
        let label = if reveal_sources {
            response.provider_id.clone()
        } else {
            format!("Response {}", (b'A' + i as u8) as char)
        };
        judge_prompt.push_str(&format!(
            "\n{}: <response>{}</response>\n",
            label, response.text
        ));
    }
    judge_prompt.push_str(
        "\nChoose the best response or synthesize a better one from them. \
         Reply with the final answer only.",
    );
    judge_prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gert::provider::{Message, ProviderClient, ProviderError, Role};
    use async_trait::async_trait;
    use std::time::Duration;

    struct ScriptedClient {
        reply: Result<String, String>,
        delay: Duration,
    }

    impl ScriptedClient {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
            })
        }

        fn failing(detail: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(detail.to_string()),
                delay: Duration::ZERO,
            })
        }

        fn slow(reply: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay,
            })
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedClient {
        async fn send_message(&self, _messages: &[Message]) -> Result<Message, ProviderError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(Message::new(Role::Assistant, text.clone())),
                Err(detail) => Err(ProviderError::Api(detail.clone())),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn fast_config() -> Arc<GertConfig> {
        Arc::new(GertConfig {
            provider_timeout: Duration::from_millis(100),
            dispatch_deadline: Duration::from_millis(500),
            ..GertConfig::default()
        })
    }

    #[tokio::test]
    async fn test_consensus_returns_exactly_the_ok_subset() {
        let mut gateway = ProviderGateway::new();
        gateway.register("gemini", ScriptedClient::ok("CAP means you pick two."));
        gateway.register("gpt", ScriptedClient::ok("Consistency, availability, partitions."));
        gateway.register(
            "grok",
            ScriptedClient::slow("too late", Duration::from_secs(5)),
        );
        let dispatcher = ConsensusDispatcher::new(Arc::new(gateway), fast_config());

        let result = dispatcher
            .consensus("Explain CAP theorem", &ids(&["gemini", "gpt", "grok"]))
            .await
            .unwrap();

        assert_eq!(result.method, AggregationMethod::Raw);
        assert_eq!(result.responses.len(), 2);
        assert_eq!(result.responses[0].provider_id, "gemini");
        assert_eq!(result.responses[1].provider_id, "gpt");
        assert!(result.answer.contains("Explain CAP theorem"));
        assert!(result.answer.contains("gemini response:"));
    }

    #[tokio::test]
    async fn test_consensus_aggregate_failure_when_all_fail() {
        let mut gateway = ProviderGateway::new();
        gateway.register("gemini", ScriptedClient::failing("500"));
        gateway.register("gpt", ScriptedClient::slow("late", Duration::from_secs(5)));
        let dispatcher = ConsensusDispatcher::new(Arc::new(gateway), fast_config());

        let err = dispatcher
            .consensus("anything", &ids(&["gemini", "gpt"]))
            .await
            .unwrap_err();
        match err {
            ConsensusError::AggregateFailure { attempted } => assert_eq!(attempted, 2),
        }
    }

    #[tokio::test]
    async fn test_superconsensus_uses_judge_text() {
        let mut gateway = ProviderGateway::new();
        gateway.register("gemini", ScriptedClient::ok("Answer one."));
        gateway.register("gpt", ScriptedClient::ok("Answer two."));
        gateway.register("judge", ScriptedClient::ok("Answer two is better: two."));
        let dispatcher = ConsensusDispatcher::new(Arc::new(gateway), fast_config());

        let result = dispatcher
            .superconsensus("pick one", &ids(&["gemini", "gpt"]), "judge")
            .await
            .unwrap();

        assert_eq!(result.method, AggregationMethod::Superconsensus);
        assert_eq!(result.answer, "Answer two is better: two.");
        assert_eq!(result.responses.len(), 2);
    }

    #[tokio::test]
    async fn test_superconsensus_judge_failure_falls_back_by_priority() {
        let mut gateway = ProviderGateway::new();
        gateway.register("gemini", ScriptedClient::ok("Gemini says hi."));
        gateway.register("grok", ScriptedClient::ok("Grok says hi."));
        gateway.register("judge", ScriptedClient::failing("judge down"));
        // Default priority ranks gemini above grok.
        let dispatcher = ConsensusDispatcher::new(Arc::new(gateway), fast_config());

        let result = dispatcher
            .superconsensus("greet", &ids(&["grok", "gemini"]), "judge")
            .await
            .unwrap();

        assert_eq!(result.answer, "Gemini says hi.");
        assert_eq!(result.method, AggregationMethod::Superconsensus);
    }

    #[tokio::test]
    async fn test_superconsensus_unknown_judge_still_answers() {
        let mut gateway = ProviderGateway::new();
        gateway.register("gpt", ScriptedClient::ok("Only answer."));
        let dispatcher = ConsensusDispatcher::new(Arc::new(gateway), fast_config());

        let result = dispatcher
            .superconsensus("q", &ids(&["gpt"]), "no-such-judge")
            .await
            .unwrap();
        assert_eq!(result.answer, "Only answer.");
    }

    #[tokio::test]
    async fn test_dispatch_deadline_marks_stragglers_as_timeout() {
        let mut gateway = ProviderGateway::new();
        gateway.register("fast", ScriptedClient::ok("quick"));
        gateway.register(
            "straggler",
            ScriptedClient::slow("eventually", Duration::from_secs(30)),
        );
        let config = Arc::new(GertConfig {
            provider_timeout: Duration::from_secs(60),
            dispatch_deadline: Duration::from_millis(100),
            ..GertConfig::default()
        });
        let dispatcher = ConsensusDispatcher::new(Arc::new(gateway), config);

        let gathered = dispatcher
            .dispatch("q", &ids(&["fast", "straggler"]))
            .await;
        assert_eq!(gathered[0].status, ProviderStatus::Ok);
        assert_eq!(gathered[1].status, ProviderStatus::Timeout);
    }

    #[test]
    fn test_judge_prompt_labels() {
        let responses = vec![
            ProviderResponse {
                provider_id: "gemini".into(),
                text: "first".into(),
                latency: Duration::ZERO,
                status: ProviderStatus::Ok,
                error: None,
            },
            ProviderResponse {
                provider_id: "gpt".into(),
                text: "second".into(),
                latency: Duration::ZERO,
                status: ProviderStatus::Ok,
                error: None,
            },
        ];

        let anonymous = render_judge_prompt("q", &responses, false);
        assert!(anonymous.contains("Response A:"));
        assert!(!anonymous.contains("gemini:"));

        let named = render_judge_prompt("q", &responses, true);
        assert!(named.contains("gemini: <response>first</response>"));
    }
}
