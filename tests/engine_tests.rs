//! End-to-end tests for the orchestrated engine: tool-calling turns, the
//! built-in tools, and durable persistence, all through the public API.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gert::providers;
use gert::store::ConversationStore;
use gert::tools::{ConsensusQueryTool, ProviderQueryTool, RecallTool, SuperconsensusTool};
use gert::{
    ConsensusDispatcher, GertConfig, Message, Orchestrator, ProviderClient, ProviderError,
    ProviderGateway, Role, ToolRegistry, TurnRole,
};

/// Replays a fixed sequence of responses, repeating the last one.
struct ScriptedModel {
    responses: Vec<String>,
    cursor: AtomicUsize,
}

impl ScriptedModel {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.into_iter().map(String::from).collect(),
            cursor: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderClient for ScriptedModel {
    async fn send_message(&self, _messages: &[Message]) -> Result<Message, ProviderError> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .responses
            .get(i)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(Message::new(Role::Assistant, reply))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct StaticModel(&'static str);

#[async_trait]
impl ProviderClient for StaticModel {
    async fn send_message(&self, _messages: &[Message]) -> Result<Message, ProviderError> {
        Ok(Message::new(Role::Assistant, self.0))
    }

    fn model_name(&self) -> &str {
        "static"
    }
}

fn test_config() -> GertConfig {
    GertConfig {
        primary_provider: "primary".to_string(),
        consensus_providers: vec!["gemini".to_string(), "grok".to_string()],
        judge_provider: "gpt".to_string(),
        provider_timeout: Duration::from_secs(5),
        tool_timeout: Duration::from_secs(5),
        dispatch_deadline: Duration::from_secs(10),
        ..GertConfig::default()
    }
}

/// Assemble the full engine the way an embedding application would.
fn build_engine(
    dir: &std::path::Path,
    primary: Arc<dyn ProviderClient>,
) -> Orchestrator {
    let config = Arc::new(test_config());

    let mut gateway = ProviderGateway::new();
    gateway.register("primary", primary);
    gateway.register("gemini", Arc::new(StaticModel("Gemini's take.")));
    gateway.register("grok", Arc::new(StaticModel("Grok's take.")));
    gateway.register("gpt", Arc::new(StaticModel("Judged: Gemini wins.")));
    let gateway = Arc::new(gateway);

    let store = Arc::new(ConversationStore::open(dir).unwrap());
    let dispatcher = Arc::new(ConsensusDispatcher::new(
        Arc::clone(&gateway),
        Arc::clone(&config),
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ConsensusQueryTool::new(
        Arc::clone(&dispatcher),
        Arc::clone(&config),
    )));
    registry.register(Arc::new(SuperconsensusTool::new(
        Arc::clone(&dispatcher),
        Arc::clone(&config),
    )));
    registry.register(Arc::new(RecallTool::new(Arc::clone(&store))));
    for provider_id in &config.consensus_providers {
        registry.register(Arc::new(ProviderQueryTool::new(
            Arc::clone(&gateway),
            provider_id,
            config.provider_timeout,
        )));
    }

    Orchestrator::new(gateway, Arc::new(registry), store, config)
}

#[tokio::test]
async fn test_turn_using_consensus_tool() {
    let dir = tempfile::tempdir().unwrap();
    let primary = ScriptedModel::new(vec![
        r#"{"tool_call": {"name": "call_consensus_query", "parameters": {"prompt": "Explain CAP theorem"}}}"#,
        "Both models agree: you can only pick two of the three.",
    ]);
    let orchestrator = build_engine(dir.path(), primary);

    let (answer, id) = orchestrator
        .run_conversation("What does the CAP theorem say?", None)
        .await
        .unwrap();

    assert!(answer.contains("pick two"));

    let conversation = orchestrator.store().get(&id).await.unwrap();
    let assistant = &conversation.turns[1];
    assert_eq!(assistant.tool_calls[0].name, "call_consensus_query");
    let output = &assistant.tool_results[0].result.output;
    assert_eq!(output["providers"][0], "gemini");
    assert!(output["response"].as_str().unwrap().contains("Grok's take."));
}

#[tokio::test]
async fn test_turn_using_superconsensus_tool() {
    let dir = tempfile::tempdir().unwrap();
    let primary = ScriptedModel::new(vec![
        r#"{"tool_call": {"name": "call_superconsensus", "parameters": {"prompt": "best language?"}}}"#,
        "The judged answer was: Gemini wins.",
    ]);
    let orchestrator = build_engine(dir.path(), primary);

    let (answer, id) = orchestrator
        .run_conversation("Ask everyone which language is best", None)
        .await
        .unwrap();

    assert!(answer.contains("Gemini wins"));
    let conversation = orchestrator.store().get(&id).await.unwrap();
    let output = &conversation.turns[1].tool_results[0].result.output;
    assert_eq!(output["response"], "Judged: Gemini wins.");
}

#[tokio::test]
async fn test_recall_tool_finds_earlier_conversation() {
    let dir = tempfile::tempdir().unwrap();

    // First conversation establishes something to recall.
    let orchestrator = build_engine(
        dir.path(),
        ScriptedModel::new(vec!["Noted, sourdough needs a starter."]),
    );
    let (_, first_id) = orchestrator
        .run_conversation("Remember: we discussed sourdough starters", None)
        .await
        .unwrap();

    // Second engine instance over the same store recalls it via the tool.
    let orchestrator = build_engine(
        dir.path(),
        ScriptedModel::new(vec![
            r#"{"tool_call": {"name": "lookup_past_conversations", "parameters": {"query": "sourdough"}}}"#,
            "Yes, we talked about sourdough before.",
        ]),
    );
    let (answer, id) = orchestrator
        .run_conversation("Did we ever talk about bread?", None)
        .await
        .unwrap();

    assert!(answer.contains("sourdough"));
    let conversation = orchestrator.store().get(&id).await.unwrap();
    let output = &conversation.turns[1].tool_results[0].result.output;
    assert_eq!(output["conversations"][0]["id"], first_id.as_str());
}

#[tokio::test]
async fn test_conversations_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_engine(dir.path(), ScriptedModel::new(vec!["Paris."]));
    let (_, id) = orchestrator
        .run_conversation("Capital of France?", None)
        .await
        .unwrap();
    drop(orchestrator);

    let store = ConversationStore::open(dir.path()).unwrap();
    let conversation = store.get(&id).await.unwrap();
    assert_eq!(conversation.turns.len(), 2);
    assert_eq!(conversation.turns[0].role, TurnRole::User);
    assert_eq!(conversation.turns[1].content.as_deref(), Some("Paris."));
    assert!(store.verify_integrity(&id).await.unwrap());
}

#[tokio::test]
async fn test_reopened_store_continues_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_engine(dir.path(), ScriptedModel::new(vec!["first"]));
    let (_, id) = orchestrator.run_conversation("one", None).await.unwrap();
    drop(orchestrator);

    let orchestrator = build_engine(dir.path(), ScriptedModel::new(vec!["second"]));
    let (_, same_id) = orchestrator
        .run_conversation("two", Some(&id))
        .await
        .unwrap();

    assert_eq!(same_id, id);
    let conversation = orchestrator.store().get(&id).await.unwrap();
    assert_eq!(conversation.turns.len(), 4);
    assert!(orchestrator.store().verify_integrity(&id).await.unwrap());
}

#[test]
fn test_real_provider_clients_construct() {
    // Constructors only — no network. Confirms the vendor wiring stays intact.
    use gert::providers::claude::ClaudeClient;
    use gert::providers::gemini::GeminiClient;
    use gert::providers::grok::GrokClient;
    use gert::providers::ollama::OllamaClient;
    use gert::providers::openai::OpenAIClient;

    let mut gateway = ProviderGateway::new();
    gateway.register(
        "ollama",
        Arc::new(OllamaClient::new_with_model_str("gpt-oss:20b")),
    );
    gateway.register(
        "gpt",
        Arc::new(OpenAIClient::new_with_model_str("key", "gpt-5")),
    );
    gateway.register(
        "grok",
        Arc::new(GrokClient::new_with_model_str("key", "grok-4")),
    );
    gateway.register(
        "gemini",
        Arc::new(GeminiClient::new_with_model_str("key", "gemini-2.5-pro")),
    );
    gateway.register(
        "claude",
        Arc::new(ClaudeClient::new_with_model_str("key", "claude-sonnet-4-0")),
    );

    let mut ids = gateway.provider_ids();
    ids.sort();
    assert_eq!(ids, vec!["claude", "gemini", "gpt", "grok", "ollama"]);
    let _ = providers::ollama::OllamaClient::new_with_base_url(
        "gpt-oss:20b",
        "http://192.168.1.20:11434/v1",
    );
}
