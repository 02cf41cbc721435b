//! Tools exposing the consensus dispatcher to the primary model.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

use crate::gert::config::GertConfig;
use crate::gert::consensus::ConsensusDispatcher;
use crate::gert::tool_protocol::{
    Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult,
};

fn prompt_parameter() -> ToolParameter {
    ToolParameter::new("prompt", ToolParameterType::String)
        .with_description("The prompt to send to the models")
        .required()
}

fn extract_prompt(arguments: &serde_json::Value) -> Option<&str> {
    arguments.get("prompt").and_then(|v| v.as_str())
}

/// Queries all configured consensus providers and returns their raw answers.
pub struct ConsensusQueryTool {
    dispatcher: Arc<ConsensusDispatcher>,
    config: Arc<GertConfig>,
    metadata: ToolMetadata,
}

impl ConsensusQueryTool {
    pub fn new(dispatcher: Arc<ConsensusDispatcher>, config: Arc<GertConfig>) -> Self {
        let metadata = ToolMetadata::new(
            "call_consensus_query",
            "Calls multiple LLM providers in parallel and returns all of their answers.",
        )
        .with_parameter(prompt_parameter());
        Self {
            dispatcher,
            config,
            metadata,
        }
    }
}

#[async_trait]
impl Tool for ConsensusQueryTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let prompt = match extract_prompt(&arguments) {
            Some(prompt) => prompt,
            None => return Ok(ToolResult::failure("'prompt' is required")),
        };

        match self
            .dispatcher
            .consensus(prompt, &self.config.consensus_providers)
            .await
        {
            Ok(result) => Ok(ToolResult::success(serde_json::json!({
                "response": result.answer,
                "providers": result
                    .responses
                    .iter()
                    .map(|r| r.provider_id.clone())
                    .collect::<Vec<_>>(),
            }))),
            Err(err) => Ok(ToolResult::failure(err.to_string())),
        }
    }
}

/// Queries the consensus providers and has a judge model pick or synthesize
/// the best answer.
pub struct SuperconsensusTool {
    dispatcher: Arc<ConsensusDispatcher>,
    config: Arc<GertConfig>,
    metadata: ToolMetadata,
}

impl SuperconsensusTool {
    pub fn new(dispatcher: Arc<ConsensusDispatcher>, config: Arc<GertConfig>) -> Self {
        let metadata = ToolMetadata::new(
            "call_superconsensus",
            "Calls multiple LLM providers in parallel and uses cross-model \
             judging to select the best answer.",
        )
        .with_parameter(prompt_parameter());
        Self {
            dispatcher,
            config,
            metadata,
        }
    }
}

#[async_trait]
impl Tool for SuperconsensusTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let prompt = match extract_prompt(&arguments) {
            Some(prompt) => prompt,
            None => return Ok(ToolResult::failure("'prompt' is required")),
        };

        match self
            .dispatcher
            .superconsensus(
                prompt,
                &self.config.consensus_providers,
                &self.config.judge_provider,
            )
            .await
        {
            Ok(result) => Ok(ToolResult::success(
                serde_json::json!({ "response": result.answer }),
            )),
            Err(err) => Ok(ToolResult::failure(err.to_string())),
        }
    }
}
