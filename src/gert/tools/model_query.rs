//! Tool that lets the primary model consult one secondary model.
//!
//! Registered once per configured provider, so the local model can delegate a
//! question to, say, `call_grok` or `call_gemini` the same way it calls any
//! other tool.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::gert::provider::ProviderGateway;
use crate::gert::tool_protocol::{
    Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult,
};

pub struct ProviderQueryTool {
    gateway: Arc<ProviderGateway>,
    provider_id: String,
    timeout: Duration,
    metadata: ToolMetadata,
}

impl ProviderQueryTool {
    pub fn new(gateway: Arc<ProviderGateway>, provider_id: &str, timeout: Duration) -> Self {
        let metadata = ToolMetadata::new(
            format!("call_{}", provider_id),
            format!(
                "Calls the {} model with a prompt and returns its response.",
                provider_id
            ),
        )
        .with_parameter(
            ToolParameter::new("prompt", ToolParameterType::String)
                .with_description(format!("The prompt to send to {}", provider_id))
                .required(),
        );
        Self {
            gateway,
            provider_id: provider_id.to_string(),
            timeout,
            metadata,
        }
    }
}

#[async_trait]
impl Tool for ProviderQueryTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let prompt = match arguments.get("prompt").and_then(|v| v.as_str()) {
            Some(prompt) => prompt,
            None => return Ok(ToolResult::failure("'prompt' is required")),
        };

        let response = self
            .gateway
            .invoke(&self.provider_id, prompt, &[], self.timeout)
            .await;
        if response.is_ok() {
            Ok(ToolResult::success(
                serde_json::json!({ "response": response.text }),
            ))
        } else {
            Ok(ToolResult::failure(
                response
                    .error
                    .unwrap_or_else(|| "no response".to_string()),
            ))
        }
    }
}
