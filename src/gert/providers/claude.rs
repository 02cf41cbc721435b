use async_trait::async_trait;

use crate::gert::provider::{Message, ProviderClient, ProviderError};
use crate::gert::providers::openai::OpenAIClient;

/// Anthropic client routed through the OpenAI-compatible surface.
pub struct ClaudeClient {
    client: OpenAIClient,
    model: String,
}

pub enum Model {
    ClaudeSonnet4,
    ClaudeOpus4,
    ClaudeHaiku35,
}

fn model_to_string(model: Model) -> String {
    match model {
        Model::ClaudeSonnet4 => "claude-sonnet-4-0".to_string(),
        Model::ClaudeOpus4 => "claude-opus-4-0".to_string(),
        Model::ClaudeHaiku35 => "claude-3-5-haiku-latest".to_string(),
    }
}

impl ClaudeClient {
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        ClaudeClient {
            client: OpenAIClient::new_with_base_url(
                secret_key,
                model_name,
                "https://api.anthropic.com/v1",
            ),
            model: model_name.to_string(),
        }
    }

    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ProviderError> {
        self.client.send_message(messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
