use async_trait::async_trait;

use crate::gert::provider::{Message, ProviderClient, ProviderError};
use crate::gert::providers::openai::OpenAIClient;

pub struct GrokClient {
    client: OpenAIClient,
    model: String,
}

pub enum Model {
    Grok4,
    Grok3,
    Grok3Mini,
}

fn model_to_string(model: Model) -> String {
    match model {
        Model::Grok4 => "grok-4".to_string(),
        Model::Grok3 => "grok-3".to_string(),
        Model::Grok3Mini => "grok-3-mini".to_string(),
    }
}

impl GrokClient {
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        GrokClient {
            client: OpenAIClient::new_with_base_url(secret_key, model_name, "https://api.x.ai/v1"),
            model: model_name.to_string(),
        }
    }

    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }
}

#[async_trait]
impl ProviderClient for GrokClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ProviderError> {
        self.client.send_message(messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
