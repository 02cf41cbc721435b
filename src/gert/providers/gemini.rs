use async_trait::async_trait;
use openai_rust2 as openai_rust;

use crate::gert::provider::{Message, ProviderClient, ProviderError, Role};
use crate::gert::providers::common::send_chat;

pub struct GeminiClient {
    client: openai_rust::Client,
    model: String,
}

pub enum Model {
    Gemini25Pro,
    Gemini25Flash,
}

fn model_to_string(model: Model) -> String {
    match model {
        Model::Gemini25Pro => "gemini-2.5-pro".to_string(),
        Model::Gemini25Flash => "gemini-2.5-flash".to_string(),
    }
}

impl GeminiClient {
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        GeminiClient {
            client: openai_rust::Client::new_with_base_url(
                secret_key,
                "https://generativelanguage.googleapis.com/v1beta/",
            ),
            model: model_name.to_string(),
        }
    }

    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ProviderError> {
        // Google's compatibility layer serves chat completions under /v1beta.
        let url_path = Some("/v1beta/chat/completions".to_string());
        let content = send_chat(&self.client, &self.model, messages, url_path).await?;
        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
