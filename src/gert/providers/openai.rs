//! OpenAI chat client.
//!
//! Also serves as the delegate transport for every other vendor exposing an
//! OpenAI-compatible endpoint ([`GrokClient`](crate::gert::providers::grok::GrokClient),
//! [`ClaudeClient`](crate::gert::providers::claude::ClaudeClient)): those
//! wrappers construct an `OpenAIClient` with a different base URL and forward
//! to it.

use async_trait::async_trait;
use openai_rust2 as openai_rust;

use crate::gert::provider::{Message, ProviderClient, ProviderError, Role};
use crate::gert::providers::common::send_chat;

pub struct OpenAIClient {
    client: openai_rust::Client,
    model: String,
}

/// Chat models this assistant is configured to use.
pub enum Model {
    Gpt5,
    Gpt5Mini,
    Gpt4o,
}

pub fn model_to_string(model: Model) -> String {
    match model {
        Model::Gpt5 => "gpt-5".to_string(),
        Model::Gpt5Mini => "gpt-5-mini".to_string(),
        Model::Gpt4o => "gpt-4o".to_string(),
    }
}

impl OpenAIClient {
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new(secret_key),
            model: model_name.to_string(),
        }
    }

    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        OpenAIClient {
            client: openai_rust::Client::new_with_base_url(secret_key, base_url),
            model: model_name.to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    async fn send_message(&self, messages: &[Message]) -> Result<Message, ProviderError> {
        let content = send_chat(&self.client, &self.model, messages, None).await?;
        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
