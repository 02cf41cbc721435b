//! Local model runtime client.
//!
//! Ollama exposes an OpenAI-compatible endpoint on localhost, so the local
//! primary model speaks the same transport as every remote vendor. No API key
//! is required; a placeholder is sent because the transport insists on one.

use async_trait::async_trait;
use openai_rust2 as openai_rust;

use crate::gert::provider::{Message, ProviderClient, ProviderError, Role};
use crate::gert::providers::common::send_chat;

const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

pub struct OllamaClient {
    client: openai_rust::Client,
    model: String,
}

pub enum Model {
    GptOss20b,
    GptOss120b,
    Llama31_8b,
}

fn model_to_string(model: Model) -> String {
    match model {
        Model::GptOss20b => "gpt-oss:20b".to_string(),
        Model::GptOss120b => "gpt-oss:120b".to_string(),
        Model::Llama31_8b => "llama3.1:8b".to_string(),
    }
}

impl OllamaClient {
    pub fn new_with_model_str(model_name: &str) -> Self {
        Self::new_with_base_url(model_name, DEFAULT_BASE_URL)
    }

    pub fn new_with_model_enum(model: Model) -> Self {
        Self::new_with_model_str(&model_to_string(model))
    }

    /// Point at a non-default runtime, e.g. another host on the LAN.
    pub fn new_with_base_url(model_name: &str, base_url: &str) -> Self {
        OllamaClient {
            client: openai_rust::Client::new_with_base_url("ollama", base_url),
            model: model_name.to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for OllamaClient {
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
