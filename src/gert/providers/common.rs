use log::error;
use openai_rust::chat;
use openai_rust2 as openai_rust;

use crate::gert::provider::{Message, ProviderError, Role};

/// Send a chat request over the OpenAI-compatible surface and return the
/// assistant's content. Wire-level failures are classified into
/// [`ProviderError`] so callers can distinguish bad credentials from outages.
pub(crate) async fn send_chat(
    api: &openai_rust::Client,
    model: &str,
    messages: &[Message],
    url_path: Option<String>,
) -> Result<String, ProviderError> {
    let mut formatted = Vec::with_capacity(messages.len());
    for msg in messages {
        formatted.push(chat::Message {
            role: match msg.role {
                Role::System => "system".to_owned(),
                Role::User => "user".to_owned(),
                Role::Assistant => "assistant".to_owned(),
            },
            content: msg.content.clone(),
        });
    }

    let arguments = chat::ChatArguments::new(model, formatted);

    match api.create_chat(arguments, url_path).await {
        Ok(response) => {
            if response.choices.is_empty() {
                return Err(ProviderError::Api(format!(
                    "model '{}' returned no choices",
                    model
                )));
            }
            Ok(response.choices[0].message.content.clone())
        }
        Err(err) => {
            error!("send_chat: API error from model '{}': {}", model, err);
            Err(ProviderError::classify(err.to_string()))
        }
    }
}
