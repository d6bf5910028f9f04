//! Routing classifier: a lite-tier model call that decides which
//! model chain a request deserves. Best-effort by construction; any
//! failure falls back to `Balance`.

use serde_json::json;

use crate::normalize::extract_json;
use crate::prompt::{Prompt, render};
use crate::provider::{CompletionRequest, Message, ProviderClient, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatIntent {
    /// Complex logic, derivations, depth. Gets the deep chain.
    Agentic,
    /// Quick facts and formatting. Gets the shallow chain.
    Fast,
    #[default]
    Balance,
}

impl ChatIntent {
    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "agentic" => Some(ChatIntent::Agentic),
            "fast" => Some(ChatIntent::Fast),
            "balance" => Some(ChatIntent::Balance),
            _ => None,
        }
    }
}

/// Classify a user request. Runs at temperature 0.1 with a JSON
/// response hint against the lite model tier.
pub async fn classify_intent(
    client: &ProviderClient,
    model: &str,
    user_prompt: &str,
    api_key: &str,
) -> ChatIntent {
    let Ok(prompt) = render(Prompt::IntentClassifier, &json!({ "request": user_prompt })) else {
        return ChatIntent::Balance;
    };

    let request = CompletionRequest {
        model: model.to_string(),
        system_instruction: "You are a routing classifier. Output JSON only.".to_string(),
        messages: vec![Message::new(Role::User, &prompt)],
        temperature: 0.1,
        json_response: true,
    };

    match client.completion(&request, api_key).await {
        Ok(text) => extract_json(&text)
            .ok()
            .and_then(|v| {
                v.get("intent")
                    .and_then(|i| i.as_str())
                    .and_then(ChatIntent::from_wire)
            })
            .unwrap_or_default(),
        Err(err) => {
            tracing::debug!("Intent classification failed: {}", err);
            ChatIntent::Balance
        }
    }
}
