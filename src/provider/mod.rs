//! The outbound LLM call. Every tier (primary chat models, the
//! OpenRouter-hosted free fallback, the lite quiz models) speaks the
//! same OpenAI-compatible chat-completions shape, so one client
//! covers all of them; the hostname is a parameter so tests can point
//! it at a mock server.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{OracleError, fault_to_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// One fully parameterized provider request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_instruction: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    /// Ask the provider to constrain output to a JSON object. Models
    /// ignore this often enough that the normalizer still has to do
    /// its job.
    pub json_response: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderClient {
    api_hostname: String,
}

impl ProviderClient {
    pub fn new(api_hostname: &str) -> Self {
        Self {
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
        }
    }

    /// Send one chat completion and return the raw text content of
    /// the first choice. Provider faults come back classified
    /// (`RateLimited` / `Unavailable` / `InvalidApiKey`) so the
    /// dispatcher can route them without re-reading HTTP details.
    pub async fn completion(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<String, OracleError> {
        let mut messages = vec![json!({
            "role": "system",
            "content": request.system_instruction,
        })];
        for m in &request.messages {
            messages.push(json!(m));
        }

        let mut payload = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": messages,
        });
        if request.json_response {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let url = format!("{}/v1/chat/completions", self.api_hostname);
        tracing::debug!("Dispatching completion to model {}", request.model);

        let response = reqwest::Client::new()
            .post(url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Unavailable(format!("request timed out: {}", e))
                } else {
                    OracleError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!("Model {} returned HTTP {}", request.model, status);
            return Err(fault_to_error(&body));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;
        // Some gateways return 200 with an error object in the body.
        if parsed.get("error").is_some() {
            return Err(fault_to_error(&body));
        }

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                OracleError::MalformedResponse("provider returned empty content".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            system_instruction: "You are the Academic Oracle.".to_string(),
            messages: vec![Message::new(Role::User, "hello")],
            temperature: 0.7,
            json_response: true,
        }
    }

    #[tokio::test]
    async fn test_completion_returns_content() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hi there"}}]}"#;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let text = client.completion(&request("m"), "key").await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn test_http_429_classifies_as_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","message":"quota"}}"#)
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let err = client.completion(&request("m"), "key").await.unwrap_err();
        assert!(matches!(err, OracleError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_http_400_invalid_key_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key."}}"#)
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let err = client.completion(&request("m"), "key").await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidApiKey(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_error_object_in_200_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"error":{"code":503,"message":"The model is overloaded"}}"#)
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let err = client.completion(&request("m"), "key").await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": ""}}]}"#)
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let err = client.completion(&request("m"), "key").await.unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }
}
