use super::{ChatMessage, ChatModel};
use crate::error::{Result, PdfChatError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI chat completions client
pub struct OpenAIChat {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: usize,
}

impl OpenAIChat {
    pub fn new(api_key: String, model: String, temperature: f32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PdfChatError::Chat(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature,
            max_retries: 3,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, messages: &[ChatMessage]) -> std::result::Result<String, RequestError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RequestError::Retryable(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let msg = format!("OpenAI API error {}: {}", status, body);
            return Err(if is_retryable(status) {
                RequestError::Retryable(msg)
            } else {
                RequestError::Fatal(msg)
            });
        }

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|e| RequestError::Fatal(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RequestError::Fatal("Empty completion from OpenAI API".to_string()))
    }
}

enum RequestError {
    Retryable(String),
    Fatal(String),
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl ChatModel for OpenAIChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);
        let start = std::time::Instant::now();

        loop {
            match self.request(messages).await {
                Ok(answer) => {
                    log::debug!("Chat completion took {:?}", start.elapsed());
                    return Ok(answer);
                }
                Err(RequestError::Retryable(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!("Chat retry {}/{} after error: {}", attempt, self.max_retries, msg);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(RequestError::Retryable(msg)) | Err(RequestError::Fatal(msg)) => {
                    return Err(PdfChatError::Chat(msg));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_roles_lowercase() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = CompletionRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.2,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"42"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("42"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let chat = OpenAIChat::new("k".to_string(), "gpt-4o".to_string(), 0.2)
            .unwrap()
            .with_base_url("http://localhost:1234/v1/");
        assert_eq!(chat.base_url, "http://localhost:1234/v1");
        assert_eq!(chat.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_chat_error() {
        let mut chat = OpenAIChat::new("k".to_string(), "gpt-4o".to_string(), 0.2)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        chat.max_retries = 0;

        let err = chat.complete(&[ChatMessage::user("hello")]).await.unwrap_err();
        assert!(matches!(err, PdfChatError::Chat(_)));
    }
}
