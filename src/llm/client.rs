//! Chat completion client with tool calling support
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint
//! (OpenRouter by default). The controller only sees the
//! [`CompletionEndpoint`] trait, so tests can script replies.

use std::future::Future;

use serde::Deserialize;
use tracing::debug;

use super::types::{CompletionRequest, CompletionResponse};

/// Default endpoint base URL
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const REFERER: &str = "https://github.com/lguzzon-scratchbook/makeitpass";
const TITLE: &str = "makeitpass";

/// Error type for chat operations
#[derive(Debug)]
pub enum ChatError {
    /// Network or HTTP client failure
    Request(reqwest::Error),
    /// Body was not a valid completion response
    Parse {
        source: serde_json::Error,
        body: String,
    },
    /// Endpoint answered with a non-success status
    Api { status: u16, message: String },
    /// Endpoint answered with an empty body
    EmptyResponse,
    /// Response carried no choices
    NoChoices { body: String },
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Request(e) => write!(f, "Request error: {}", e),
            ChatError::Parse { source, body } => {
                write!(f, "Parse error: {} (response: {})", source, body)
            }
            ChatError::Api { status, message } => write!(f, "API error {}: {}", status, message),
            ChatError::EmptyResponse => write!(f, "Empty response from completion endpoint"),
            ChatError::NoChoices { body } => write!(f, "No choices in response: {}", body),
        }
    }
}

impl std::error::Error for ChatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChatError::Request(e) => Some(e),
            ChatError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Request(e)
    }
}

/// Something that can answer a completion request
pub trait CompletionEndpoint {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, ChatError>> + Send;
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Client for an OpenAI-compatible /chat/completions endpoint
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. "https://openrouter.ai/api/v1"
    /// * `api_key` - Bearer token sent with every request
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl CompletionEndpoint for ChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ChatError> {
        let endpoint = self.endpoint();
        debug!(
            endpoint = %endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(err) => err.error.message,
                Err(_) => text,
            };
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        parse_response(text)
    }
}

/// Parse a raw completion body, rejecting empty bodies and empty choice lists
pub fn parse_response(text: String) -> Result<CompletionResponse, ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::EmptyResponse);
    }

    let response: CompletionResponse = match serde_json::from_str(&text) {
        Ok(response) => response,
        Err(source) => return Err(ChatError::Parse { source, body: text }),
    };

    if response.choices.is_empty() {
        return Err(ChatError::NoChoices { body: text });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = ChatClient::new("https://example.test/v1/", "key");
        assert_eq!(client.endpoint(), "https://example.test/v1/chat/completions");
    }

    #[test]
    fn test_parse_rejects_empty_body() {
        assert!(matches!(
            parse_response("  ".to_string()),
            Err(ChatError::EmptyResponse)
        ));
    }

    #[test]
    fn test_parse_rejects_missing_choices() {
        let err = parse_response(r#"{"id": "x", "choices": []}"#.to_string()).unwrap_err();
        assert!(matches!(err, ChatError::NoChoices { .. }));
        assert!(err.to_string().contains("\"choices\": []"));
    }

    #[test]
    fn test_parse_error_keeps_raw_body() {
        let err = parse_response("<html>bad gateway</html>".to_string()).unwrap_err();
        assert!(err.to_string().contains("bad gateway"));
    }

    #[test]
    fn test_parse_accepts_plain_reply() {
        let response = parse_response(
            r#"{"choices": [{"message": {"role": "assistant", "content": "done"}}]}"#.to_string(),
        )
        .unwrap();
        assert_eq!(response.choices[0].message.text(), Some("done"));
    }
}
