use super::models::{Model, Usage};
use super::{LlmCapability, LlmRequest};
use crate::config::Config;
use crate::errors::LlmError;
use crate::util::truncate_str;
use serde::{Deserialize, Serialize};

/// OpenRouter direct API URL (BYOK mode)
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client. One attempt per call: callers degrade on failure.
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    model: Model,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, model: Model) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model,
        })
    }

    /// Build a client from the configured key and model.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let key = config.get_api_key().ok_or(LlmError::MissingApiKey)?;
        Self::new(key, config.model)
    }

    pub fn model(&self) -> Model {
        self.model
    }
}

impl LlmCapability for OpenRouterClient {
    async fn complete(&self, request: &LlmRequest<'_>) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Message {
            role: "system",
            content: request.system,
        });
        for turn in request.history {
            messages.push(Message {
                role: turn.role.as_str(),
                content: &turn.content,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.user,
        });

        let body = ChatRequest {
            model: self.model.id(),
            messages,
            max_tokens: self.model.max_tokens(),
            temperature: request.temperature,
            stream: false,
            response_format: request.json_object.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .http
            .post(OPENROUTER_URL)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/debt-guardian/debt-guardian")
            .header("X-Title", "debt-guardian")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text, retry_after));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::InvalidResponse(format!(
                "failed to parse OpenRouter response: {} ({})",
                e,
                truncate_str(&text, 200)
            ))
        })?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                model = self.model.id(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost = usage.cost(),
                "llm call finished"
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Map a failed HTTP status to a user-facing error.
fn status_error(status: u16, body: &str, retry_after: Option<u64>) -> LlmError {
    match status {
        401 => LlmError::HttpStatus {
            status,
            message: "Invalid API key. Run 'debt-guardian --set-key' to update it.".to_string(),
        },
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after.or_else(|| parse_retry_after(body)),
        },
        500..=599 => LlmError::HttpStatus {
            status,
            message: "OpenRouter server error. The service may be temporarily unavailable."
                .to_string(),
        },
        _ => LlmError::HttpStatus {
            status,
            message: truncate_str(body, 200).to_string(),
        },
    }
}

/// Extract a retry-after hint ("retry after 12 seconds") from a response body.
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    text_lower[pos..]
        .split_whitespace()
        .skip(1)
        .take(5)
        .filter_map(|word| {
            word.trim_matches(|c: char| !c.is_numeric())
                .parse::<u64>()
                .ok()
        })
        .find(|secs| *secs > 0 && *secs < 300)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_from_body() {
        assert_eq!(parse_retry_after("Please retry after 12 seconds"), Some(12));
        assert_eq!(parse_retry_after("Retry in 5s."), Some(5));
        assert_eq!(parse_retry_after("slow down"), None);
        assert_eq!(parse_retry_after("retry after 9999 seconds"), None);
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(429, "", Some(7)),
            LlmError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
        match status_error(401, "bad key", None) {
            LlmError::HttpStatus { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("Invalid API key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match status_error(418, &"x".repeat(500), None) {
            LlmError::HttpStatus { message, .. } => assert_eq!(message.chars().count(), 200),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_chat_request_serializes_json_mode() {
        let body = ChatRequest {
            model: "m",
            messages: vec![Message {
                role: "user",
                content: "hi",
            }],
            max_tokens: 10,
            temperature: 0.3,
            stream: false,
            response_format: Some(ResponseFormat {
                format_type: "json_object",
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_chat_request_omits_response_format_when_unset() {
        let body = ChatRequest {
            model: "m",
            messages: Vec::new(),
            max_tokens: 10,
            temperature: 0.2,
            stream: false,
            response_format: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("response_format").is_none());
    }
}
