use crate::domain::model::CompletionRequest;
use crate::domain::ports::LlmClient;
use crate::utils::error::{AnalyzerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for Groq's OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GroqClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// 從環境變數 GROQ_API_KEY 取得金鑰
    pub fn from_env(base_url: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AnalyzerError::MissingConfigError {
                field: "llm.api_key".to_string(),
            })?;
        Ok(Self::new(base_url, api_key))
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = self.endpoint();
        let body = ChatCompletionBody {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::info!(
            "🤖 Calling {} with model {} (temperature: {}, max_tokens: {})",
            url,
            request.model,
            request.temperature,
            request.max_tokens
        );

        let started = Instant::now();
        let timeout_error = |e: reqwest::Error| {
            if e.is_timeout() {
                AnalyzerError::TimeoutError {
                    seconds: request.timeout_seconds,
                }
            } else {
                AnalyzerError::ApiError(e)
            }
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(request.timeout_seconds))
            .send()
            .await
            .map_err(timeout_error)?;

        let status = response.status();
        tracing::info!(
            "Request completed in {:.2} seconds with status {}",
            started.elapsed().as_secs_f64(),
            status
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("❌ LLM API error {}: {}", status, body);
            return Err(AnalyzerError::LlmStatusError {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(timeout_error)?;
        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| AnalyzerError::LlmResponseError {
                message: format!("invalid completion payload: {}", e),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnalyzerError::LlmResponseError {
                message: "completion contained no message content".to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(1, 0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

/// Retries retryable failures with exponential backoff.
pub async fn complete_with_retry<L: LlmClient + ?Sized>(
    client: &L,
    request: &CompletionRequest,
    policy: RetryPolicy,
) -> Result<String> {
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match client.complete(request).await {
            Ok(text) => return Ok(text),
            Err(e) if attempt < policy.attempts && e.is_retryable() => {
                tracing::warn!(
                    "⚠️ LLM call failed (attempt {}/{}): {}. Retrying in {:?}",
                    attempt,
                    policy.attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Rough token estimate: one token per four bytes of text.
pub fn estimate_token_count(text: &str) -> usize {
    text.len() / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Prompt, RequestSettings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyClient {
        failures_before_success: usize,
        calls: AtomicUsize,
        retryable: bool,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                if self.retryable {
                    Err(AnalyzerError::LlmStatusError {
                        status: 503,
                        body: "busy".to_string(),
                    })
                } else {
                    Err(AnalyzerError::MissingConfigError {
                        field: "llm.api_key".to_string(),
                    })
                }
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            Prompt {
                system: "system".to_string(),
                user: "user".to_string(),
            },
            &RequestSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let client = FlakyClient {
            failures_before_success: 2,
            calls: AtomicUsize::new(0),
            retryable: true,
        };

        let result = complete_with_retry(&client, &request(), RetryPolicy::new(3, 0)).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let client = FlakyClient {
            failures_before_success: 5,
            calls: AtomicUsize::new(0),
            retryable: true,
        };

        let result = complete_with_retry(&client, &request(), RetryPolicy::new(3, 0)).await;

        assert!(matches!(
            result,
            Err(AnalyzerError::LlmStatusError { status: 503, .. })
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_immediately() {
        let client = FlakyClient {
            failures_before_success: 1,
            calls: AtomicUsize::new(0),
            retryable: false,
        };

        let result = complete_with_retry(&client, &request(), RetryPolicy::new(3, 0)).await;

        assert!(result.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_estimate_token_count() {
        assert_eq!(estimate_token_count(""), 0);
        assert_eq!(estimate_token_count("MOVE A TO B."), 3);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GroqClient::new("http://localhost:9999/v1/", "key");
        assert_eq!(client.endpoint(), "http://localhost:9999/v1/chat/completions");
    }
}
