//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AiError, MessageGenerator, RateLimiter};
use crate::config::AiConfig;

/// Instruction sent with every prompt.
pub const SYSTEM_PROMPT: &str = "You are a fun, engaging, and concise community announcer bot. \
Generate a short, relevant message based on the user's prompt. \
Do not use markdown titles or headers, just plain text.";

/// Delay before the first retry; doubled on every further attempt.
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// Upper bound for a server-requested `Retry-After`.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    system_instruction: RequestContent<'a>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    const fn new(prompt: &'a str) -> Self {
        Self {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
            system_instruction: RequestContent {
                parts: [RequestPart {
                    text: SYSTEM_PROMPT,
                }],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate.
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
    }
}

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    endpoint: String,
    max_retries: u32,
    retry_base: Duration,
    rate_limiter: RateLimiter,
}

impl GeminiClient {
    /// Builds a client from configuration.
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = config.api_key.clone().ok_or(AiError::MissingApiKey)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::Client(e.to_string()))?;

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            http,
            api_key,
            endpoint,
            max_retries: config.max_retries.max(1),
            retry_base: DEFAULT_RETRY_BASE,
            rate_limiter: RateLimiter::from_secs(config.min_request_interval_secs),
        })
    }

    /// Overrides the base delay used for exponential backoff.
    #[must_use]
    pub const fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Generates text for a prompt, retrying on rate limits and connection errors.
    pub async fn generate_content(&self, prompt: &str) -> Result<String, AiError> {
        let request = GenerateRequest::new(prompt);
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.wait_and_acquire().await;

            let error = match self.send_once(&request).await {
                Ok(text) => {
                    info!("Generated announcement ({} chars)", text.chars().count());
                    return Ok(text);
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            let is_last = attempt + 1 == self.max_retries;
            match &error {
                AiError::RateLimited {
                    retry_after: Some(delay),
                } => {
                    self.rate_limiter.defer((*delay).min(MAX_RETRY_AFTER)).await;
                }
                _ if !is_last => {
                    let delay = self.retry_base * 2u32.saturating_pow(attempt);
                    warn!("{}. Retrying in {:?}...", error, delay);
                    tokio::time::sleep(delay).await;
                }
                _ => {}
            }
            last_error = Some(error);
        }

        Err(AiError::RetriesExhausted {
            attempts: self.max_retries,
            last: Box::new(last_error.unwrap_or(AiError::EmptyResponse)),
        })
    }

    async fn send_once(&self, request: &GenerateRequest<'_>) -> Result<String, AiError> {
        debug!("Sending generateContent request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AiError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        parsed.into_text().ok_or(AiError::EmptyResponse)
    }
}

#[async_trait]
impl MessageGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        self.generate_content(prompt).await
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    const PATH: &str = "/v1beta/models/test-model:generateContent";

    fn test_client(base_url: &str) -> GeminiClient {
        let config = AiConfig {
            api_key: Some("test-key".to_owned()),
            model: "test-model".to_owned(),
            base_url: base_url.to_owned(),
            timeout_secs: 5,
            max_retries: 3,
            min_request_interval_secs: 0,
        };
        GeminiClient::new(&config)
            .unwrap()
            .with_retry_base(Duration::from_millis(1))
    }

    #[test]
    fn test_missing_api_key() {
        let config = AiConfig::default();
        assert!(matches!(
            GeminiClient::new(&config),
            Err(AiError::MissingApiKey)
        ));
    }

    #[test]
    fn test_request_shape() {
        let value = serde_json::to_value(GenerateRequest::new("Say hi")).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "Say hi");
        assert_eq!(
            value["systemInstruction"]["parts"][0]["text"],
            SYSTEM_PROMPT
        );
    }

    #[tokio::test]
    async fn test_generate_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{"parts": [{"text": "Weekly reminder"}]}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"  Don't forget game night!  "}]}}]}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let text = client.generate_content("Weekly reminder").await.unwrap();

        assert_eq!(text, "Don't forget game night!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(matches!(
            client.generate_content("x").await,
            Err(AiError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        match client.generate_content("x").await {
            Err(AiError::Api { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected API error, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let client = test_client(&server.url());
        match client.generate_content("x").await {
            Err(AiError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, AiError::RateLimited { .. }));
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_after_takes_precedence_over_backoff() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", PATH)
            .with_status(429)
            .with_header("retry-after", "1")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#)
            .expect(1)
            .create_async()
            .await;

        // Backoff base is 1ms, so any wait near a second came from the header.
        let client = test_client(&server.url());
        let started = std::time::Instant::now();
        let text = client.generate_content("x").await.unwrap();

        assert_eq!(text, "hi");
        assert!(started.elapsed() >= Duration::from_millis(950));
        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_error_is_retried() {
        let client = test_client("http://127.0.0.1:1");
        match client.generate_content("x").await {
            Err(AiError::RetriesExhausted { last, .. }) => {
                assert!(last.is_retryable());
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
    }
}
