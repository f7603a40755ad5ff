//! Feedback-generation collaborator. The orchestrator only depends on the
//! [`FeedbackGenerator`] trait; the shipped implementation talks to an
//! OpenAI-compatible chat endpoint and parses its output defensively, since
//! a malformed batch must degrade to "no feedback available" rather than
//! fail the session.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::models::{Question, QuestionFeedback};

/// Contractual cap on each feedback sentence.
pub const MAX_APPROACH_CHARS: usize = 50;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

const SYSTEM_PROMPT: &str = "You are a study coach. For each question you receive, \
write one encouraging sentence (max 50 characters) describing the correct approach \
and one describing the incorrect approach, both referencing the correct option. \
Reply with a JSON object keyed by question id, each value an object with \
\"correct_approach\" and \"incorrect_approach\" strings.";

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("feedback provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
    #[error("feedback batch timed out")]
    Timeout,
    #[error("feedback batch unavailable: {0}")]
    Unavailable(String),
}

/// Batch feedback generation. `Ok` with missing or empty entries means "no
/// feedback available" for those questions; `Err` means the whole batch
/// should be retried at the next checkpoint.
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate_batch(
        &self,
        questions: &[Question],
    ) -> Result<HashMap<String, QuestionFeedback>, FeedbackError>;
}

/// Collaborator for hosts without a configured provider; every batch comes
/// back empty.
pub struct NoFeedback;

#[async_trait]
impl FeedbackGenerator for NoFeedback {
    async fn generate_batch(
        &self,
        _questions: &[Question],
    ) -> Result<HashMap<String, QuestionFeedback>, FeedbackError> {
        Ok(HashMap::new())
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat-completions backed feedback provider.
pub struct LlmFeedbackProvider {
    config: FeedbackProviderConfig,
    client: reqwest::Client,
}

impl LlmFeedbackProvider {
    pub fn new(config: FeedbackProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        let api_key = env_string("FEEDBACK_API_KEY");
        let model = env_string("FEEDBACK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = env_string("FEEDBACK_API_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout =
            Duration::from_millis(env_u64("FEEDBACK_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS));

        Self::new(FeedbackProviderConfig {
            api_key,
            model,
            api_endpoint,
            timeout,
        })
    }

    pub fn is_available(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, FeedbackError> {
        let mut last_error: Option<FeedbackError> = None;

        for retry in 0..=MAX_RETRIES {
            match self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<ChatResponse>().await?);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = FeedbackError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        warn!(retry, ?status, "feedback request failed, retrying");
                        sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = FeedbackError::Request(e);
                    if retry < MAX_RETRIES {
                        warn!(retry, "feedback request error, retrying");
                        sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(FeedbackError::EmptyChoices))
    }
}

#[async_trait]
impl FeedbackGenerator for LlmFeedbackProvider {
    async fn generate_batch(
        &self,
        questions: &[Question],
    ) -> Result<HashMap<String, QuestionFeedback>, FeedbackError> {
        if questions.is_empty() {
            return Ok(HashMap::new());
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(FeedbackError::NotConfigured("FEEDBACK_API_KEY"))?;

        let url = format!("{}/chat/completions", self.config.api_endpoint);
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": serde_json::to_string(questions)? },
            ],
            "stream": false
        });

        let response = self.post_with_retry(&url, api_key, &payload).await?;
        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(FeedbackError::EmptyChoices)?;

        Ok(parse_batch_content(content))
    }
}

/// Lenient parse of the provider's reply. Entries that do not carry both
/// approach strings are dropped; overly long sentences are truncated to the
/// contractual cap. A body that is not a JSON object yields an empty map.
pub fn parse_batch_content(content: &str) -> HashMap<String, QuestionFeedback> {
    let stripped = strip_code_fences(content);
    let Ok(serde_json::Value::Object(entries)) =
        serde_json::from_str::<serde_json::Value>(stripped)
    else {
        return HashMap::new();
    };

    let mut out = HashMap::with_capacity(entries.len());
    for (question_id, entry) in entries {
        let correct = entry.get("correct_approach").and_then(|v| v.as_str());
        let incorrect = entry.get("incorrect_approach").and_then(|v| v.as_str());
        if let (Some(correct), Some(incorrect)) = (correct, incorrect) {
            out.insert(
                question_id,
                QuestionFeedback {
                    correct_approach: truncate_chars(correct, MAX_APPROACH_CHARS),
                    incorrect_approach: truncate_chars(incorrect, MAX_APPROACH_CHARS),
                },
            );
        }
    }
    out
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let content = r#"{"q1": {"correct_approach": "Check units first.", "incorrect_approach": "Skipping the units trap."}}"#;
        let parsed = parse_batch_content(content);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["q1"].correct_approach, "Check units first.");
    }

    #[test]
    fn test_parse_fenced_object() {
        let content = "```json\n{\"q1\": {\"correct_approach\": \"a\", \"incorrect_approach\": \"b\"}}\n```";
        assert_eq!(parse_batch_content(content).len(), 1);
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let content = r#"{
            "q1": {"correct_approach": "ok", "incorrect_approach": "ok"},
            "q2": {"correct_approach": "missing the other half"},
            "q3": "not even an object"
        }"#;
        let parsed = parse_batch_content(content);
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("q1"));
    }

    #[test]
    fn test_non_object_body_is_no_feedback() {
        assert!(parse_batch_content("total nonsense").is_empty());
        assert!(parse_batch_content("[1, 2, 3]").is_empty());
    }

    #[test]
    fn test_long_sentences_truncated() {
        let long = "x".repeat(120);
        let content = format!(
            r#"{{"q1": {{"correct_approach": "{long}", "incorrect_approach": "fine"}}}}"#
        );
        let parsed = parse_batch_content(&content);
        assert_eq!(parsed["q1"].correct_approach.chars().count(), MAX_APPROACH_CHARS);
    }

    #[tokio::test]
    async fn test_no_feedback_provider_is_empty() {
        let provider = NoFeedback;
        let result = provider.generate_batch(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_availability_requires_key() {
        let provider = LlmFeedbackProvider::new(FeedbackProviderConfig {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(!provider.is_available());
    }
}
