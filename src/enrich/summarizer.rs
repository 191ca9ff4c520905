//! Summarization collaborator — OpenAI chat-completions client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::EnrichError;
use crate::model::SummarizeResult;

/// Content is truncated to this many bytes before submission.
const MAX_CONTENT_LEN: usize = 8000;

const SYSTEM_PROMPT: &str = "You are a newsletter analyst. Extract the most important \
information concisely. Be direct and avoid filler words. Always respond with valid JSON only.";

/// Summarizes one newsletter issue. Implementations must fail cleanly
/// (return an error) rather than hand back malformed data — the caller
/// substitutes defaults on any error.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        subject: &str,
        content: &str,
        model: &str,
    ) -> Result<SummarizeResult, EnrichError>;
}

/// OpenAI chat-completions implementation with forced JSON output.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiSummarizer {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    /// Point the client at a different API base (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(
        &self,
        subject: &str,
        content: &str,
        model: &str,
    ) -> Result<SummarizeResult, EnrichError> {
        let truncated = truncate_utf8(content, MAX_CONTENT_LEN);

        let prompt = format!(
            "Summarize this newsletter issue:\n\
             Subject: {subject}\n\
             Content: {truncated}\n\n\
             Respond in JSON:\n\
             {{\n\
               \"summary\": \"3-sentence TL;DR\",\n\
               \"keyPoints\": [\"point 1\", \"point 2\", \"point 3\", \"point 4\", \"point 5\"],\n\
               \"whyItMatters\": \"1-paragraph plain English explanation of why this is important\",\n\
               \"category\": \"Tech|Finance|AI|Health|Politics|Culture|Business|Science|Other\",\n\
               \"tags\": [\"tag1\", \"tag2\", \"tag3\"],\n\
               \"importanceScore\": 0-100\n\
             }}"
        );

        let body = json!({
            "model": model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::Summarizer(e.to_string()))?
            .error_for_status()
            .map_err(|e| EnrichError::Summarizer(e.to_string()))?
            .json::<ChatResponse>()
            .await
            .map_err(|e| EnrichError::Summarizer(e.to_string()))?;

        let text = resp
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| EnrichError::InvalidResponse("empty completion".into()))?;

        debug!(model, subject, "Summarization completed");

        serde_json::from_str(text).map_err(|e| EnrichError::InvalidResponse(e.to_string()))
    }
}

/// Truncate at a UTF-8 boundary at or below `max` bytes.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate_utf8(s, 3);
        assert!(t.len() <= 3);
        assert!(s.starts_with(t));
    }

    #[test]
    fn truncate_noop_for_short_input() {
        assert_eq!(truncate_utf8("short", 8000), "short");
    }

    #[test]
    fn summarize_result_parses_partial_json() {
        let parsed: SummarizeResult =
            serde_json::from_str(r#"{"summary":"tl;dr","importanceScore":85}"#).unwrap();
        assert_eq!(parsed.summary, "tl;dr");
        assert_eq!(parsed.importance_score, 85.0);
        assert!(parsed.key_points.is_empty());
        // Missing category falls back to the default
        assert_eq!(parsed.category, "Other");
    }
}
