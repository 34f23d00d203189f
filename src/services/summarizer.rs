use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;

use crate::models::question_model::Question;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("summary request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Client for the Gemini generateContent endpoint. The base URL is
/// injectable so tests can point it at a local mock server.
pub struct Summarizer {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl Summarizer {
    pub fn new(api_key: Option<String>, base_url: String) -> Self {
        Summarizer {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            base_url,
        }
    }

    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY").ok();
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set, summaries will be unavailable");
        }
        let base_url =
            std::env::var("GEMINI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Summarizer::new(api_key, base_url)
    }

    /// Condenses the room's questions into one summary line per theme.
    /// An empty question list yields an empty summary without calling out.
    pub async fn summarize(&self, questions: &[Question]) -> Result<Vec<String>, SummarizeError> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SummarizeError::MissingApiKey)?;

        let url = format!(
            "{}/v1beta/models/gemini-2.0-flash:generateContent",
            self.base_url
        );
        let response = self
            .client
            .post(&url)
            .header("X-goog-api-key", api_key)
            .json(&json!({
                "contents": [{ "parts": [{ "text": build_prompt(questions) }] }]
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let text = body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default();

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

fn build_prompt(questions: &[Question]) -> String {
    let mut prompt = String::from(
        "You are reviewing audience questions from a live Q&A session. \
         Group questions that ask about the same thing and write one short \
         summary per group. Respond with one summary per line and no other text.\n\nQuestions:\n",
    );
    for (i, question) in questions.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, question.content));
    }
    prompt
}
