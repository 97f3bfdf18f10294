//! Newsletter summarization through a chat-completion API
//!
//! Summaries never fail outward: any problem comes back as an
//! `"Error summarizing email: ..."` string in place of the summary.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::SummarizerConfig;
use crate::http::{self, RetryPolicy};

/// Line Gmail inserts above forwarded content
pub const FORWARDED_MARKER: &str = "---------- Forwarded message ---------";

/// Body characters sent to the model
pub const MAX_BODY_CHARS: usize = 2000;

const SYSTEM_PROMPT: &str = "Create a concise summary focusing only on the most important points. \
If this is a forwarded email, focus on the main content. \
Maintain the original language of the content.";

const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f32 = 0.5;

/// Text-in, text-out summarization
pub trait Summarizer: Send + Sync {
    /// Summarize a message; failures are returned as inline error text
    fn summarize(&self, subject: &str, body: &str) -> String;
}

/// Format a failure the way callers expect to display it
pub fn error_summary(reason: impl std::fmt::Display) -> String {
    format!("Error summarizing email: {}", reason)
}

/// Strip forwarding boilerplate and cap the body length
pub fn prepare_body(body: &str) -> String {
    let body = body.replace("\r\n", "\n");
    let content = match body.split_once(FORWARDED_MARKER) {
        // Skip the forwarded header block (From/Date/Subject/To lines)
        Some((_, forwarded)) => match forwarded.split_once("\n\n") {
            Some((_, content)) => content,
            None => forwarded,
        },
        None => body.as_str(),
    };

    match content.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// User message sent to the model
pub fn user_prompt(subject: &str, body: &str) -> String {
    format!("Subject: {}\n\nBody:\n{}", subject, prepare_body(body))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat-completion client
pub struct OpenAiSummarizer {
    config: SummarizerConfig,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl OpenAiSummarizer {
    pub fn new(config: SummarizerConfig, agent: ureq::Agent, retry: RetryPolicy) -> Self {
        Self {
            config,
            agent,
            retry,
        }
    }

    fn request_summary(&self, subject: &str, body: &str) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is not configured")?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt(subject, body),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let bearer = format!("Bearer {}", api_key);
        let response: ChatResponse = http::with_retry(&self.retry, "summarization", || {
            let mut response = self
                .agent
                .post(&url)
                .header("Authorization", &bearer)
                .send_json(&request)?;
            response.body_mut().read_json::<ChatResponse>()
        })?;

        let summary = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .context("response contained no summary")?;

        debug!("Received summary of {} chars", summary.len());
        Ok(summary)
    }
}

impl Summarizer for OpenAiSummarizer {
    fn summarize(&self, subject: &str, body: &str) -> String {
        match self.request_summary(subject, body) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summarization failed: {:#}", e);
                error_summary(format!("{:#}", e))
            }
        }
    }
}
