//! OpenAI-compatible chat completion client for the brain endpoints.
//!
//! The brains need one-shot, deterministic completions (temperature 0, no
//! streaming) whose replies are parsed as a single JSON object. The model
//! is an advisor only — everything it returns is re-validated by the
//! handlers before it can touch flow state.

use serde::Deserialize;

use crate::config::BrainConfig;
use crate::error::{KioskError, Result};

/// A single prompt message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LlmMessage {
    pub role: &'static str,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Chat-completions client against an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    /// Build a client from brain configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &BrainConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.llm_timeout_ms))
            .build()
            .map_err(|e| KioskError::Llm(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.llm_api_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            temperature: config.temperature,
        })
    }

    /// Request one completion and return the assistant text.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a reply
    /// without content.
    pub async fn complete(&self, messages: &[LlmMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });

        let mut req = self.http.post(&self.api_url).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| KioskError::Llm(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KioskError::Llm(format!(
                "provider returned {status}: {text}"
            )));
        }

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| KioskError::Llm(format!("malformed completion reply: {e}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| KioskError::Llm("completion reply had no content".to_owned()))
    }
}

/// Extract the first balanced JSON object from free-form model output.
///
/// Models wrap JSON in prose and code fences no matter how strict the
/// prompt is; this scanner tolerates both. String escapes are honored so
/// braces inside values don't end the object early.
pub fn extract_first_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
