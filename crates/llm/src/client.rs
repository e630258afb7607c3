//! OpenAI-compatible chat-completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use ontology::ports::{LlmClient, LlmRequest, LlmResponse};
use ontology::LlmError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::LlmConfig;

/// Longest provider body echoed into an error message.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    json_mode: bool,
}

impl ChatCompletionClient {
    pub fn new(http: reqwest::Client, config: &LlmConfig, api_key: String) -> Self {
        Self {
            http,
            url: config.completions_url(),
            model: config.model.clone(),
            api_key,
            timeout: config.timeout(),
            json_mode: config.json_mode,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": &request.system_message},
                {"role": "user", "content": &request.prompt}
            ],
            "temperature": request.temperature,
        });
        if self.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

fn parse_completion(body: &str, requested_model: &str) -> Result<LlmResponse, LlmError> {
    let completion: Completion =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse {
            message: format!("malformed completion body: {e}"),
        })?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::InvalidResponse {
            message: "completion has no message content".to_string(),
        })?;
    Ok(LlmResponse {
        content,
        model: completion
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        prompt_tokens: completion.usage.prompt_tokens,
        completion_tokens: completion.usage.completion_tokens,
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited {
            retry_after: retry_after(headers),
        };
    }
    let mut message: String = body.chars().take(MAX_ERROR_BODY).collect();
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("unknown").to_string();
    }
    LlmError::Api {
        status: status.as_u16(),
        message,
    }
}

fn transport_error(err: reqwest::Error, started: Instant) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            elapsed: started.elapsed(),
        }
    } else if err.is_decode() {
        LlmError::InvalidResponse {
            message: err.to_string(),
        }
    } else {
        LlmError::Transport {
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for ChatCompletionClient {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let started = Instant::now();
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| transport_error(e, started))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, started))?;
        if !status.is_success() {
            return Err(status_error(status, &headers, &body));
        }

        let parsed = parse_completion(&body, &self.model)?;
        debug!(
            model = %parsed.model,
            prompt_tokens = parsed.prompt_tokens,
            completion_tokens = parsed.completion_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "LLM completion received"
        );
        Ok(parsed)
    }
}
