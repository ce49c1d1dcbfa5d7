//! Ollama connector: model readiness, streamed pulls and blocking chat.

use super::ChatBackend;
use crate::error::HubError;
use crate::model::{ChatMessage, HubConfig, PullProgress};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::io::{BufRead, BufReader, Lines};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pulls of multi-gigabyte models outlive any sensible request timeout.
const PULL_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Thin HTTP client for the Ollama REST API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl OllamaClient {
    pub fn new(cfg: &HubConfig) -> Result<Self, HubError> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| HubError::Internal(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.host.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether `model` is present locally. Absence is `Ok(false)`, not a fault.
    pub fn check_ready(&self, model: &str) -> Result<bool, HubError> {
        let resp = self
            .http
            .post(self.url("/api/show"))
            .json(&json!({ "model": model }))
            .send()
            .map_err(|e| HubError::ServiceUnreachable(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        readiness_from_failure(status, &error_detail(resp))
    }

    /// Start a streamed pull. The returned iterator ends after the final chunk, or
    /// after yielding a single `PullFailed` error.
    pub fn pull(&self, model: &str) -> Result<PullStream, HubError> {
        let resp = self
            .http
            .post(self.url("/api/pull"))
            .timeout(PULL_TIMEOUT)
            .json(&json!({ "model": model, "stream": true }))
            .send()
            .map_err(|e| HubError::ServiceUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(HubError::PullFailed(error_detail(resp)));
        }
        Ok(PullStream {
            lines: BufReader::new(resp).lines(),
            finished: false,
        })
    }

    pub fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, HubError> {
        let resp = self
            .http
            .post(self.url("/api/chat"))
            .json(&json!({ "model": model, "messages": messages, "stream": false }))
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    HubError::ServiceUnreachable(e.to_string())
                } else {
                    HubError::Service(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(HubError::Service(format!(
                "{status}: {}",
                error_detail(resp)
            )));
        }
        let body: ChatResponse = resp
            .json()
            .map_err(|e| HubError::Service(format!("malformed chat response: {e}")))?;
        Ok(body.message.content.trim().to_string())
    }
}

/// Classify a failed `/api/show`. A missing model is `Ok(false)`; any other failure
/// means the service cannot answer for the model and is `ServiceUnreachable`.
fn readiness_from_failure(status: StatusCode, detail: &str) -> Result<bool, HubError> {
    // Older servers answer a missing model with a 500 "not found".
    if status == StatusCode::NOT_FOUND || detail.to_lowercase().contains("not found") {
        Ok(false)
    } else {
        Err(HubError::ServiceUnreachable(format!("{status}: {detail}")))
    }
}

/// Extract the `error` field of a failed response, falling back to the raw body.
fn error_detail(resp: Response) -> String {
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            if text.trim().is_empty() {
                status.to_string()
            } else {
                text.trim().to_string()
            }
        })
}

/// Streamed pull progress, one JSON object per line.
pub struct PullStream {
    lines: Lines<BufReader<Response>>,
    finished: bool,
}

impl Iterator for PullStream {
    type Item = Result<PullProgress, HubError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(HubError::PullFailed(e.to_string())));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            match parse_pull_line(&line) {
                Ok(Some(progress)) => return Some(Ok(progress)),
                Ok(None) => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Parse one NDJSON pull chunk. Blank lines yield `None`; an `error` chunk fails.
pub(crate) fn parse_pull_line(line: &str) -> Result<Option<PullProgress>, HubError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let v: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| HubError::PullFailed(format!("malformed pull chunk: {e}")))?;
    if let Some(err) = v.get("error").and_then(|e| e.as_str()) {
        return Err(HubError::PullFailed(err.to_string()));
    }
    Ok(Some(PullProgress {
        status: v
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string(),
        // Both may be null or missing on non-download statuses.
        total: v.get("total").and_then(|t| t.as_u64()).unwrap_or(0),
        completed: v.get("completed").and_then(|c| c.as_u64()).unwrap_or(0),
    }))
}

/// Process-wide connector: the client, the model it serves and the readiness
/// flag decided once at startup.
pub struct Connector {
    client: OllamaClient,
    model: String,
    ready: bool,
}

impl Connector {
    /// Check the model and pull it when absent. Blocking; call once before any
    /// interactive loop starts.
    pub fn establish(
        client: OllamaClient,
        model: &str,
        pull: bool,
        mut on_progress: impl FnMut(&PullProgress),
    ) -> Result<Self, HubError> {
        info!(model, "checking for local model");
        let present = client.check_ready(model)?;
        let ready = if present {
            info!(model, "model is available locally");
            true
        } else if pull {
            info!(model, "model not found locally, pulling");
            for chunk in client.pull(model)? {
                let chunk = chunk?;
                debug!(status = %chunk.status, completed = chunk.completed, total = chunk.total, "pull");
                on_progress(&chunk);
            }
            info!(model, "model pulled and ready");
            true
        } else {
            warn!(model, "model not present and pulling is disabled");
            false
        };

        Ok(Self {
            client,
            model: model.to_string(),
            ready,
        })
    }
}

impl ChatBackend for Connector {
    fn model(&self) -> &str {
        &self.model
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<String, HubError> {
        self.client.chat(&self.model, messages)
    }
}
