use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::debug;

use crate::{truncate_text, GenerateRequest, TextProvider, TextStream};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiProvider {
    /// `timeout: None` leaves requests unbounded, which long streamed replies
    /// need.
    pub fn new(
        api_key: Option<String>,
        api_base: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            api_key: api_key.filter(|value| !value.trim().is_empty()),
            http,
        })
    }

    fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("Gemini API key missing (set GOOGLE_API_KEY or add it to secrets.toml)"),
        }
    }

    fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    fn post(&self, request: &GenerateRequest, method: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
        let endpoint = self.endpoint_for_model(&request.model, method);
        let api_key = self.api_key()?;
        let payload = build_payload(request);
        debug!(model = %request.model, method, "sending Gemini request");
        let response = self
            .http
            .post(&endpoint)
            .query(query)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({method})"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "Gemini request failed ({}): {}",
                status.as_u16(),
                gemini_error_message(&body)
            );
        }
        Ok(response)
    }
}

impl TextProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let response = self.post(request, "generateContent", &[])?;
        let body = response
            .text()
            .context("Gemini response body read failed")?;
        let parsed: Value =
            serde_json::from_str(&body).context("Gemini returned invalid JSON payload")?;
        let text = extract_candidate_text(&parsed);
        if text.is_empty() {
            bail!("Gemini returned no text ({})", empty_reply_reason(&parsed));
        }
        Ok(text)
    }

    fn generate_stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        let response = self.post(request, "streamGenerateContent", &[("alt", "sse")])?;
        Ok(Box::new(SseTextStream::new(BufReader::new(response))))
    }
}

pub(crate) fn build_payload(request: &GenerateRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(image) = request.image.as_ref() {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.mime_type,
                "data": image.data,
            }
        }));
    }
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_output_tokens,
        },
    })
}

/// Concatenated text of every part of every candidate.
pub(crate) fn extract_candidate_text(payload: &Value) -> String {
    let mut out = String::new();
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
    }
    out
}

fn empty_reply_reason(payload: &Value) -> String {
    if let Some(reason) = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return format!("prompt blocked: {reason}");
    }
    payload
        .get("candidates")
        .and_then(|candidates| candidates.get(0))
        .and_then(|candidate| candidate.get("finishReason"))
        .and_then(Value::as_str)
        .map(|reason| format!("finish reason: {reason}"))
        .unwrap_or_else(|| "no candidates".to_string())
}

fn gemini_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|parsed| {
            let error = parsed.get("error").or_else(|| {
                parsed
                    .as_array()
                    .and_then(|rows| rows.first())
                    .and_then(|row| row.get("error"))
            })?;
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_text(body.trim(), 512))
}

/// Server-sent events from `streamGenerateContent?alt=sse`, one text delta per
/// `data:` line. Ends at EOF; yields at most one error and then stops.
pub(crate) struct SseTextStream<R> {
    reader: R,
    line: String,
    finished: bool,
}

impl<R: BufRead> SseTextStream<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for SseTextStream<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.line.clear();
            let read = match self.reader.read_line(&mut self.line) {
                Ok(read) => read,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(anyhow::Error::new(err).context("Gemini stream read failed")));
                }
            };
            if read == 0 {
                self.finished = true;
                break;
            }

            let line = self.line.trim_end_matches(['\n', '\r']);
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let parsed: Value = match serde_json::from_str(data) {
                Ok(value) => value,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(
                        anyhow::Error::new(err).context("Gemini stream returned invalid JSON")
                    ));
                }
            };
            if let Some(error) = parsed.get("error") {
                self.finished = true;
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                return Some(Err(anyhow::anyhow!("Gemini stream error: {message}")));
            }
            let text = extract_candidate_text(&parsed);
            if !text.is_empty() {
                return Some(Ok(text));
            }
        }
        None
    }
}
