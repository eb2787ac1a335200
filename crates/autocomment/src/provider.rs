//! Gemini `generateContent` adapter.
//!
//! Translates HTTP failures into structured [`GenerationError`]s so the retry
//! classifier sees the status name and any `google.rpc.RetryInfo` delay
//! instead of guessing from text.

use std::time::Duration;

use async_trait::async_trait;
use guardrails::{GenerationError, GenerationRequest, Generator, ModelTier, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;

const RETRY_INFO_TYPE: &str = "type.googleapis.com/google.rpc.RetryInfo";
/// Transport-level ceiling; the pipeline applies its own per-attempt deadline.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    primary_model: String,
    repair_model: String,
}

impl GeminiGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        primary_model: impl Into<String>,
        repair_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        Ok(Self {
            client: reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?,
            base_url: base_url.into(),
            api_key,
            primary_model: primary_model.into(),
            repair_model: repair_model.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or(ProviderError::MissingApiKey)?;
        Self::new(
            config.base_url.clone(),
            api_key,
            config.primary_model.clone(),
            config.repair_model.clone(),
        )
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Primary => &self.primary_model,
            ModelTier::Repair => &self.repair_model,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let model = self.model_for(request.tier);
        let body = serde_json::json!({
            "systemInstruction": {
                "parts": [{ "text": request.system_instruction }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "responseMimeType": "text/plain"
            }
        });

        debug!(model, tier = ?request.tier, prompt_len = request.prompt.len(), "sending generateContent");

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::other(format!("request to {model} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::other(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(map_error_response(status.as_u16(), &text));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GenerationError::other(format!("malformed response body: {e}")))?;
        extract_text(&json)
    }
}

/// Concatenate the text parts of the first candidate.
pub fn extract_text(response: &serde_json::Value) -> Result<String, GenerationError> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| match response["promptFeedback"]["blockReason"].as_str() {
            Some(reason) => GenerationError::status(
                StatusCode::InvalidArgument,
                format!("prompt blocked: {reason}"),
            ),
            None => GenerationError::other("response contained no candidate content"),
        })?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        return Err(GenerationError::other("response contained no candidate text"));
    }
    Ok(text)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

/// Map a non-2xx response to a structured error.
pub fn map_error_response(http_status: u16, body: &str) -> GenerationError {
    let Ok(ErrorEnvelope { error }) = serde_json::from_str::<ErrorEnvelope>(body) else {
        let snippet: String = body.trim().chars().take(200).collect();
        return GenerationError::status(
            StatusCode::from_http(http_status),
            format!("HTTP {http_status}: {snippet}"),
        );
    };

    let code = match error.status.as_deref().map(StatusCode::from_name) {
        Some(code) if code != StatusCode::Unknown => code,
        _ => StatusCode::from_http(http_status),
    };
    let retry_delay = error.details.iter().find_map(retry_delay_from_detail);

    GenerationError::Status {
        code,
        message: error.message,
        retry_delay,
    }
}

fn retry_delay_from_detail(detail: &serde_json::Value) -> Option<Duration> {
    if detail["@type"].as_str() != Some(RETRY_INFO_TYPE) {
        return None;
    }
    parse_proto_duration(detail["retryDelay"].as_str()?)
}

/// Parse a protobuf JSON duration such as `"2.5s"`. Zero yields `None`.
pub fn parse_proto_duration(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}
