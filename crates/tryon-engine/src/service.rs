use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, instrument};
use tryon_contracts::{Credential, InlinePart};

use crate::config::TryOnConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlinePart,
    },
}

impl RequestPart {
    pub fn text(text: impl Into<String>) -> Self {
        RequestPart::Text { text: text.into() }
    }

    pub fn inline(part: InlinePart) -> Self {
        RequestPart::Inline { inline_data: part }
    }
}

/// One `generateContent` call. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub model: String,
    pub parts: Vec<RequestPart>,
    pub response_modalities: Vec<Modality>,
}

impl InferenceRequest {
    pub fn new(model: impl Into<String>, parts: Vec<RequestPart>) -> Self {
        Self {
            model: model.into(),
            parts,
            response_modalities: Vec::new(),
        }
    }

    pub fn with_modalities(mut self, modalities: &[Modality]) -> Self {
        self.response_modalities = modalities.to_vec();
        self
    }

    pub fn payload(&self) -> Value {
        let mut payload = json!({
            "contents": [{
                "role": "user",
                "parts": self.parts,
            }],
        });
        if !self.response_modalities.is_empty() {
            payload["generationConfig"] = json!({
                "responseModalities": self.response_modalities,
            });
        }
        payload
    }
}

/// Raw service response. Only a handful of fields are relied upon; the
/// rest is carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult(Value);

impl InferenceResult {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    /// Top-level `text`, else the concatenated text parts of the first
    /// candidate. `None` when blank.
    pub fn text(&self) -> Option<String> {
        let text = match self.0.get("text").and_then(Value::as_str) {
            Some(top_level) => top_level.to_string(),
            None => self
                .first_candidate_parts()
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(""),
        };
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    pub fn first_candidate_parts(&self) -> &[Value] {
        self.0
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate_content(
        &self,
        request: &InferenceRequest,
        credential: &Credential,
    ) -> Result<InferenceResult, ServiceError>;
}

/// `generateContent` over the Gemini REST API.
pub struct GeminiClient {
    api_base: String,
    http: HttpClient,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
            timeout,
        }
    }

    pub fn from_config(config: &TryOnConfig) -> Self {
        Self::new(config.api_base.clone(), config.request_timeout)
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    #[instrument(skip(self, request, credential), fields(model = %request.model, parts = request.parts.len()))]
    async fn generate_content(
        &self,
        request: &InferenceRequest,
        credential: &Credential,
    ) -> Result<InferenceResult, ServiceError> {
        let endpoint = self.endpoint_for_model(&request.model);
        debug!(%endpoint, "sending generateContent request");
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", credential.expose())
            .timeout(self.timeout)
            .json(&request.payload())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }
        let parsed: Value = serde_json::from_str(&body)?;
        debug!("received generateContent response");
        Ok(InferenceResult::new(parsed))
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate_text(body.trim(), 512))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
