// ============================================================================
// File: src/llm_client.rs
// Hosted inference API client
// ============================================================================

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::models::{InferenceRequest, InferenceResponse, ModelInput, RawModelResult};

/// Anything that can run a model and hand back its untrusted result.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn run(&self, model: &str, input: &ModelInput) -> Result<RawModelResult, ToolError>;
}

/// Client bound to one credential of the hosted API
pub struct HttpInferenceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpInferenceClient {
    pub fn new(base_url: String, api_key: String, timeout: Option<Duration>) -> Result<Self, ToolError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}", self.base_url, model)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn run(&self, model: &str, input: &ModelInput) -> Result<RawModelResult, ToolError> {
        debug!("Calling model: {}", model);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("Authorization", format!("Key {}", self.api_key))
            .json(&InferenceRequest::from(input))
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("API error for model '{}': HTTP {}", model, status);
            return Ok(RawModelResult::Error(api_error_message(status.as_u16(), &error_text)));
        }

        let is_json = content_type.as_deref().map_or(true, |ct| ct.ends_with("json"));
        if !is_json {
            let bytes = response.bytes().await?;
            debug!("Model '{}' returned {} bytes of {:?}", model, bytes.len(), content_type);
            return Ok(RawModelResult::Binary {
                bytes: bytes.to_vec(),
                mime: content_type,
            });
        }

        let response_text = response.text().await?;
        Ok(parse_envelope(&response_text))
    }
}

/// Reads the `{ error, output }` envelope. Bodies that are not an envelope
/// are handed to the normalizer as-is.
pub fn parse_envelope(body: &str) -> RawModelResult {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return RawModelResult::Json(serde_json::Value::String(body.to_string())),
    };

    let is_envelope = value.get("output").is_some() || value.get("error").is_some();
    if !is_envelope {
        return RawModelResult::Json(value);
    }

    match serde_json::from_value::<InferenceResponse>(value) {
        Ok(envelope) => match envelope.error.as_ref().and_then(error_text) {
            Some(message) => RawModelResult::Error(message),
            None => RawModelResult::Json(envelope.output),
        },
        Err(e) => RawModelResult::Error(format!("Malformed response: {}", e)),
    }
}

fn error_text(error: &serde_json::Value) -> Option<String> {
    match error {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) if s.trim().is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| Some(error.to_string())),
        other => Some(other.to_string()),
    }
}

fn api_error_message(status: u16, body: &str) -> String {
    match parse_envelope(body) {
        RawModelResult::Error(message) => format!("HTTP {}: {}", status, message),
        _ if body.trim().is_empty() => format!("HTTP {}", status),
        _ => format!("HTTP {}: {}", status, body.chars().take(500).collect::<String>()),
    }
}
