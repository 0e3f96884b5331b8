//! Summarization model interface and the HTTP sidecar implementation.
//!
//! The sidecar is a small inference service (e.g. a `transformers`
//! pipeline) exposing:
//!
//! - `POST /load` `{"model", "device"}` loads or confirms the model
//! - `POST /summarize` `{"model", "device", "inputs", "maxLength", "minLength"}`
//!   returns `{"summaries": [{"text": ...} | {"error": ...}]}` in input order

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::text::truncate_chars;
use sift_settings::{Device, SummarizerSettings};
use tracing::{debug, info};

use crate::errors::{Result, SummarizerError};

/// Generation bounds passed with every request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummaryParams {
    /// Maximum output length in tokens.
    pub max_length: u32,
    /// Minimum output length in tokens.
    pub min_length: u32,
}

/// Per-input result of a batch call: synopsis or error message.
pub type ItemOutcome = std::result::Result<String, String>;

/// Text-in, summary-out capability.
#[async_trait]
pub trait SummaryModel: Send + Sync {
    /// Model identifier for logs.
    fn model_id(&self) -> &str;

    /// Make sure the model is loaded. Failure means the whole run falls back.
    async fn load(&self) -> Result<()>;

    /// Summarize `inputs`, returning one outcome per input in order.
    async fn summarize_batch(&self, inputs: &[String], params: SummaryParams)
    -> Result<Vec<ItemOutcome>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Disabled
// ─────────────────────────────────────────────────────────────────────────────

/// Model used when summarization is switched off; never loads.
#[derive(Debug, Default)]
pub struct DisabledModel;

#[async_trait]
impl SummaryModel for DisabledModel {
    fn model_id(&self) -> &str {
        "disabled"
    }

    async fn load(&self) -> Result<()> {
        Err(SummarizerError::Disabled)
    }

    async fn summarize_batch(&self, _: &[String], _: SummaryParams) -> Result<Vec<ItemOutcome>> {
        Err(SummarizerError::Disabled)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sidecar
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadRequest<'a> {
    model: &'a str,
    device: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadResponse {
    #[serde(default)]
    device: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeRequest<'a> {
    model: &'a str,
    device: &'a str,
    inputs: &'a [String],
    max_length: u32,
    min_length: u32,
}

#[derive(Deserialize)]
struct SummarizeResponse {
    summaries: Vec<SummaryItem>,
}

#[derive(Deserialize)]
struct SummaryItem {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// [`SummaryModel`] served by an HTTP inference sidecar.
pub struct SidecarModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    device: Device,
    load_timeout: Duration,
}

impl SidecarModel {
    /// Build from summarizer settings.
    pub fn new(settings: &SummarizerSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| SummarizerError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            device: settings.device,
            load_timeout: Duration::from_millis(settings.load_timeout_ms),
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SummarizerError::Http {
            status: status.as_u16(),
            body: truncate_chars(&body, 200),
        })
    }
}

#[async_trait]
impl SummaryModel for SidecarModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn load(&self) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/load", self.base_url))
            .timeout(self.load_timeout)
            .json(&LoadRequest {
                model: &self.model,
                device: self.device.as_str(),
            })
            .send()
            .await
            .map_err(|e| SummarizerError::ModelUnavailable(e.to_string()))?;
        let response = Self::check_status(response)
            .await
            .map_err(|e| SummarizerError::ModelUnavailable(e.to_string()))?;
        let loaded: LoadResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::ModelUnavailable(e.to_string()))?;
        info!(
            model = %self.model,
            device = loaded.device.as_deref().unwrap_or(self.device.as_str()),
            "summarization model ready"
        );
        Ok(())
    }

    async fn summarize_batch(
        &self,
        inputs: &[String],
        params: SummaryParams,
    ) -> Result<Vec<ItemOutcome>> {
        let response = self
            .http
            .post(format!("{}/summarize", self.base_url))
            .json(&SummarizeRequest {
                model: &self.model,
                device: self.device.as_str(),
                inputs,
                max_length: params.max_length,
                min_length: params.min_length,
            })
            .send()
            .await?;
        let parsed: SummarizeResponse = Self::check_status(response).await?.json().await?;
        if parsed.summaries.len() != inputs.len() {
            return Err(SummarizerError::InvalidResponse(format!(
                "expected {} summaries, got {}",
                inputs.len(),
                parsed.summaries.len()
            )));
        }
        debug!(count = inputs.len(), "batch summarized");
        Ok(parsed
            .summaries
            .into_iter()
            .map(|item| match (item.text, item.error) {
                (Some(text), None) => Ok(text),
                (_, Some(error)) => Err(error),
                (None, None) => Err("no text returned".to_string()),
            })
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PARAMS: SummaryParams = SummaryParams {
        max_length: 150,
        min_length: 50,
    };

    fn sidecar(server: &MockServer) -> SidecarModel {
        SidecarModel::new(&SummarizerSettings {
            base_url: format!("{}/", server.uri()),
            device: Device::Cpu,
            timeout_ms: 2000,
            load_timeout_ms: 2000,
            ..SummarizerSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn load_sends_model_and_device() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/load"))
            .and(body_partial_json(serde_json::json!({
                "model": "facebook/bart-large-cnn",
                "device": "cpu"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"device": "cpu"})))
            .expect(1)
            .mount(&server)
            .await;
        sidecar(&server).load().await.unwrap();
    }

    #[tokio::test]
    async fn load_failure_is_model_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/load"))
            .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
            .mount(&server)
            .await;
        let err = sidecar(&server).load().await.unwrap_err();
        assert_matches!(err, SummarizerError::ModelUnavailable(ref m) if m.contains("CUDA out of memory"));
    }

    #[tokio::test]
    async fn batch_maps_items_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize"))
            .and(body_partial_json(serde_json::json!({"maxLength": 150, "minLength": 50})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "summaries": [{"text": "first"}, {"error": "too long"}, {}]
            })))
            .mount(&server)
            .await;
        let inputs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = sidecar(&server).summarize_batch(&inputs, PARAMS).await.unwrap();
        assert_eq!(out[0], Ok("first".to_string()));
        assert_eq!(out[1], Err("too long".to_string()));
        assert!(out[2].is_err());
    }

    #[tokio::test]
    async fn length_mismatch_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"summaries": []})))
            .mount(&server)
            .await;
        let err = sidecar(&server)
            .summarize_batch(&["a".to_string()], PARAMS)
            .await
            .unwrap_err();
        assert_matches!(err, SummarizerError::InvalidResponse(_));
    }

    #[tokio::test]
    async fn server_error_is_retryable_http() {
        use sift_core::Retryable;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = sidecar(&server)
            .summarize_batch(&["a".to_string()], PARAMS)
            .await
            .unwrap_err();
        assert_matches!(err, SummarizerError::Http { status: 503, .. });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn disabled_model_never_loads() {
        assert_matches!(DisabledModel.load().await, Err(SummarizerError::Disabled));
    }
}
