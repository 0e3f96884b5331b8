use serde::{Deserialize, Serialize};
use sift_core::retry::RetryConfig;

/// Inference device requested from the summarization service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Let the service pick (GPU when present).
    #[default]
    Auto,
    /// Force CPU.
    Cpu,
    /// Force CUDA.
    Cuda,
}

impl Device {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

/// Summarization settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizerSettings {
    /// Whether to call the model at all. Disabled means fallback-only.
    pub enabled: bool,
    /// Base URL of the inference sidecar.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Inference device.
    pub device: Device,
    /// Maximum summary length in tokens.
    pub max_length: u32,
    /// Minimum summary length in tokens.
    pub min_length: u32,
    /// Papers per request.
    pub batch_size: usize,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Model load timeout in milliseconds.
    pub load_timeout_ms: u64,
    /// Inputs shorter than this (characters) are not sent to the model.
    pub min_input_chars: usize,
    /// Length of the truncated-abstract fallback in characters.
    pub fallback_chars: usize,
    /// Retry policy for model requests.
    pub retry: RetryConfig,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://127.0.0.1:8788".to_string(),
            model: "facebook/bart-large-cnn".to_string(),
            device: Device::Auto,
            max_length: 150,
            min_length: 50,
            batch_size: 4,
            timeout_ms: 60_000,
            load_timeout_ms: 180_000,
            min_input_chars: 100,
            fallback_chars: 300,
            retry: RetryConfig::default(),
        }
    }
}
