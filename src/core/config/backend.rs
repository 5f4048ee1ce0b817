//! Recognition backend configuration.
//!
//! A [`BackendConfig`] is built once per process and passed by reference into
//! the backend loader. Changing any field means loading a new backend.

use super::errors::{ConfigError, ConfigValidator};
use super::onnx::OrtSessionConfig;
use crate::core::registry::ModelFamily;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of crops per inference batch.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Hard ceiling for the configured batch size.
pub const MAX_BATCH_SIZE: usize = 512;

/// Compute device a backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceSpec {
    /// Host CPU.
    #[default]
    Cpu,
    /// CUDA device with the given ordinal.
    Cuda(i32),
}

impl DeviceSpec {
    /// Returns true for accelerator devices.
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, DeviceSpec::Cpu)
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Cpu => write!(f, "cpu"),
            DeviceSpec::Cuda(id) => write!(f, "cuda:{id}"),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = ConfigError;

    /// Parses `cpu`, `cuda`, `cuda:N` or a bare accelerator index `N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let device = s.trim().to_lowercase();
        let invalid = || ConfigError::InvalidConfig {
            message: format!("unrecognized device '{s}', expected cpu, cuda, cuda:N or N"),
        };

        if device == "cpu" {
            return Ok(DeviceSpec::Cpu);
        }
        if device == "cuda" || device == "gpu" {
            return Ok(DeviceSpec::Cuda(0));
        }
        let index = device
            .strip_prefix("cuda:")
            .or_else(|| device.strip_prefix("gpu:"))
            .unwrap_or(&device);
        match index.parse::<i32>() {
            Ok(id) if id >= 0 => Ok(DeviceSpec::Cuda(id)),
            _ => Err(invalid()),
        }
    }
}

impl Serialize for DeviceSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Index(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
            Raw::Index(id) => i32::try_from(id)
                .ok()
                .filter(|id| *id >= 0)
                .map(DeviceSpec::Cuda)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid device index {id}"))),
        }
    }
}

/// Numeric precision of model weights and activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit floating point.
    #[default]
    Full,
    /// 16-bit floating point; accelerators only.
    Half,
}

impl Precision {
    /// Precision actually used on `device`. Half precision is only honoured on accelerators.
    pub fn effective_for(self, device: &DeviceSpec) -> Precision {
        match (self, device.is_accelerator()) {
            (Precision::Half, true) => Precision::Half,
            _ => Precision::Full,
        }
    }
}

/// Token selection strategy used during generation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodingStrategy {
    /// Highest-probability token at every step.
    #[default]
    Greedy,
    /// Beam search with a fixed width.
    BeamSearch {
        /// Number of hypotheses kept per line.
        num_beams: usize,
    },
    /// Temperature sampling from a seeded generator.
    Sampling {
        /// Softmax temperature.
        temperature: f32,
        /// Seed for the random generator.
        seed: u64,
    },
}

/// Configuration of a recognition backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Model directory or name resolvable under the model root.
    pub model: String,
    /// Compute device.
    #[serde(default)]
    pub device: DeviceSpec,
    /// Numeric precision.
    #[serde(default)]
    pub precision: Precision,
    /// Maximum number of crops per inference batch.
    pub batch_size: usize,
    /// Cap on generated tokens per line; model default when unset.
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    /// Token selection strategy.
    #[serde(default)]
    pub decoding: DecodingStrategy,
    /// Explicit model family, overriding detection from the model config.
    #[serde(default)]
    pub family: Option<ModelFamily>,
    /// Task prompt prepended to the decoder input of general vision-to-sequence models.
    #[serde(default)]
    pub prompt: Option<String>,
    /// ONNX Runtime session options.
    #[serde(default)]
    pub ort_session: OrtSessionConfig,
}

impl BackendConfig {
    /// Creates a configuration for `model` with default settings.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            device: DeviceSpec::Cpu,
            precision: Precision::Full,
            batch_size: DEFAULT_BATCH_SIZE,
            max_new_tokens: None,
            decoding: DecodingStrategy::Greedy,
            family: None,
            prompt: None,
            ort_session: OrtSessionConfig::default(),
        }
    }

    /// Sets the compute device.
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Sets the numeric precision.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Sets the batch size ceiling.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the generation length cap.
    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = Some(max_new_tokens);
        self
    }

    /// Sets the decoding strategy.
    pub fn with_decoding(mut self, decoding: DecodingStrategy) -> Self {
        self.decoding = decoding;
        self
    }

    /// Forces a model family instead of detecting it.
    pub fn with_family(mut self, family: ModelFamily) -> Self {
        self.family = Some(family);
        self
    }

    /// Sets the decoder task prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Sets the ONNX Runtime session options.
    pub fn with_ort_session(mut self, ort_session: OrtSessionConfig) -> Self {
        self.ort_session = ort_session;
        self
    }

    /// Precision after applying the device constraint.
    pub fn effective_precision(&self) -> Precision {
        self.precision.effective_for(&self.device)
    }
}

impl ConfigValidator for BackendConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "model must not be empty".to_string(),
            });
        }
        self.validate_batch_size_with_limits(self.batch_size, MAX_BATCH_SIZE)?;
        if let Some(max_new_tokens) = self.max_new_tokens {
            self.validate_positive_usize(max_new_tokens, "max_new_tokens")?;
        }
        match self.decoding {
            DecodingStrategy::Greedy => {}
            DecodingStrategy::BeamSearch { num_beams } => {
                self.validate_positive_usize(num_beams, "num_beams")?;
            }
            DecodingStrategy::Sampling { temperature, .. } => {
                self.validate_positive_f32(temperature, "temperature")?;
            }
        }
        if let Some(threads) = self.ort_session.intra_threads {
            self.validate_thread_count(threads)?;
        }
        if let Some(threads) = self.ort_session.inter_threads {
            self.validate_thread_count(threads)?;
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::new("")
    }
}

/// Root directory for resolving model names, taken from `LINEREC_MODEL_DIR`.
pub fn model_root() -> Option<PathBuf> {
    std::env::var_os("LINEREC_MODEL_DIR").map(PathBuf::from)
}
