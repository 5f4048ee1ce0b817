//! Flat, user-facing parameter set.
//!
//! Parameters arrive as a JSON object (`--parameters file.json`) or as
//! individual `key value` pairs on the command line. Both paths reject
//! option names that are not listed in [`RecognizeParameters::KNOWN_OPTIONS`].

use super::backend::{BackendConfig, DecodingStrategy, DeviceSpec, Precision};
use super::errors::{ConfigError, ConfigValidator};
use super::onnx::OrtSessionConfig;
use super::pipeline::PipelineConfig;
use crate::core::registry::ModelFamily;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters accepted by the recognition tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecognizeParameters {
    /// Model directory or name.
    pub model: String,
    /// `cpu`, `cuda`, `cuda:N` or an accelerator index.
    #[serde(default)]
    pub device: DeviceSpec,
    /// Maximum crops per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// `full` or `half`.
    #[serde(default)]
    pub precision: Option<Precision>,
    /// Shorthand for `precision: half`.
    #[serde(default)]
    pub fp16: Option<bool>,
    /// Cap on generated tokens per line.
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    /// Beam width; 1 selects greedy decoding.
    #[serde(default = "default_num_beams")]
    pub num_beams: usize,
    /// Enables seeded sampling.
    #[serde(default)]
    pub do_sample: bool,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Sampling seed; required when `do_sample` is set.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Explicit model family.
    #[serde(default)]
    pub family: Option<ModelFamily>,
    /// Decoder task prompt.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Pixel budget per batch.
    #[serde(default)]
    pub max_batch_area: Option<u64>,
    /// Pixels added around each line box.
    #[serde(default)]
    pub crop_margin: u32,
    /// Mask pixels outside line outlines.
    #[serde(default = "default_true")]
    pub mask_polygon: bool,
    /// Minimum crop side length.
    #[serde(default = "default_min_crop_size")]
    pub min_crop_size: u32,
    /// Documents extracted ahead of recognition.
    #[serde(default = "default_pipeline_depth")]
    pub pipeline_depth: usize,
    /// ONNX Runtime intra-op threads.
    #[serde(default)]
    pub intra_threads: Option<usize>,
}

fn default_batch_size() -> usize {
    super::backend::DEFAULT_BATCH_SIZE
}

fn default_num_beams() -> usize {
    1
}

fn default_temperature() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_min_crop_size() -> u32 {
    2
}

fn default_pipeline_depth() -> usize {
    1
}

impl RecognizeParameters {
    /// Every option name the tool accepts.
    pub const KNOWN_OPTIONS: &'static [&'static str] = &[
        "model",
        "device",
        "batch_size",
        "precision",
        "fp16",
        "max_new_tokens",
        "num_beams",
        "do_sample",
        "temperature",
        "seed",
        "family",
        "prompt",
        "max_batch_area",
        "crop_margin",
        "mask_polygon",
        "min_crop_size",
        "pipeline_depth",
        "intra_threads",
    ];

    /// Parses parameters from a JSON object.
    pub fn from_json_map(map: Map<String, Value>) -> Result<Self, ConfigError> {
        if let Some(name) = map
            .keys()
            .find(|name| !Self::KNOWN_OPTIONS.contains(&name.as_str()))
        {
            return Err(ConfigError::UnknownOption { name: name.clone() });
        }
        serde_json::from_value(Value::Object(map)).map_err(|e| ConfigError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Parses parameters from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ConfigError::InvalidConfig {
            message: format!("parameters are not valid JSON: {e}"),
        })?;
        match value {
            Value::Object(map) => Self::from_json_map(map),
            other => Err(ConfigError::InvalidConfig {
                message: format!("parameters must be a JSON object, got {other}"),
            }),
        }
    }

    /// Merges `key value` pairs over an optional JSON base.
    ///
    /// Values are read as JSON when they parse as JSON and as plain strings
    /// otherwise, so `-P batch_size 4` and `-P device cuda:1` both work.
    pub fn from_pairs<'a>(
        base: Option<Map<String, Value>>,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut map = base.unwrap_or_default();
        for (key, raw) in pairs {
            let value = serde_json::from_str::<Value>(raw)
                .ok()
                .filter(|v| !v.is_string() || raw.starts_with('"'))
                .unwrap_or_else(|| Value::String(raw.to_string()));
            map.insert(key.to_string(), value);
        }
        Self::from_json_map(map)
    }

    fn precision(&self) -> Result<Precision, ConfigError> {
        match (self.precision, self.fp16) {
            (Some(Precision::Full), Some(true)) | (Some(Precision::Half), Some(false)) => {
                Err(ConfigError::InvalidConfig {
                    message: "precision and fp16 disagree".to_string(),
                })
            }
            (Some(precision), _) => Ok(precision),
            (None, Some(true)) => Ok(Precision::Half),
            (None, _) => Ok(Precision::Full),
        }
    }

    fn decoding(&self) -> Result<DecodingStrategy, ConfigError> {
        if self.do_sample {
            if self.num_beams > 1 {
                return Err(ConfigError::InvalidConfig {
                    message: "do_sample cannot be combined with num_beams > 1".to_string(),
                });
            }
            let seed = self.seed.ok_or_else(|| ConfigError::InvalidConfig {
                message: "do_sample requires an explicit seed".to_string(),
            })?;
            return Ok(DecodingStrategy::Sampling {
                temperature: self.temperature,
                seed,
            });
        }
        if self.seed.is_some() {
            return Err(ConfigError::InvalidConfig {
                message: "seed is only meaningful together with do_sample".to_string(),
            });
        }
        Ok(match self.num_beams {
            0 | 1 => DecodingStrategy::Greedy,
            num_beams => DecodingStrategy::BeamSearch { num_beams },
        })
    }

    /// Splits the parameters into validated backend and pipeline configurations.
    pub fn into_configs(self) -> Result<(BackendConfig, PipelineConfig), ConfigError> {
        if self.num_beams == 0 {
            return Err(ConfigError::InvalidConfig {
                message: "num_beams must be at least 1".to_string(),
            });
        }
        let precision = self.precision()?;
        let decoding = self.decoding()?;

        let mut ort_session = OrtSessionConfig::new();
        if let Some(threads) = self.intra_threads {
            ort_session = ort_session.with_intra_threads(threads);
        }

        let backend = BackendConfig {
            model: self.model,
            device: self.device,
            precision,
            batch_size: self.batch_size,
            max_new_tokens: self.max_new_tokens,
            decoding,
            family: self.family,
            prompt: self.prompt,
            ort_session,
        };
        backend.validate()?;

        let pipeline = PipelineConfig {
            max_batch_area: self.max_batch_area,
            crop_margin: self.crop_margin,
            mask_polygon: self.mask_polygon,
            min_crop_size: self.min_crop_size,
            prefetch_depth: self.pipeline_depth,
            ..PipelineConfig::default()
        };
        pipeline.validate()?;

        Ok((backend, pipeline))
    }
}
