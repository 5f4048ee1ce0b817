//! Model directory resolution and the JSON files exported with each model.

use crate::core::config::Precision;
use crate::core::config::backend::model_root;
use crate::core::errors::{OpaqueError, RecError, RecResult};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

const DEFAULT_DECODER_START_TOKEN_ID: i64 = 2;
const DEFAULT_EOS_TOKEN_ID: i64 = 2;
/// Generation cap used when neither the caller nor the model sets one.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 128;

/// A single token id or a list of alternatives; only the first is used.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TokenIds {
    One(i64),
    Many(Vec<i64>),
}

impl TokenIds {
    fn first(&self) -> Option<i64> {
        match self {
            TokenIds::One(id) => Some(*id),
            TokenIds::Many(ids) => ids.first().copied(),
        }
    }
}

/// The encoder sub-config of an encoder-decoder model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EncoderConfig {
    #[serde(default)]
    pub model_type: Option<String>,
}

/// Token ids declared by the decoder sub-config of an encoder-decoder model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecoderConfig {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub decoder_start_token_id: Option<i64>,
    #[serde(default)]
    pub bos_token_id: Option<i64>,
    #[serde(default)]
    pub eos_token_id: Option<TokenIds>,
}

/// The subset of `config.json` the recognizers read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub decoder_start_token_id: Option<i64>,
    #[serde(default)]
    pub eos_token_id: Option<TokenIds>,
    #[serde(default)]
    pub encoder: Option<EncoderConfig>,
    #[serde(default)]
    pub decoder: Option<DecoderConfig>,
}

impl ModelConfig {
    /// Model-type identifiers that may name the family, most specific first.
    ///
    /// Donut and Nougat exports only say `vision-encoder-decoder` at the top
    /// level; the encoder and decoder sub-configs carry the telling ids.
    pub fn family_ids(&self) -> Vec<&str> {
        [
            self.encoder.as_ref().and_then(|e| e.model_type.as_deref()),
            self.decoder.as_ref().and_then(|d| d.model_type.as_deref()),
            self.model_type.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// The subset of `generation_config.json` the recognizers read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub decoder_start_token_id: Option<i64>,
    #[serde(default)]
    pub eos_token_id: Option<TokenIds>,
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

/// Target geometry in a processor config.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProcessorSize {
    HeightWidth { height: u32, width: u32 },
    Square(u32),
    /// Legacy `[width, height]` list.
    Pair([u32; 2]),
}

impl ProcessorSize {
    /// `(width, height)` of the model input.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ProcessorSize::HeightWidth { height, width } => (width, height),
            ProcessorSize::Square(side) => (side, side),
            ProcessorSize::Pair([width, height]) => (width, height),
        }
    }
}

/// The subset of `preprocessor_config.json` the recognizers read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default)]
    pub size: Option<ProcessorSize>,
    #[serde(default)]
    pub image_mean: Option<Vec<f32>>,
    #[serde(default)]
    pub image_std: Option<Vec<f32>>,
    #[serde(default)]
    pub rescale_factor: Option<f32>,
    #[serde(default)]
    pub do_rescale: Option<bool>,
    #[serde(default)]
    pub do_normalize: Option<bool>,
    #[serde(default)]
    pub resample: Option<u32>,
}

impl ProcessorConfig {
    /// Rescale factor, or 1 when rescaling is disabled.
    pub fn scale(&self) -> f32 {
        if self.do_rescale == Some(false) {
            1.0
        } else {
            self.rescale_factor.unwrap_or(1.0 / 255.0)
        }
    }

    /// Mean and std, or identity statistics when normalization is disabled.
    pub fn statistics<'a>(
        &'a self,
        default_mean: &'a [f32],
        default_std: &'a [f32],
    ) -> (&'a [f32], &'a [f32]) {
        if self.do_normalize == Some(false) {
            (&[0.0; 3], &[1.0; 3])
        } else {
            (
                self.image_mean.as_deref().unwrap_or(default_mean),
                self.image_std.as_deref().unwrap_or(default_std),
            )
        }
    }
}

/// Everything needed to build an encoder-decoder recognizer from disk.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub dir: PathBuf,
    pub config: ModelConfig,
    pub generation: GenerationConfig,
    pub processor: ProcessorConfig,
    pub encoder_path: PathBuf,
    pub decoder_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

impl ModelFiles {
    /// Resolves `model` and reads its configuration files.
    ///
    /// Half precision selects the `*_fp16.onnx` exports.
    pub fn load(model: &str, precision: Precision) -> RecResult<Self> {
        let dir = resolve_model_dir(model)?;
        let config: ModelConfig = read_json(&dir.join("config.json"))?;
        let generation = read_optional_json(&dir.join("generation_config.json"))?;
        let processor = read_optional_json(&dir.join("preprocessor_config.json"))?;

        let suffix = match precision {
            Precision::Full => "",
            Precision::Half => "_fp16",
        };
        let encoder_path = require_file(&dir, &format!("encoder_model{suffix}.onnx"))?;
        let decoder_path = require_file(&dir, &format!("decoder_model{suffix}.onnx"))?;
        let tokenizer_path = require_file(&dir, "tokenizer.json")?;

        Ok(Self {
            dir,
            config,
            generation,
            processor,
            encoder_path,
            decoder_path,
            tokenizer_path,
        })
    }

    /// Short name for logs, taken from the directory name.
    pub fn model_name(&self) -> String {
        self.dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string()
    }

    /// First token fed to the decoder.
    pub fn decoder_start_token_id(&self) -> i64 {
        let decoder = self.config.decoder.as_ref();
        self.generation
            .decoder_start_token_id
            .or(self.config.decoder_start_token_id)
            .or_else(|| decoder.and_then(|d| d.decoder_start_token_id.or(d.bos_token_id)))
            .unwrap_or(DEFAULT_DECODER_START_TOKEN_ID)
    }

    /// Token ending generation.
    pub fn eos_token_id(&self) -> i64 {
        let decoder = self.config.decoder.as_ref();
        self.generation
            .eos_token_id
            .as_ref()
            .and_then(TokenIds::first)
            .or_else(|| self.config.eos_token_id.as_ref().and_then(TokenIds::first))
            .or_else(|| decoder.and_then(|d| d.eos_token_id.as_ref()).and_then(TokenIds::first))
            .unwrap_or(DEFAULT_EOS_TOKEN_ID)
    }

    /// Generation cap: explicit value, then the model's, then the default.
    pub fn max_new_tokens(&self, explicit: Option<usize>) -> usize {
        explicit
            .or(self.generation.max_new_tokens)
            .or_else(|| self.generation.max_length.map(|l| l.saturating_sub(1)))
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_NEW_TOKENS)
    }

    /// Loads the tokenizer.
    pub fn tokenizer(&self) -> RecResult<Tokenizer> {
        Tokenizer::from_file(&self.tokenizer_path).map_err(|e| {
            RecError::model_load_error(
                &self.tokenizer_path,
                "failed to load tokenizer",
                Some("export the model with its fast tokenizer (tokenizer.json)"),
                Some(OpaqueError(e.to_string())),
            )
        })
    }
}

/// Resolves a model argument to a directory.
///
/// An existing directory is used as is; otherwise the name is looked up under
/// `LINEREC_MODEL_DIR`.
pub fn resolve_model_dir(model: &str) -> RecResult<PathBuf> {
    let direct = PathBuf::from(model);
    if direct.is_dir() {
        return Ok(direct);
    }
    if let Some(candidate) = model_root().map(|root| root.join(model))
        && candidate.is_dir()
    {
        return Ok(candidate);
    }
    Err(RecError::model_load_error(
        &direct,
        "model directory not found",
        Some("pass an exported model directory or set LINEREC_MODEL_DIR"),
        None::<OpaqueError>,
    ))
}

fn require_file(dir: &Path, name: &str) -> RecResult<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(RecError::model_load_error(
            &path,
            format!("{name} not found"),
            Some("export the model to ONNX with separate encoder and decoder graphs"),
            None::<OpaqueError>,
        ))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> RecResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RecError::model_load_error(path, "failed to read model configuration", None, Some(e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        RecError::model_load_error(path, "failed to parse model configuration", None, Some(e))
    })
}

fn read_optional_json<T: DeserializeOwned + Default>(path: &Path) -> RecResult<T> {
    if path.is_file() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_model_dir(config: &str, generation: Option<&str>) -> std::io::Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("config.json"), config)?;
        if let Some(generation) = generation {
            fs::write(dir.path().join("generation_config.json"), generation)?;
        }
        for name in [
            "encoder_model.onnx",
            "decoder_model.onnx",
            "tokenizer.json",
        ] {
            fs::write(dir.path().join(name), b"")?;
        }
        Ok(dir)
    }

    #[test]
    fn test_token_ids_fall_back_through_configs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = write_model_dir(
            r#"{"model_type": "vision-encoder-decoder", "decoder": {"bos_token_id": 0, "eos_token_id": 2}}"#,
            None,
        )?;
        let path = dir.path().to_string_lossy().to_string();
        let files = ModelFiles::load(&path, Precision::Full)?;
        assert_eq!(files.config.model_type.as_deref(), Some("vision-encoder-decoder"));
        assert_eq!(files.decoder_start_token_id(), 0);
        assert_eq!(files.eos_token_id(), 2);
        assert_eq!(files.max_new_tokens(None), DEFAULT_MAX_NEW_TOKENS);
        Ok(())
    }

    #[test]
    fn test_family_ids_prefer_sub_configs() -> Result<(), serde_json::Error> {
        let donut: ModelConfig = serde_json::from_str(
            r#"{"model_type": "vision-encoder-decoder", "encoder": {"model_type": "donut-swin"}, "decoder": {"model_type": "mbart"}}"#,
        )?;
        assert_eq!(
            donut.family_ids(),
            vec!["donut-swin", "mbart", "vision-encoder-decoder"]
        );
        let trocr: ModelConfig = serde_json::from_str(
            r#"{"model_type": "vision-encoder-decoder", "encoder": {"model_type": "vit"}, "decoder": {"model_type": "trocr"}}"#,
        )?;
        assert_eq!(trocr.family_ids(), vec!["vit", "trocr", "vision-encoder-decoder"]);
        assert!(ModelConfig::default().family_ids().is_empty());
        Ok(())
    }

    #[test]
    fn test_generation_config_takes_precedence() -> Result<(), Box<dyn std::error::Error>> {
        let dir = write_model_dir(
            r#"{"model_type": "trocr", "decoder_start_token_id": 1, "eos_token_id": 3}"#,
            Some(r#"{"decoder_start_token_id": 2, "eos_token_id": [5, 6], "max_length": 65}"#),
        )?;
        let path = dir.path().to_string_lossy().to_string();
        let files = ModelFiles::load(&path, Precision::Full)?;
        assert_eq!(files.decoder_start_token_id(), 2);
        assert_eq!(files.eos_token_id(), 5);
        assert_eq!(files.max_new_tokens(None), 64);
        assert_eq!(files.max_new_tokens(Some(10)), 10);
        Ok(())
    }

    #[test]
    fn test_half_precision_requires_fp16_exports() -> Result<(), Box<dyn std::error::Error>> {
        let dir = write_model_dir(r#"{"model_type": "trocr"}"#, None)?;
        let path = dir.path().to_string_lossy().to_string();
        let err = ModelFiles::load(&path, Precision::Half).unwrap_err();
        assert!(err.to_string().contains("encoder_model_fp16.onnx"));
        Ok(())
    }

    #[test]
    fn test_missing_model_is_a_load_error() {
        let err = resolve_model_dir("/definitely/not/a/model").unwrap_err();
        assert!(matches!(err, RecError::ModelLoad { .. }));
    }

    #[test]
    fn test_processor_size_forms() -> Result<(), serde_json::Error> {
        let hw: ProcessorConfig = serde_json::from_str(r#"{"size": {"height": 32, "width": 128}}"#)?;
        assert_eq!(hw.size.map(ProcessorSize::dimensions), Some((128, 32)));
        let square: ProcessorConfig = serde_json::from_str(r#"{"size": 384}"#)?;
        assert_eq!(square.size.map(ProcessorSize::dimensions), Some((384, 384)));
        let pair: ProcessorConfig = serde_json::from_str(r#"{"size": [1920, 2560]}"#)?;
        assert_eq!(pair.size.map(ProcessorSize::dimensions), Some((1920, 2560)));
        Ok(())
    }

    #[test]
    fn test_disabled_normalization_is_identity() {
        let cfg = ProcessorConfig {
            do_normalize: Some(false),
            do_rescale: Some(false),
            ..Default::default()
        };
        let (mean, std) = cfg.statistics(&[0.5; 3], &[0.5; 3]);
        assert_eq!(mean, &[0.0; 3]);
        assert_eq!(std, &[1.0; 3]);
        assert_eq!(cfg.scale(), 1.0);
    }
}
