//! Line recognition backends.
//!
//! Two model families are supported, both exported as separate ONNX encoder
//! and decoder graphs:
//!
//! - [`TrOcrRecognizer`] for specialized line-image encoder-decoders
//! - [`Vision2SeqRecognizer`] for general vision-to-sequence models
//!
//! [`RecognitionBackend::load`] picks the family once, from the explicit
//! `family` option or the `model_type` ids in the model's `config.json`
//! (encoder and decoder sub-configs first).

pub mod encoder_decoder;
pub mod generation;
pub mod isolate;
pub mod model_files;
mod trocr;
mod vision2seq;

pub use generation::{GeneratedSequence, GenerationParams, StepLogits, generate};
pub use isolate::{IsolatedOutcome, recognize_isolated};
pub use model_files::{ModelFiles, resolve_model_dir};
pub use trocr::TrOcrRecognizer;
pub use vision2seq::Vision2SeqRecognizer;

use crate::core::config::{BackendConfig, ConfigValidator, DeviceSpec};
use crate::core::errors::RecResult;
use crate::core::inference::probe_device;
use crate::core::registry::{ModelFamily, ModelFamilyRegistry};
use crate::core::traits::LineRecognizer;
use crate::domain::{LineCrop, RecognitionResult};
use tracing::info;

/// The closed set of recognizer families.
#[derive(Debug)]
pub enum RecognitionBackend {
    SpecializedEncoder(TrOcrRecognizer),
    GeneralVision2Seq(Vision2SeqRecognizer),
}

impl RecognitionBackend {
    /// Validates the configuration, checks the device and loads the model.
    ///
    /// Every failure here is a setup error: an unknown option, an unreachable
    /// device or missing model files.
    pub fn load(cfg: &BackendConfig) -> RecResult<Self> {
        cfg.validate()?;
        probe_device(&cfg.device)?;

        let precision = encoder_decoder::session_precision(cfg);
        let files = ModelFiles::load(&cfg.model, precision)?;
        let family = ModelFamilyRegistry::resolve(&files.config.family_ids(), cfg.family);

        info!(
            "Loading '{}' as {} on {} ({:?} precision, batch size {})",
            files.dir.display(),
            family,
            cfg.device,
            precision,
            cfg.batch_size
        );

        Ok(match family {
            ModelFamily::SpecializedEncoder => {
                Self::SpecializedEncoder(TrOcrRecognizer::load(&files, cfg)?)
            }
            ModelFamily::GeneralVision2Seq => {
                Self::GeneralVision2Seq(Vision2SeqRecognizer::load(&files, cfg)?)
            }
        })
    }

    /// The loaded family.
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::SpecializedEncoder(_) => ModelFamily::SpecializedEncoder,
            Self::GeneralVision2Seq(_) => ModelFamily::GeneralVision2Seq,
        }
    }

    fn inner(&self) -> &dyn LineRecognizer {
        match self {
            Self::SpecializedEncoder(r) => r,
            Self::GeneralVision2Seq(r) => r,
        }
    }
}

impl LineRecognizer for RecognitionBackend {
    fn recognize(&self, crops: &[LineCrop]) -> RecResult<Vec<RecognitionResult>> {
        self.inner().recognize(crops)
    }

    fn device(&self) -> &DeviceSpec {
        self.inner().device()
    }

    fn max_batch_size(&self) -> usize {
        self.inner().max_batch_size()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}
