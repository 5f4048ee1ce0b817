//! Specialized line-image encoder-decoder (TrOCR-style).
//!
//! Crops are stretched to the processor's fixed input size and normalized to
//! `[-1, 1]` unless the processor config says otherwise.

use super::encoder_decoder::EncoderDecoder;
use super::model_files::{ModelFiles, ProcessorSize};
use crate::core::config::{BackendConfig, DeviceSpec};
use crate::core::errors::RecResult;
use crate::core::traits::LineRecognizer;
use crate::domain::{LineCrop, RecognitionResult};
use crate::processors::{LineResizer, NormalizeImage, ResizeMode, filter_from_resample};

const DEFAULT_SIZE: ProcessorSize = ProcessorSize::Square(384);
const DEFAULT_MEAN: [f32; 3] = [0.5; 3];
const DEFAULT_STD: [f32; 3] = [0.5; 3];
/// PIL bilinear.
const DEFAULT_RESAMPLE: u32 = 2;

/// TrOCR-style recognizer.
#[derive(Debug)]
pub struct TrOcrRecognizer {
    model: EncoderDecoder,
    resizer: LineResizer,
    normalizer: NormalizeImage,
    device: DeviceSpec,
    max_batch_size: usize,
}

impl TrOcrRecognizer {
    /// Loads the recognizer from resolved model files.
    pub fn load(files: &ModelFiles, cfg: &BackendConfig) -> RecResult<Self> {
        let model = EncoderDecoder::load(files, cfg)?;
        let processor = &files.processor;

        let (width, height) = processor.size.unwrap_or(DEFAULT_SIZE).dimensions();
        let resizer = LineResizer::new(width, height, ResizeMode::Exact).with_filter(
            filter_from_resample(processor.resample.unwrap_or(DEFAULT_RESAMPLE)),
        );
        let (mean, std) = processor.statistics(&DEFAULT_MEAN, &DEFAULT_STD);
        let normalizer = NormalizeImage::new(Some(processor.scale()), Some(mean), Some(std))?;

        Ok(Self {
            model,
            resizer,
            normalizer,
            device: cfg.device,
            max_batch_size: cfg.batch_size,
        })
    }
}

impl LineRecognizer for TrOcrRecognizer {
    fn recognize(&self, crops: &[LineCrop]) -> RecResult<Vec<RecognitionResult>> {
        self.model
            .recognize_crops(crops, &self.resizer, &self.normalizer)
    }

    fn device(&self) -> &DeviceSpec {
        &self.device
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn name(&self) -> &str {
        self.model.model_name()
    }
}
