//! General vision-to-sequence recognizer (Donut/Nougat-style).
//!
//! Crops keep their aspect ratio and are centered on a zero-filled canvas of
//! the processor's size. An optional task prompt is forced after the decoder
//! start token and removed from the output.

use super::encoder_decoder::EncoderDecoder;
use super::model_files::{ModelFiles, ProcessorSize};
use crate::core::config::{BackendConfig, DeviceSpec};
use crate::core::errors::RecResult;
use crate::core::traits::LineRecognizer;
use crate::domain::{LineCrop, RecognitionResult};
use crate::processors::{
    IMAGENET_MEAN, IMAGENET_STD, LineResizer, NormalizeImage, ResizeMode, filter_from_resample,
};
use tracing::debug;

const DEFAULT_SIZE: ProcessorSize = ProcessorSize::Square(384);
const DEFAULT_RESAMPLE: u32 = 2;

/// Generic encoder-decoder recognizer.
#[derive(Debug)]
pub struct Vision2SeqRecognizer {
    model: EncoderDecoder,
    resizer: LineResizer,
    normalizer: NormalizeImage,
    device: DeviceSpec,
    max_batch_size: usize,
}

impl Vision2SeqRecognizer {
    /// Loads the recognizer from resolved model files.
    pub fn load(files: &ModelFiles, cfg: &BackendConfig) -> RecResult<Self> {
        let mut model = EncoderDecoder::load(files, cfg)?;
        if let Some(prompt) = cfg.prompt.as_deref().filter(|p| !p.is_empty()) {
            let ids = model.encode_prompt(prompt)?;
            debug!("Task prompt {:?} encodes to {:?}", prompt, ids);
            model.set_prompt(ids);
        }

        let processor = &files.processor;
        let (width, height) = processor.size.unwrap_or(DEFAULT_SIZE).dimensions();
        let resizer = LineResizer::new(width, height, ResizeMode::AspectPad).with_filter(
            filter_from_resample(processor.resample.unwrap_or(DEFAULT_RESAMPLE)),
        );
        let (mean, std) = processor.statistics(&IMAGENET_MEAN, &IMAGENET_STD);
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

impl LineRecognizer for Vision2SeqRecognizer {
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
