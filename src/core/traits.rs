//! Capability traits shared across the pipeline.

use crate::core::config::DeviceSpec;
use crate::core::errors::RecResult;
use crate::domain::{LineCrop, RecognitionResult};

/// A recognition backend as seen by the pipeline.
///
/// Implementations return exactly one result per input crop, in input order,
/// each carrying the crop's line identity. An `Err` means the whole batch
/// failed; callers decide how to degrade.
pub trait LineRecognizer: Send + Sync {
    /// Recognizes a batch of line crops.
    fn recognize(&self, crops: &[LineCrop]) -> RecResult<Vec<RecognitionResult>>;

    /// Device the backend runs on.
    fn device(&self) -> &DeviceSpec;

    /// Largest batch the backend accepts.
    fn max_batch_size(&self) -> usize;

    /// Name used in logs and diagnostics.
    fn name(&self) -> &str {
        "recognizer"
    }
}

impl<T: LineRecognizer + ?Sized> LineRecognizer for Box<T> {
    fn recognize(&self, crops: &[LineCrop]) -> RecResult<Vec<RecognitionResult>> {
        (**self).recognize(crops)
    }

    fn device(&self) -> &DeviceSpec {
        (**self).device()
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
