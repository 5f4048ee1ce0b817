//! Error types for the line recognition pipeline.
//!
//! This module defines the errors that can occur while loading layout
//! documents, extracting line crops, running recognition models and writing
//! results back. Setup-time failures (model or device unavailable, malformed
//! documents) are distinguished from per-line failures, which never surface
//! as `RecError` at the document level.

use thiserror::Error;

/// Stage of processing in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred during image normalization.
    Normalization,
    /// Error occurred during image resizing.
    Resize,
    /// Error occurred while cropping a line image.
    Cropping,
    /// Error occurred during batch processing.
    BatchProcessing,
    /// Error occurred while decoding generated tokens.
    Decoding,
    /// Error occurred while writing results into a document.
    Writing,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::Cropping => write!(f, "cropping"),
            ProcessingStage::BatchProcessing => write!(f, "batch processing"),
            ProcessingStage::Decoding => write!(f, "decoding"),
            ProcessingStage::Writing => write!(f, "writing"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// A plain error message usable as an error source.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct OpaqueError(pub String);

/// Errors produced by the recognition pipeline.
#[derive(Error, Debug)]
pub enum RecError {
    /// Error occurred while loading an image.
    #[error("image load: {0}")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A model could not be loaded.
    #[error("failed to load model '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path or identifier of the model.
        model_path: String,
        /// Short reason description.
        reason: String,
        /// Formatted suggestion, empty when none applies.
        suggestion: String,
        /// The underlying error, when there is one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The configured compute device cannot be used.
    #[error("device '{device}' is unavailable: {reason}")]
    DeviceUnavailable {
        /// The requested device.
        device: String,
        /// Why the device cannot be used.
        reason: String,
    },

    /// Inference failed inside a model.
    #[error(
        "model '{model_name}' failed during {operation} (batch size {batch_size}, input shape {input_shape:?}): {context}"
    )]
    ModelInference {
        /// Name of the model.
        model_name: String,
        /// Operation that failed (e.g. "encoder", "decoder_step").
        operation: String,
        /// Number of crops in the failing batch.
        batch_size: usize,
        /// Shape of the primary input tensor.
        input_shape: Vec<usize>,
        /// Additional context.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// The layout document cannot be interpreted.
    #[error("malformed document: {message}")]
    MalformedDocument {
        /// A message describing what is wrong with the document.
        message: String,
    },

    /// Processing was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor operations.
    #[error("tensor operation: {0}")]
    Tensor(#[from] ndarray::ShapeError),

    /// Error from the XML reader or writer.
    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Error while parsing JSON configuration.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl RecError {
    /// The error message followed by every source that adds to it.
    ///
    /// Sources whose text already appears in the message are skipped.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }
}

impl From<image::ImageError> for RecError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for RecError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for RecError {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(quick_xml::Error::InvalidAttr(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_message_includes_inference_source() {
        let error = RecError::ModelInference {
            model_name: "trocr".to_string(),
            operation: "decoder_step".to_string(),
            batch_size: 2,
            input_shape: vec![2, 3, 384, 384],
            context: "step 4".to_string(),
            source: Box::new(OpaqueError("Got invalid dimensions for input".to_string())),
        };
        let message = error.chain_message();
        assert!(message.starts_with("model 'trocr' failed during decoder_step"));
        assert!(message.ends_with(": Got invalid dimensions for input"));
    }

    #[test]
    fn test_wrapped_errors_show_their_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "scan.png not found");
        let error = RecError::from(io);
        assert_eq!(error.to_string(), "io: scan.png not found");
        assert_eq!(error.chain_message(), "io: scan.png not found");
    }
}
