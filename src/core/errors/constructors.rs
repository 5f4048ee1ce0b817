//! Error constructor utilities.
//!
//! Helper functions for creating `RecError` instances with consistent context.
//!
//! ### `format_batch_error_message`
//! Creates formatted error messages for logging without wrapping in `RecError`:
//!
//! ```rust
//! use linerec::core::RecError;
//!
//! let underlying_error = std::io::Error::other("session lost");
//! let message = RecError::format_batch_error_message(
//!     "line recognition",
//!     "batch 3",
//!     &["l1".to_string(), "l2".to_string()],
//!     &underlying_error,
//! );
//! assert_eq!(
//!     message,
//!     "line recognition batch 'batch 3' failed: session lost (affected lines: [\"l1\", \"l2\"])"
//! );
//! ```

use super::types::{OpaqueError, ProcessingStage, RecError};

/// Builder for composing detailed `ModelInference` errors.
#[derive(Clone, Debug)]
pub struct ModelInferenceErrorBuilder {
    model_name: String,
    operation: String,
    batch_size: usize,
    input_shape: Vec<usize>,
    context: String,
}

impl ModelInferenceErrorBuilder {
    /// Creates a new builder with the required model metadata.
    pub fn new(model_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            operation: operation.into(),
            batch_size: 0,
            input_shape: Vec::new(),
            context: String::new(),
        }
    }

    /// Sets the number of crops in the failing batch.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Stores the input tensor shape for contextual debugging.
    pub fn input_shape(mut self, shape: &[usize]) -> Self {
        self.input_shape = shape.to_vec();
        self
    }

    /// Adds free-form context to the error message.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Consumes the builder and produces the final `RecError`.
    pub fn build(self, error: impl std::error::Error + Send + Sync + 'static) -> RecError {
        RecError::ModelInference {
            model_name: self.model_name,
            operation: self.operation,
            batch_size: self.batch_size,
            input_shape: self.input_shape,
            context: self.context,
            source: Box::new(error),
        }
    }
}

impl RecError {
    #[inline]
    fn processing_with_context(
        kind: ProcessingStage,
        context: impl Into<String>,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a RecError for normalization operations.
    pub fn normalization(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::Normalization, context, error)
    }

    /// Creates a RecError for token decoding failures.
    pub fn decoding(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::processing_with_context(ProcessingStage::Decoding, context, error)
    }

    /// Creates a RecError for a processing stage with a plain message.
    ///
    /// # Arguments
    ///
    /// * `kind` - The stage of processing where the error occurred.
    /// * `message` - The error message describing what went wrong.
    pub fn processing_message(kind: ProcessingStage, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::processing_with_context(kind, message.clone(), OpaqueError(message))
    }

    /// Creates a RecError for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a RecError for configuration errors.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Creates a RecError for a document that cannot be interpreted.
    pub fn malformed_document(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    /// Creates a RecError for an unusable compute device.
    pub fn device_unavailable(device: impl ToString, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a RecError for model load failures with contextual suggestions.
    ///
    /// # Arguments
    /// * `model_path` - Path to the model file or directory
    /// * `reason` - Short reason description
    /// * `suggestion` - Optional suggestion message (without punctuation)
    /// * `source` - Optional underlying error
    pub fn model_load_error(
        model_path: impl AsRef<std::path::Path>,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        let suggestion = suggestion
            .map(|s| format!("; suggested fix: {s}"))
            .unwrap_or_default();
        Self::ModelLoad {
            model_path: model_path.as_ref().display().to_string(),
            reason: reason.into(),
            suggestion,
            source: source.map(|e| Box::new(e) as _),
        }
    }

    /// Creates a builder for constructing model inference errors.
    pub fn model_inference_error_builder(
        model_name: impl Into<String>,
        operation: impl Into<String>,
    ) -> ModelInferenceErrorBuilder {
        ModelInferenceErrorBuilder::new(model_name, operation)
    }

    /// Creates a standardized message for batch failures, for logging.
    ///
    /// # Arguments
    ///
    /// * `stage_name` - The name of the processing stage
    /// * `batch_context` - Additional context about the batch
    /// * `affected_lines` - Identifiers of the lines in the failed batch
    /// * `error` - The underlying error
    pub fn format_batch_error_message(
        stage_name: &str,
        batch_context: &str,
        affected_lines: &[String],
        error: &dyn std::error::Error,
    ) -> String {
        format!(
            "{stage_name} batch '{batch_context}' failed: {error} (affected lines: {affected_lines:?})"
        )
    }

    /// Returns true for errors that make a backend unusable at setup time.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad { .. }
                | Self::DeviceUnavailable { .. }
                | Self::ConfigError { .. }
                | Self::Session(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_inference_builder_message() {
        let error = RecError::model_inference_error_builder("trocr-base", "encoder")
            .batch_size(4)
            .input_shape(&[4, 3, 384, 384])
            .context("session run failed")
            .build(std::io::Error::other("boom"));

        assert_eq!(
            error.to_string(),
            "model 'trocr-base' failed during encoder (batch size 4, input shape [4, 3, 384, 384]): session run failed"
        );
    }

    #[test]
    fn test_model_load_error_with_suggestion() {
        let error = RecError::model_load_error(
            "/models/missing",
            "config.json not found",
            Some("point --model at an exported model directory"),
            None::<std::io::Error>,
        );

        assert_eq!(
            error.to_string(),
            "failed to load model '/models/missing': config.json not found; suggested fix: point --model at an exported model directory"
        );
        assert!(error.is_setup_fatal());
    }

    #[test]
    fn test_per_line_errors_are_not_setup_fatal() {
        let error = RecError::processing_message(ProcessingStage::Cropping, "empty crop");
        assert!(!error.is_setup_fatal());
        assert_eq!(error.to_string(), "cropping failed: empty crop");
    }
}
