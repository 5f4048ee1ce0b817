//! Error types for the recognition pipeline.
//!
//! # Usage
//!
//! ```rust
//! use linerec::core::errors::{ProcessingStage, RecError};
//!
//! let config_error = RecError::config_error("Missing required model path");
//! let crop_error = RecError::processing_message(ProcessingStage::Cropping, "crop is empty");
//! assert!(config_error.is_setup_fatal());
//! assert!(!crop_error.is_setup_fatal());
//! ```

pub mod constructors;
pub mod types;

pub use constructors::ModelInferenceErrorBuilder;
pub use types::{OpaqueError, ProcessingStage, RecError};

/// Convenient result alias for recognition operations.
pub type RecResult<T> = Result<T, RecError>;
