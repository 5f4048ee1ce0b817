//! The core module of the recognition pipeline.
//!
//! This module contains the fundamental components shared by every stage:
//! - Batch scheduling
//! - Configuration management
//! - Error handling
//! - ONNX Runtime integration
//! - The model family registry
//! - The recognizer trait
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod batch;
pub mod config;
pub mod errors;
pub mod inference;
pub mod registry;
pub mod traits;

pub use batch::{Batch, BatchMetrics, BatchPolicy, BatchScheduler};
pub use config::{
    BackendConfig, ConfigError, DecodingStrategy, DeviceSpec, PipelineConfig, Precision,
    RecognizeParameters,
};
pub use errors::{ProcessingStage, RecError, RecResult};
pub use inference::{OrtSession, TensorInput, TensorOutput};
pub use registry::{ModelFamily, ModelFamilyRegistry};
pub use traits::LineRecognizer;

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence; without it, events at `default_level` and
/// above are shown. Logs go to stderr so stdout stays free for results.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
