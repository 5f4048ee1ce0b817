//! Configuration management for the recognition pipeline.
//!
//! This module provides configuration types, validation traits, and utilities
//! for the recognition backend and the surrounding pipeline stages.

pub mod backend;
pub mod errors;
pub mod onnx;
pub mod parameters;
pub mod pipeline;

pub use backend::{BackendConfig, DecodingStrategy, DeviceSpec, Precision};
pub use errors::{ConfigError, ConfigValidator};
pub use onnx::{OrtGraphOptimizationLevel, OrtSessionConfig};
pub use parameters::RecognizeParameters;
pub use pipeline::PipelineConfig;
