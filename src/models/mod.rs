//! Recognition models.
//!
//! Each backend runs ONNX encoder-decoder graphs through ONNX Runtime and
//! implements [`LineRecognizer`](crate::core::traits::LineRecognizer).

pub mod recognition;

pub use recognition::{RecognitionBackend, TrOcrRecognizer, Vision2SeqRecognizer};
