//! ONNX Runtime integration.
//!
//! [`OrtSession`] wraps a single graph and exchanges tensors by input and
//! output name, which is what the encoder/decoder backends need.

pub mod session;
pub mod tensor;

pub use session::{OrtSession, probe_device};
pub use tensor::{TensorInput, TensorOutput, to_f16};
