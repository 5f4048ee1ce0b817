//! Domain types: layout documents, line crops and recognition results.

pub mod crop;
pub mod document;
pub mod result;

pub use crop::{CropSize, LineCrop};
pub use document::{LayoutDocument, LineId, Region, RegionId, TextAnnotation, TextLine};
pub use result::{Diagnostic, DiagnosticKind, RecognitionResult};
