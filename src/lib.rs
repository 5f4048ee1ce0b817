//! # linerec
//!
//! Batched text line recognition for page layouts, using ONNX encoder-decoder
//! models such as TrOCR.
//!
//! A layout document lists regions and their text lines as polygons on a page
//! image. linerec crops every line, groups the crops into batches, runs them
//! through a recognition model and writes the text back onto the lines.
//!
//! ## Features
//!
//! - Lazy, restartable line extraction with polygon masking
//! - Deterministic batching under count and pixel-area budgets
//! - Two model families behind one interface: specialized line encoders
//!   (TrOCR) and general vision-to-sequence models (Donut, Nougat)
//! - Greedy, beam search and seeded sampling decoding with confidence scores
//! - Per-line failure isolation: one bad line never aborts a page
//! - PAGE-XML input and output that preserves everything but line text
//!
//! ## Modules
//!
//! * [`core`] - Configuration, errors, batch scheduling and ONNX Runtime sessions
//! * [`domain`] - Layout documents, line crops and recognition results
//! * [`models`] - Recognition backends
//! * [`page`] - PAGE-XML reading and writing
//! * [`pipeline`] - Extraction, orchestration, prefetching and result writing
//! * [`processors`] - Geometry, resizing and normalization
//! * [`utils`] - Image loading helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linerec::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = RecognitionBackend::load(&BackendConfig::new("models/trocr-base-handwritten"))?;
//! let orchestrator = Orchestrator::new(PipelineConfig::default())?;
//!
//! let mut page = read_page(Path::new("page.xml"))?;
//! let image = load_image(&page.image_path().ok_or("page has no image")?)?;
//! let report = orchestrator.process(&backend, page.layout_mut(), &image);
//! println!("{report}");
//! page.write(Path::new("page.out.xml"))?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod models;
pub mod page;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use linerec::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        BackendConfig, DecodingStrategy, DeviceSpec, LineRecognizer, PipelineConfig, Precision,
        RecError, RecResult, RecognizeParameters,
    };
    pub use crate::domain::{LayoutDocument, LineCrop, LineId, RecognitionResult};
    pub use crate::models::RecognitionBackend;
    pub use crate::page::{PageDocument, read_page, write_page};
    pub use crate::pipeline::{CancellationToken, Orchestrator, PipelineState, RunReport};
    pub use crate::utils::load_image;
}
