//! The line recognition pipeline.
//!
//! A document moves through `Loaded -> Extracting -> Batching -> Recognizing
//! -> Writing -> Done`, or ends in `Errored`. The [`Orchestrator`] drives one
//! document at a time. [`PrefetchRunner`] overlaps loading and cropping of the
//! next document with recognition of the current one.

pub mod cancel;
pub mod extractor;
pub mod orchestrator;
pub mod prefetch;
pub mod report;
pub mod state;
pub mod writer;

pub use cancel::CancellationToken;
pub use extractor::{CropSequence, LineExtractor, LineFailure};
pub use orchestrator::Orchestrator;
pub use prefetch::{PrefetchRunner, Prepared};
pub use report::{RunReport, RunSummary};
pub use state::{ErrorReason, PipelineState, StateMachine};
pub use writer::{ResultWriter, WriteSummary};
