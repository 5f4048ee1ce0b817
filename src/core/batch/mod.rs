//! Batch scheduling for line recognition.
//!
//! Crops are grouped into contiguous, order-preserving batches under a count
//! limit and an optional pixel-area budget measured on the padded batch tensor.
//!
//! # Example
//!
//! ```rust
//! use linerec::core::batch::{BatchPolicy, BatchScheduler};
//! use linerec::domain::CropSize;
//!
//! let scheduler = BatchScheduler::new(BatchPolicy::new(4)).unwrap();
//! let sizes = vec![CropSize::new(200, 32); 10];
//! assert_eq!(scheduler.plan(&sizes).batch_sizes(), vec![4, 4, 2]);
//! ```

mod config;
mod scheduler;
mod types;

pub use config::BatchPolicy;
pub use scheduler::BatchScheduler;
pub use types::{Batch, BatchMetrics, BatchPlan, padded_area};
