//! Data structures produced by the batch scheduler.

use crate::domain::{CropSize, LineCrop, LineId};
use std::ops::Range;
use std::time::Duration;

/// Timing and volume metrics for recognition batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMetrics {
    /// Total time spent inside the backend.
    pub inference_time: Duration,
    /// Number of batches submitted.
    pub batch_count: usize,
    /// Number of crops submitted.
    pub total_crops: usize,
    /// Batches that failed and were resubmitted crop by crop.
    pub degraded_batches: usize,
}

impl BatchMetrics {
    /// Creates new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one submitted batch.
    pub fn update(&mut self, batch_size: usize, processing_time: Duration) {
        self.batch_count += 1;
        self.total_crops += batch_size;
        self.inference_time += processing_time;
    }

    /// Gets the average processing time per batch.
    pub fn average_batch_time(&self) -> Duration {
        if self.batch_count > 0 {
            self.inference_time / self.batch_count as u32
        } else {
            Duration::ZERO
        }
    }
}

/// Partition of a crop sequence into contiguous batches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchPlan {
    ranges: Vec<Range<usize>>,
}

impl BatchPlan {
    pub(crate) fn new(ranges: Vec<Range<usize>>) -> Self {
        Self { ranges }
    }

    /// Index ranges into the planned crop sequence, in order.
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Number of crops in each batch.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.len()).collect()
    }

    /// Number of batches.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if the plan holds no batch.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// An ordered group of crops submitted to the backend together.
#[derive(Debug, Clone)]
pub struct Batch {
    index: usize,
    crops: Vec<LineCrop>,
}

impl Batch {
    pub(crate) fn new(index: usize, crops: Vec<LineCrop>) -> Self {
        Self { index, crops }
    }

    /// Position of this batch in the document's batch sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Crops in submission order.
    pub fn crops(&self) -> &[LineCrop] {
        &self.crops
    }

    /// Line identities in submission order.
    pub fn line_ids(&self) -> Vec<&LineId> {
        self.crops.iter().map(|c| c.line_id()).collect()
    }

    /// Number of crops.
    pub fn len(&self) -> usize {
        self.crops.len()
    }

    /// Returns true if the batch holds no crop.
    pub fn is_empty(&self) -> bool {
        self.crops.is_empty()
    }

    /// Pixel area of the padded tensor this batch becomes.
    pub fn padded_area(&self) -> u64 {
        padded_area(self.crops.iter().map(|c| c.size()))
    }
}

/// `count * max_width * max_height` over `sizes`.
pub fn padded_area(sizes: impl IntoIterator<Item = CropSize>) -> u64 {
    let (count, width, height) = sizes
        .into_iter()
        .fold((0u64, 0u32, 0u32), |(n, w, h), s| {
            (n + 1, w.max(s.width), h.max(s.height))
        });
    count * u64::from(width) * u64::from(height)
}
