//! Greedy, order-preserving batch scheduler.

use super::config::BatchPolicy;
use super::types::{Batch, BatchPlan};
use crate::core::config::ConfigValidator;
use crate::core::errors::RecResult;
use crate::domain::{CropSize, LineCrop};
use tracing::debug;

/// Groups crops into batches under a count limit and an optional area budget.
///
/// Batches are contiguous runs of the input sequence. A batch is closed as soon
/// as adding the next crop would break either limit. A crop that exceeds the
/// area budget on its own becomes a singleton batch. The partition depends only
/// on the crop sizes and the policy.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    policy: BatchPolicy,
}

impl BatchScheduler {
    /// Creates a scheduler after validating the policy.
    pub fn new(policy: BatchPolicy) -> RecResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// The active policy.
    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    /// Plans batches for crops of the given sizes.
    pub fn plan(&self, sizes: &[CropSize]) -> BatchPlan {
        let mut ranges = Vec::new();
        let mut start = 0usize;
        let mut max_width = 0u32;
        let mut max_height = 0u32;

        for (i, size) in sizes.iter().enumerate() {
            let count = (i - start) as u64;
            let width = max_width.max(size.width);
            let height = max_height.max(size.height);

            let fits_count = count < self.policy.max_batch_size as u64;
            let fits_area = self
                .policy
                .max_batch_area
                .is_none_or(|budget| (count + 1) * u64::from(width) * u64::from(height) <= budget);

            if count > 0 && !(fits_count && fits_area) {
                ranges.push(start..i);
                start = i;
                max_width = size.width;
                max_height = size.height;
            } else {
                max_width = width;
                max_height = height;
            }
        }
        if start < sizes.len() {
            ranges.push(start..sizes.len());
        }

        debug!(
            "Planned {} batches for {} crops (max size {}, area budget {:?})",
            ranges.len(),
            sizes.len(),
            self.policy.max_batch_size,
            self.policy.max_batch_area
        );
        BatchPlan::new(ranges)
    }

    /// Partitions crops into batches, preserving their order.
    pub fn partition(&self, crops: Vec<LineCrop>) -> Vec<Batch> {
        let sizes: Vec<CropSize> = crops.iter().map(|c| c.size()).collect();
        let plan = self.plan(&sizes);

        let mut crops = crops.into_iter();
        plan.ranges()
            .iter()
            .enumerate()
            .map(|(index, range)| Batch::new(index, crops.by_ref().take(range.len()).collect()))
            .collect()
    }
}
