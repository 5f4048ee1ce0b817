//! Batch budget configuration.

use crate::core::config::{ConfigError, ConfigValidator};
use serde::{Deserialize, Serialize};

/// Limits applied when grouping crops into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// Maximum number of crops per batch.
    pub max_batch_size: usize,
    /// Maximum padded pixel area per batch (`count * max_width * max_height`).
    pub max_batch_area: Option<u64>,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: crate::core::config::backend::DEFAULT_BATCH_SIZE,
            max_batch_area: None,
        }
    }
}

impl BatchPolicy {
    /// Creates a policy with a count limit and no area budget.
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            max_batch_area: None,
        }
    }

    /// Sets the area budget.
    pub fn with_max_batch_area(mut self, area: Option<u64>) -> Self {
        self.max_batch_area = area;
        self
    }
}

impl ConfigValidator for BatchPolicy {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_batch_size(self.max_batch_size)?;
        if self.max_batch_area == Some(0) {
            return Err(ConfigError::InvalidConfig {
                message: "max_batch_area must be greater than 0 when set".to_string(),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}
