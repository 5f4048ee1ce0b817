//! Configuration of the extraction and scheduling stages.

use super::errors::{ConfigError, ConfigValidator};
use serde::{Deserialize, Serialize};

/// Options for line extraction, batch scheduling and document prefetching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pixel budget per batch, measured on the padded batch tensor
    /// (`count * max_width * max_height`). `None` disables the area budget.
    #[serde(default)]
    pub max_batch_area: Option<u64>,
    /// Extra pixels added around each line's bounding box before clipping.
    #[serde(default)]
    pub crop_margin: u32,
    /// Fill pixels outside non-rectangular line outlines with `background`.
    #[serde(default = "default_mask_polygon")]
    pub mask_polygon: bool,
    /// Fill colour for masked pixels.
    #[serde(default = "default_background")]
    pub background: [u8; 3],
    /// Crops narrower or shorter than this are skipped.
    #[serde(default = "default_min_crop_size")]
    pub min_crop_size: u32,
    /// Number of extracted documents that may wait for recognition.
    #[serde(default = "default_prefetch_depth")]
    pub prefetch_depth: usize,
}

fn default_mask_polygon() -> bool {
    true
}

fn default_background() -> [u8; 3] {
    [255, 255, 255]
}

fn default_min_crop_size() -> u32 {
    2
}

fn default_prefetch_depth() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_area: None,
            crop_margin: 0,
            mask_polygon: default_mask_polygon(),
            background: default_background(),
            min_crop_size: default_min_crop_size(),
            prefetch_depth: default_prefetch_depth(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-batch pixel budget.
    pub fn with_max_batch_area(mut self, area: u64) -> Self {
        self.max_batch_area = Some(area);
        self
    }

    /// Sets the crop margin.
    pub fn with_crop_margin(mut self, margin: u32) -> Self {
        self.crop_margin = margin;
        self
    }

    /// Enables or disables polygon masking.
    pub fn with_mask_polygon(mut self, enabled: bool) -> Self {
        self.mask_polygon = enabled;
        self
    }

    /// Sets the fill colour for masked pixels.
    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = background;
        self
    }

    /// Sets the minimum crop side length.
    pub fn with_min_crop_size(mut self, size: u32) -> Self {
        self.min_crop_size = size;
        self
    }

    /// Sets the prefetch depth.
    pub fn with_prefetch_depth(mut self, depth: usize) -> Self {
        self.prefetch_depth = depth;
        self
    }
}

impl ConfigValidator for PipelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_area == Some(0) {
            return Err(ConfigError::InvalidConfig {
                message: "max_batch_area must be greater than 0 when set".to_string(),
            });
        }
        if self.min_crop_size == 0 {
            return Err(ConfigError::InvalidConfig {
                message: "min_crop_size must be at least 1".to_string(),
            });
        }
        self.validate_positive_usize(self.prefetch_depth, "prefetch_depth")
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_batch_area, None);
        assert_eq!(config.min_crop_size, 2);
        assert_eq!(config.prefetch_depth, 1);
        assert!(config.mask_polygon);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<(), serde_json::Error> {
        let config: PipelineConfig = serde_json::from_str(r#"{"crop_margin": 3}"#)?;
        assert_eq!(config.crop_margin, 3);
        assert_eq!(config.background, [255, 255, 255]);
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        assert!(PipelineConfig::new().with_max_batch_area(0).validate().is_err());
        assert!(PipelineConfig::new().with_prefetch_depth(0).validate().is_err());
        assert!(PipelineConfig::new().with_min_crop_size(0).validate().is_err());
    }
}
