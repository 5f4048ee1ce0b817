//! Extracted line images.

use super::document::{LineId, RegionId};
use crate::processors::geometry::PixelRect;
use image::RgbImage;

/// A cropped line image with back-references to its source line.
///
/// Crops are immutable once created.
#[derive(Debug, Clone)]
pub struct LineCrop {
    line_id: LineId,
    region_id: RegionId,
    image: RgbImage,
    placement: PixelRect,
}

impl LineCrop {
    /// Creates a crop.
    pub fn new(line_id: LineId, region_id: RegionId, image: RgbImage, placement: PixelRect) -> Self {
        Self {
            line_id,
            region_id,
            image,
            placement,
        }
    }

    /// Identity of the source line.
    pub fn line_id(&self) -> &LineId {
        &self.line_id
    }

    /// Identity of the region holding the source line.
    pub fn region_id(&self) -> &RegionId {
        &self.region_id
    }

    /// The cropped pixels.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Position of the crop on the page.
    pub fn placement(&self) -> PixelRect {
        self.placement
    }

    /// Width and height in pixels.
    pub fn size(&self) -> CropSize {
        CropSize {
            width: self.image.width(),
            height: self.image.height(),
        }
    }
}

/// Dimensions of a crop, as seen by the batch scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropSize {
    /// Creates a size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}
