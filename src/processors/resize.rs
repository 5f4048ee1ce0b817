//! Resizing of line crops to model input geometry.

use image::imageops::{FilterType, overlay, resize};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// How a crop is mapped onto the model's input canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Stretch to the target size, ignoring aspect ratio.
    Exact,
    /// Scale to fit inside the target, then center on a padded canvas.
    AspectPad,
}

/// Resizes crops to a fixed model input size.
#[derive(Debug, Clone, Copy)]
pub struct LineResizer {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
    pub filter: FilterType,
    /// Canvas colour for [`ResizeMode::AspectPad`].
    pub fill: [u8; 3],
}

impl LineResizer {
    /// Creates a resizer using bilinear filtering and a black canvas.
    pub fn new(width: u32, height: u32, mode: ResizeMode) -> Self {
        Self {
            width,
            height,
            mode,
            filter: FilterType::Triangle,
            fill: [0, 0, 0],
        }
    }

    /// Sets the interpolation filter.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Resizes a single crop.
    pub fn apply(&self, img: &RgbImage) -> RgbImage {
        match self.mode {
            ResizeMode::Exact => resize(img, self.width, self.height, self.filter),
            ResizeMode::AspectPad => self.resize_and_pad(img),
        }
    }

    fn resize_and_pad(&self, img: &RgbImage) -> RgbImage {
        let (target_width, target_height) = (self.width, self.height);
        let (img_width, img_height) = img.dimensions();
        let mut padded = RgbImage::from_pixel(target_width, target_height, Rgb(self.fill));

        if img_width == 0 || img_height == 0 {
            return padded;
        }

        let scale = (target_width as f32 / img_width as f32)
            .min(target_height as f32 / img_height as f32);
        let new_width = ((img_width as f32 * scale).round() as u32).clamp(1, target_width);
        let new_height = ((img_height as f32 * scale).round() as u32).clamp(1, target_height);

        let resized = resize(img, new_width, new_height, self.filter);
        let pad_left = (target_width - new_width) / 2;
        let pad_top = (target_height - new_height) / 2;
        overlay(&mut padded, &resized, pad_left as i64, pad_top as i64);
        padded
    }
}

/// Maps a PIL-style `resample` code onto an `image` filter.
///
/// Unknown codes fall back to bilinear.
pub fn filter_from_resample(code: u32) -> FilterType {
    match code {
        0 => FilterType::Nearest,
        1 => FilterType::Lanczos3,
        3 => FilterType::CatmullRom,
        _ => FilterType::Triangle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_resize_ignores_aspect() {
        let img = RgbImage::from_pixel(200, 20, Rgb([10, 20, 30]));
        let out = LineResizer::new(64, 64, ResizeMode::Exact).apply(&img);
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(out.get_pixel(32, 32), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_aspect_pad_centers_content() {
        let img = RgbImage::from_pixel(100, 20, Rgb([200, 200, 200]));
        let out = LineResizer::new(50, 50, ResizeMode::AspectPad)
            .with_filter(FilterType::Nearest)
            .apply(&img);
        assert_eq!(out.dimensions(), (50, 50));
        // 100x20 scaled by 0.5 is 50x10, placed at rows 20..30.
        assert_eq!(out.get_pixel(25, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(25, 25), &Rgb([200, 200, 200]));
        assert_eq!(out.get_pixel(25, 49), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_resample_codes() {
        assert_eq!(filter_from_resample(0), FilterType::Nearest);
        assert_eq!(filter_from_resample(2), FilterType::Triangle);
        assert_eq!(filter_from_resample(3), FilterType::CatmullRom);
        assert_eq!(filter_from_resample(42), FilterType::Triangle);
    }
}
