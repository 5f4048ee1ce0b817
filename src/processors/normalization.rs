//! Pixel normalization into batched model input tensors.
//!
//! Each channel value `v` becomes `v * alpha[c] + beta[c]`, where
//! `alpha = scale / std` and `beta = -mean / std`.

use crate::core::errors::{RecError, RecResult};
use image::RgbImage;
use ndarray::Array4;
use rayon::prelude::*;

/// ImageNet channel means, as used by Swin-based encoders.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalizes RGB images into an NCHW tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeImage {
    pub alpha: [f32; 3],
    pub beta: [f32; 3],
}

impl NormalizeImage {
    /// Creates a normalizer.
    ///
    /// # Arguments
    ///
    /// * `scale` - Rescale factor applied before mean/std, defaults to `1/255`.
    /// * `mean` - Per-channel mean, defaults to ImageNet.
    /// * `std` - Per-channel standard deviation, defaults to ImageNet.
    pub fn new(scale: Option<f32>, mean: Option<&[f32]>, std: Option<&[f32]>) -> RecResult<Self> {
        let scale = scale.unwrap_or(1.0 / 255.0);
        let mean = mean.unwrap_or(&IMAGENET_MEAN);
        let std = std.unwrap_or(&IMAGENET_STD);

        if scale <= 0.0 || !scale.is_finite() {
            return Err(RecError::config_error("Scale must be greater than 0"));
        }
        if mean.len() != 3 {
            return Err(RecError::config_error(
                "Mean must have exactly 3 elements for RGB",
            ));
        }
        if std.len() != 3 {
            return Err(RecError::config_error(
                "Std must have exactly 3 elements for RGB",
            ));
        }
        for (i, &s) in std.iter().enumerate() {
            if s <= 0.0 {
                return Err(RecError::config_error(format!(
                    "Standard deviation at index {i} must be greater than 0, got {s}"
                )));
            }
        }

        let mut alpha = [0.0; 3];
        let mut beta = [0.0; 3];
        for c in 0..3 {
            alpha[c] = scale / std[c];
            beta[c] = -mean[c] / std[c];
        }
        Ok(Self { alpha, beta })
    }

    /// Maps pixels into `[-1, 1]` (mean and std of 0.5).
    pub fn symmetric() -> Self {
        Self {
            alpha: [2.0 / 255.0; 3],
            beta: [-1.0; 3],
        }
    }

    /// Builds an NCHW tensor from equally sized images.
    pub fn to_batch_tensor(&self, imgs: &[RgbImage]) -> RecResult<Array4<f32>> {
        let Some(first) = imgs.first() else {
            return Err(RecError::invalid_input("cannot normalize an empty batch"));
        };
        let (width, height) = first.dimensions();
        if let Some((i, img)) = imgs
            .iter()
            .enumerate()
            .find(|(_, img)| img.dimensions() != (width, height))
        {
            return Err(RecError::invalid_input(format!(
                "image {i} is {:?}, expected {:?}; resize crops before normalizing",
                img.dimensions(),
                (width, height)
            )));
        }

        let plane = (width * height) as usize;
        let data: Vec<f32> = imgs
            .par_iter()
            .flat_map_iter(|img| self.normalize_chw(img, plane))
            .collect();

        Array4::from_shape_vec((imgs.len(), 3, height as usize, width as usize), data)
            .map_err(|e| RecError::normalization("assembling batch tensor", e))
    }

    fn normalize_chw(&self, img: &RgbImage, plane: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; 3 * plane];
        for (i, pixel) in img.pixels().enumerate() {
            for c in 0..3 {
                out[c * plane + i] = pixel[c] as f32 * self.alpha[c] + self.beta[c];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_symmetric_range() -> RecResult<()> {
        let imgs = vec![
            RgbImage::from_pixel(2, 2, Rgb([0, 255, 0])),
            RgbImage::from_pixel(2, 2, Rgb([255, 0, 255])),
        ];
        let tensor = NormalizeImage::symmetric().to_batch_tensor(&imgs)?;
        assert_eq!(tensor.shape(), &[2, 3, 2, 2]);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 1, 1]] - 1.0).abs() < 1e-6);
        assert!((tensor[[1, 0, 1, 0]] - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_matches_mean_std_definition() -> RecResult<()> {
        let norm = NormalizeImage::new(None, Some(&[0.5, 0.5, 0.5]), Some(&[0.5, 0.5, 0.5]))?;
        let symmetric = NormalizeImage::symmetric();
        for c in 0..3 {
            assert!((norm.alpha[c] - symmetric.alpha[c]).abs() < 1e-6);
            assert!((norm.beta[c] - symmetric.beta[c]).abs() < 1e-6);
        }

        let imagenet = NormalizeImage::new(None, None, None)?;
        let tensor = imagenet.to_batch_tensor(&[RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]))])?;
        assert!((tensor[[0, 0, 0, 0]] - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        assert!((tensor[[0, 1, 0, 0]] + 0.456 / 0.224).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(NormalizeImage::new(Some(0.0), None, None).is_err());
        assert!(NormalizeImage::new(None, Some(&[0.5, 0.5]), None).is_err());
        assert!(NormalizeImage::new(None, None, Some(&[0.5, 0.0, 0.5])).is_err());
    }

    #[test]
    fn test_mismatched_sizes_are_rejected() {
        let imgs = vec![RgbImage::new(4, 4), RgbImage::new(4, 5)];
        assert!(NormalizeImage::symmetric().to_batch_tensor(&imgs).is_err());
        assert!(NormalizeImage::symmetric().to_batch_tensor(&[]).is_err());
    }
}
