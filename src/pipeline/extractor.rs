//! Line image extraction.
//!
//! [`LineExtractor::crops`] returns a [`CropSequence`] that walks the document
//! in region order, then line order, and yields one outcome per line. Nothing
//! is cropped until the sequence is iterated, and every call to
//! [`CropSequence::iter`] starts again from the first line.

use crate::core::config::PipelineConfig;
use crate::domain::{Diagnostic, DiagnosticKind, LayoutDocument, LineCrop, Region, TextLine};
use crate::processors::{PixelRect, Polygon};
use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_polygon_mut;
use imageproc::morphology::dilate_mut;
use imageproc::point::Point as ImageProcPoint;
use tracing::debug;

/// A line that could not be turned into a crop.
pub type LineFailure = Diagnostic;

/// Crops line images out of a page image.
#[derive(Debug, Clone)]
pub struct LineExtractor {
    margin: u32,
    mask_polygon: bool,
    background: Rgb<u8>,
    min_crop_size: u32,
}

impl LineExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            margin: config.crop_margin,
            mask_polygon: config.mask_polygon,
            background: Rgb(config.background),
            min_crop_size: config.min_crop_size,
        }
    }

    /// Lazy crops of every line in `doc`, taken from `image`.
    pub fn crops<'a>(&'a self, doc: &'a LayoutDocument, image: &'a RgbImage) -> CropSequence<'a> {
        CropSequence {
            extractor: self,
            doc,
            image,
        }
    }

    /// Crops a single line.
    pub fn extract_line(
        &self,
        region: &Region,
        line: &TextLine,
        image: &RgbImage,
    ) -> Result<LineCrop, LineFailure> {
        let failure = |kind: DiagnosticKind, message: String| {
            Diagnostic::new(line.id().clone(), region.id().clone(), kind, message)
        };

        let outline = line.outline();
        if !outline.is_valid() {
            return Err(failure(
                DiagnosticKind::DegenerateGeometry,
                format!(
                    "outline with {} points and area {:.1} cannot be cropped",
                    outline.len(),
                    outline.area()
                ),
            ));
        }

        let (width, height) = image.dimensions();
        let rect = outline
            .clipped_bbox(self.margin, width, height)
            .ok_or_else(|| {
                failure(
                    DiagnosticKind::OutOfBounds,
                    format!("outline lies outside the {width}x{height} page image"),
                )
            })?;

        if rect.width < self.min_crop_size || rect.height < self.min_crop_size {
            return Err(failure(
                DiagnosticKind::TooSmall,
                format!(
                    "crop of {}x{} is below the minimum size of {} px",
                    rect.width, rect.height, self.min_crop_size
                ),
            ));
        }

        let mut crop = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
        if self.mask_polygon && !outline.is_axis_aligned_rect() {
            self.mask_outside(&mut crop, outline, rect);
        }

        Ok(LineCrop::new(
            line.id().clone(),
            region.id().clone(),
            crop,
            rect,
        ))
    }

    /// Fills pixels outside the outline with the background colour.
    ///
    /// The outline mask is dilated by the crop margin so the margin also
    /// applies around slanted or curved lines.
    fn mask_outside(&self, crop: &mut RgbImage, outline: &Polygon, rect: PixelRect) {
        let local = outline.translated(-(rect.x as f32), -(rect.y as f32));
        let mut points: Vec<ImageProcPoint<i32>> = Vec::new();
        for p in local.deduplicated() {
            let p = p.to_imageproc_point();
            if points.last() != Some(&p) {
                points.push(p);
            }
        }
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            debug!("outline collapses after rounding, leaving crop unmasked");
            return;
        }

        let mut mask = GrayImage::new(crop.width(), crop.height());
        draw_polygon_mut(&mut mask, &points, Luma([255u8]));
        if self.margin > 0 {
            dilate_mut(&mut mask, Norm::LInf, self.margin.min(255) as u8);
        }

        for (x, y, pixel) in crop.enumerate_pixels_mut() {
            if mask.get_pixel(x, y)[0] == 0 {
                *pixel = self.background;
            }
        }
    }
}

/// A restartable, document-ordered sequence of line crops.
#[derive(Debug, Clone, Copy)]
pub struct CropSequence<'a> {
    extractor: &'a LineExtractor,
    doc: &'a LayoutDocument,
    image: &'a RgbImage,
}

impl<'a> CropSequence<'a> {
    /// Iterates from the first line of the document.
    pub fn iter(&self) -> impl Iterator<Item = Result<LineCrop, LineFailure>> + 'a {
        let extractor = self.extractor;
        let image = self.image;
        self.doc
            .lines()
            .map(move |(region, line)| extractor.extract_line(region, line, image))
    }

    /// Number of outcomes one pass yields.
    pub fn len(&self) -> usize {
        self.doc.line_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &CropSequence<'a> {
    type Item = Result<LineCrop, LineFailure>;
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
