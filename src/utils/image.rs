//! Utility functions for image loading.

use crate::core::errors::RecResult;
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};

/// Converts a DynamicImage to an RgbImage.
pub fn dynamic_to_rgb(img: DynamicImage) -> RgbImage {
    img.to_rgb8()
}

/// Loads an image from a file path and converts it to RgbImage.
///
/// # Errors
///
/// Returns `RecError::ImageLoad` if the file cannot be opened or decoded.
pub fn load_image(path: &Path) -> RecResult<RgbImage> {
    let img = image::open(path)?;
    Ok(dynamic_to_rgb(img))
}

/// Resolves an image reference found inside a document.
///
/// Absolute references are returned unchanged. Relative ones are tried next to
/// the document first, then one directory up (documents often live in a
/// sibling folder of the images), and default to the document-relative path.
pub fn resolve_image_path(document_path: &Path, reference: &Path) -> PathBuf {
    if reference.is_absolute() {
        return reference.to_path_buf();
    }
    let doc_dir = document_path.parent().unwrap_or_else(|| Path::new(""));
    let beside = doc_dir.join(reference);
    if beside.exists() {
        return beside;
    }
    match doc_dir.parent() {
        Some(parent) if parent.join(reference).exists() => parent.join(reference),
        _ => beside,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_image_is_an_image_error() {
        let err = load_image(Path::new("/nonexistent/page.png")).unwrap_err();
        assert!(matches!(err, crate::core::errors::RecError::ImageLoad(_)));
    }

    #[test]
    fn test_load_roundtrips_png() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tiny.png");
        RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3])).save(&path)?;
        let img = load_image(&path)?;
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1), &image::Rgb([1, 2, 3]));
        Ok(())
    }

    #[test]
    fn test_resolve_image_path_prefers_document_dir() -> std::io::Result<()> {
        let root = tempfile::tempdir()?;
        let pages = root.path().join("PAGE");
        fs::create_dir(&pages)?;
        fs::write(root.path().join("img.png"), b"")?;
        let doc = pages.join("doc.xml");

        // Only the parent holds the image.
        assert_eq!(
            resolve_image_path(&doc, Path::new("img.png")),
            root.path().join("img.png")
        );

        fs::write(pages.join("img.png"), b"")?;
        assert_eq!(
            resolve_image_path(&doc, Path::new("img.png")),
            pages.join("img.png")
        );

        assert_eq!(
            resolve_image_path(&doc, Path::new("missing.png")),
            pages.join("missing.png")
        );
        Ok(())
    }
}
