//! Utility functions for the recognition pipeline.

pub mod image;

pub use image::{dynamic_to_rgb, load_image, resolve_image_path};
