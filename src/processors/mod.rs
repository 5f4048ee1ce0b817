//! Image processing utilities for line recognition.
//!
//! # Modules
//!
//! * `geometry` - Polygons, bounding boxes and clipping for line outlines
//! * `normalization` - Pixel normalization into NCHW tensors
//! * `resize` - Fixed and aspect-preserving resizing to model input size

pub mod geometry;
mod normalization;
mod resize;

pub use geometry::*;
pub use normalization::*;
pub use resize::*;
