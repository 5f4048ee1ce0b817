//! Layout document model.
//!
//! A [`LayoutDocument`] holds regions in document order, each with its text
//! lines in reading order. Lines are addressed by their [`LineId`], which is
//! stable across the whole pipeline. Line annotations are only replaced through
//! the result writer.

use crate::processors::geometry::Polygon;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identity of a text line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(String);

impl LineId {
    /// Creates a line identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Stable identity of a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(String);

impl RegionId {
    /// Creates a region identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Recognized text attached to a line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    /// The recognized text.
    pub text: String,
    /// Confidence in [0, 1], when known.
    pub confidence: Option<f32>,
}

impl TextAnnotation {
    /// Creates an annotation.
    pub fn new(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A text line with its outline and optional annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    id: LineId,
    outline: Polygon,
    annotation: Option<TextAnnotation>,
}

impl TextLine {
    /// Creates a line without annotation.
    pub fn new(id: impl Into<LineId>, outline: Polygon) -> Self {
        Self {
            id: id.into(),
            outline,
            annotation: None,
        }
    }

    /// Attaches an existing annotation, as read from a stored document.
    pub fn with_annotation(mut self, annotation: TextAnnotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// The line identity.
    pub fn id(&self) -> &LineId {
        &self.id
    }

    /// The line outline in page coordinates.
    pub fn outline(&self) -> &Polygon {
        &self.outline
    }

    /// The current annotation.
    pub fn annotation(&self) -> Option<&TextAnnotation> {
        self.annotation.as_ref()
    }

    pub(crate) fn set_annotation(&mut self, annotation: TextAnnotation) {
        self.annotation = Some(annotation);
    }
}

impl From<String> for LineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A region holding text lines in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    id: RegionId,
    lines: Vec<TextLine>,
}

impl Region {
    /// Creates a region.
    pub fn new(id: impl Into<RegionId>, lines: Vec<TextLine>) -> Self {
        Self {
            id: id.into(),
            lines,
        }
    }

    /// The region identity.
    pub fn id(&self) -> &RegionId {
        &self.id
    }

    /// Lines in reading order.
    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }
}

impl From<String> for RegionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A page layout with regions and lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDocument {
    id: String,
    image_ref: Option<PathBuf>,
    regions: Vec<Region>,
    index: HashMap<LineId, (usize, usize)>,
}

impl LayoutDocument {
    /// Creates a document from regions in document order.
    ///
    /// Fails with the offending identifier when two lines share an id.
    pub fn new(id: impl Into<String>, regions: Vec<Region>) -> Result<Self, LineId> {
        let mut index = HashMap::new();
        for (r, region) in regions.iter().enumerate() {
            for (l, line) in region.lines.iter().enumerate() {
                if index.insert(line.id.clone(), (r, l)).is_some() {
                    return Err(line.id.clone());
                }
            }
        }
        Ok(Self {
            id: id.into(),
            image_ref: None,
            regions,
            index,
        })
    }

    /// Sets the page image reference.
    pub fn with_image_ref(mut self, image_ref: impl Into<PathBuf>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// Document identifier used in logs and reports.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reference to the page image, as stored in the document.
    pub fn image_ref(&self) -> Option<&Path> {
        self.image_ref.as_deref()
    }

    /// Regions in document order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// All lines in document order.
    pub fn lines(&self) -> impl Iterator<Item = (&Region, &TextLine)> {
        self.regions
            .iter()
            .flat_map(|region| region.lines.iter().map(move |line| (region, line)))
    }

    /// Total number of lines.
    pub fn line_count(&self) -> usize {
        self.index.len()
    }

    /// Looks up a line by identity.
    pub fn line(&self, id: &LineId) -> Option<&TextLine> {
        let &(r, l) = self.index.get(id)?;
        self.regions.get(r)?.lines.get(l)
    }

    pub(crate) fn line_mut(&mut self, id: &LineId) -> Option<&mut TextLine> {
        let &(r, l) = self.index.get(id)?;
        self.regions.get_mut(r)?.lines.get_mut(l)
    }
}

impl AsRef<LayoutDocument> for LayoutDocument {
    fn as_ref(&self) -> &LayoutDocument {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str) -> TextLine {
        TextLine::new(id, Polygon::from_coords(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_lines_in_document_order() -> Result<(), LineId> {
        let doc = LayoutDocument::new(
            "page",
            vec![
                Region::new("r1", vec![line("a"), line("b")]),
                Region::new("r2", vec![]),
                Region::new("r3", vec![line("c")]),
            ],
        )?;
        let ids: Vec<_> = doc.lines().map(|(_, l)| l.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(doc.line_count(), 3);
        assert!(doc.line(&LineId::new("c")).is_some());
        assert!(doc.line(&LineId::new("zzz")).is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_line_ids_rejected() {
        let result = LayoutDocument::new(
            "page",
            vec![
                Region::new("r1", vec![line("a")]),
                Region::new("r2", vec![line("a")]),
            ],
        );
        assert_eq!(result.err(), Some(LineId::new("a")));
    }
}
