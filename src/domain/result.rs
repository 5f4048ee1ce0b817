//! Recognition results and per-line diagnostics.

use super::document::{LineId, RegionId, TextAnnotation};
use serde::Serialize;
use std::fmt;

/// Text recognized for one line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    line_id: LineId,
    text: String,
    confidence: Option<f32>,
}

impl RecognitionResult {
    /// Creates a result. Confidence is clamped to [0, 1]; non-finite values become `None`.
    pub fn new(line_id: LineId, text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            line_id,
            text: text.into(),
            confidence: confidence.filter(|c| c.is_finite()).map(|c| c.clamp(0.0, 1.0)),
        }
    }

    /// Identity of the line this result belongs to.
    pub fn line_id(&self) -> &LineId {
        &self.line_id
    }

    /// The recognized text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Confidence in [0, 1], if the backend exposes scores.
    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    /// Converts the result into a document annotation.
    pub fn into_annotation(self) -> (LineId, TextAnnotation) {
        (
            self.line_id,
            TextAnnotation::new(self.text, self.confidence),
        )
    }
}

/// Reason a single line produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Outline has fewer than 3 points or zero area.
    DegenerateGeometry,
    /// Outline lies outside the page image.
    OutOfBounds,
    /// Crop is smaller than the configured minimum.
    TooSmall,
    /// Cropping the page image failed.
    CropFailed,
    /// Inference failed for this line even when submitted alone.
    InferenceFailed,
    /// The backend returned no result for this line.
    MissingResult,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::DegenerateGeometry => "degenerate geometry",
            DiagnosticKind::OutOfBounds => "out of bounds",
            DiagnosticKind::TooSmall => "too small",
            DiagnosticKind::CropFailed => "crop failed",
            DiagnosticKind::InferenceFailed => "inference failed",
            DiagnosticKind::MissingResult => "missing result",
        };
        f.write_str(name)
    }
}

/// A per-line failure that did not abort the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// The affected line.
    pub line_id: LineId,
    /// The region holding the line.
    pub region_id: RegionId,
    /// Failure category.
    pub kind: DiagnosticKind,
    /// Human-readable details.
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic.
    pub fn new(
        line_id: LineId,
        region_id: RegionId,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line_id,
            region_id,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line '{}' in region '{}': {}: {}",
            self.line_id, self.region_id, self.kind, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_normalized() {
        let id = LineId::new("l1");
        assert_eq!(
            RecognitionResult::new(id.clone(), "a", Some(1.7)).confidence(),
            Some(1.0)
        );
        assert_eq!(
            RecognitionResult::new(id.clone(), "a", Some(-0.2)).confidence(),
            Some(0.0)
        );
        assert_eq!(
            RecognitionResult::new(id.clone(), "a", Some(f32::NAN)).confidence(),
            None
        );
        assert_eq!(RecognitionResult::new(id, "a", None).confidence(), None);
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::new(
            LineId::new("l2"),
            RegionId::new("r1"),
            DiagnosticKind::DegenerateGeometry,
            "outline area is zero",
        );
        assert_eq!(
            diagnostic.to_string(),
            "line 'l2' in region 'r1': degenerate geometry: outline area is zero"
        );
    }
}
