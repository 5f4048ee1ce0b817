//! Applies recognition results to a layout document.

use crate::domain::{LayoutDocument, LineId, RecognitionResult};
use tracing::warn;

/// Outcome of applying a set of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    /// Number of line annotations replaced or added.
    pub applied: usize,
    /// Results whose line id is not part of the document.
    pub unknown: Vec<LineId>,
}

/// The only component that mutates line annotations.
///
/// Results are attached by line identity. Lines without a result keep their
/// previous annotation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultWriter;

impl ResultWriter {
    pub fn apply(
        doc: &mut LayoutDocument,
        results: impl IntoIterator<Item = RecognitionResult>,
    ) -> WriteSummary {
        let mut summary = WriteSummary::default();
        for result in results {
            let (line_id, annotation) = result.into_annotation();
            match doc.line_mut(&line_id) {
                Some(line) => {
                    line.set_annotation(annotation);
                    summary.applied += 1;
                }
                None => {
                    warn!(
                        "ignoring result for unknown line '{}' in document '{}'",
                        line_id,
                        doc.id()
                    );
                    summary.unknown.push(line_id);
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Region, TextAnnotation, TextLine};
    use crate::processors::Polygon;

    fn document() -> LayoutDocument {
        let outline = Polygon::from_coords(0.0, 0.0, 10.0, 10.0);
        LayoutDocument::new(
            "page",
            vec![Region::new(
                "r1",
                vec![
                    TextLine::new("a", outline.clone()),
                    TextLine::new("b", outline.clone())
                        .with_annotation(TextAnnotation::new("previous", Some(0.5))),
                    TextLine::new("c", outline),
                ],
            )],
        )
        .unwrap()
    }

    #[test]
    fn test_results_are_applied_by_identity() {
        let mut doc = document();
        let summary = ResultWriter::apply(
            &mut doc,
            vec![
                RecognitionResult::new(LineId::new("c"), "third", Some(0.8)),
                RecognitionResult::new(LineId::new("a"), "first", None),
            ],
        );
        assert_eq!(summary.applied, 2);
        assert!(summary.unknown.is_empty());

        let a = doc.line(&LineId::new("a")).unwrap().annotation().unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(a.confidence, None);
        let c = doc.line(&LineId::new("c")).unwrap().annotation().unwrap();
        assert_eq!(c.text, "third");
    }

    #[test]
    fn test_lines_without_result_keep_prior_text() {
        let mut doc = document();
        ResultWriter::apply(
            &mut doc,
            vec![RecognitionResult::new(LineId::new("a"), "first", None)],
        );
        let b = doc.line(&LineId::new("b")).unwrap().annotation().unwrap();
        assert_eq!(b.text, "previous");
        assert_eq!(b.confidence, Some(0.5));
    }

    #[test]
    fn test_unknown_lines_are_reported() {
        let mut doc = document();
        let before = doc.clone();
        let summary = ResultWriter::apply(
            &mut doc,
            vec![RecognitionResult::new(LineId::new("zz"), "ghost", None)],
        );
        assert_eq!(summary.applied, 0);
        assert_eq!(summary.unknown, vec![LineId::new("zz")]);
        assert_eq!(doc, before);
    }
}
