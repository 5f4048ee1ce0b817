//! Degraded batch handling.
//!
//! When a whole batch fails, every crop is resubmitted on its own so one bad
//! line cannot take its neighbours down with it.

use crate::core::errors::{ProcessingStage, RecError, RecResult};
use crate::core::traits::LineRecognizer;
use crate::domain::{Diagnostic, DiagnosticKind, LineCrop, LineId, RecognitionResult};
use std::collections::HashMap;
use tracing::warn;

/// Results and per-line failures of one batch.
#[derive(Debug, Default)]
pub struct IsolatedOutcome {
    /// Results in crop order.
    pub results: Vec<RecognitionResult>,
    /// Crops that failed even when submitted alone.
    pub diagnostics: Vec<Diagnostic>,
    /// True if the batch failed as a whole and was resubmitted crop by crop.
    pub degraded: bool,
}

/// Recognizes a batch, falling back to single-crop submission on failure.
pub fn recognize_isolated<R>(recognizer: &R, crops: &[LineCrop]) -> IsolatedOutcome
where
    R: LineRecognizer + ?Sized,
{
    let batch_error = match recognizer
        .recognize(crops)
        .and_then(|results| align_results(crops, results))
    {
        Ok(results) => {
            return IsolatedOutcome {
                results,
                ..Default::default()
            };
        }
        Err(e) => e,
    };

    let ids: Vec<String> = crops.iter().map(|c| c.line_id().to_string()).collect();
    warn!(
        "{}",
        RecError::format_batch_error_message(
            "line recognition",
            recognizer.name(),
            &ids,
            &batch_error
        )
    );

    let mut outcome = IsolatedOutcome {
        degraded: true,
        ..Default::default()
    };
    if crops.len() == 1 {
        outcome
            .diagnostics
            .push(inference_failure(&crops[0], &batch_error));
        return outcome;
    }

    for crop in crops {
        let single = std::slice::from_ref(crop);
        match recognizer
            .recognize(single)
            .and_then(|results| align_results(single, results))
        {
            Ok(mut results) => outcome.results.append(&mut results),
            Err(e) => {
                warn!(
                    "line '{}' failed on its own: {}",
                    crop.line_id(),
                    e.chain_message()
                );
                outcome.diagnostics.push(inference_failure(crop, &e));
            }
        }
    }
    outcome
}

/// Matches results to crops by line id and returns them in crop order.
fn align_results(
    crops: &[LineCrop],
    results: Vec<RecognitionResult>,
) -> RecResult<Vec<RecognitionResult>> {
    if results.len() != crops.len() {
        return Err(RecError::processing_message(
            ProcessingStage::BatchProcessing,
            format!(
                "backend returned {} results for {} crops",
                results.len(),
                crops.len()
            ),
        ));
    }
    let mut by_id: HashMap<LineId, RecognitionResult> = results
        .into_iter()
        .map(|r| (r.line_id().clone(), r))
        .collect();
    crops
        .iter()
        .map(|crop| {
            by_id.remove(crop.line_id()).ok_or_else(|| {
                RecError::processing_message(
                    ProcessingStage::BatchProcessing,
                    format!("backend returned no result for line '{}'", crop.line_id()),
                )
            })
        })
        .collect()
}

fn inference_failure(crop: &LineCrop, error: &RecError) -> Diagnostic {
    Diagnostic::new(
        crop.line_id().clone(),
        crop.region_id().clone(),
        DiagnosticKind::InferenceFailed,
        error.chain_message(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DeviceSpec;
    use crate::core::errors::OpaqueError;
    use crate::domain::RegionId;
    use crate::processors::PixelRect;
    use image::RgbImage;
    use std::sync::Mutex;

    /// Fails any batch containing a poisoned line; optionally reverses output order.
    struct Flaky {
        poisoned: Vec<&'static str>,
        reverse: bool,
        calls: Mutex<Vec<usize>>,
    }

    impl LineRecognizer for Flaky {
        fn recognize(&self, crops: &[LineCrop]) -> RecResult<Vec<RecognitionResult>> {
            self.calls.lock().map(|mut c| c.push(crops.len())).ok();
            if crops
                .iter()
                .any(|c| self.poisoned.contains(&c.line_id().as_str()))
            {
                return Err(RecError::invalid_input("poisoned crop"));
            }
            let mut results: Vec<RecognitionResult> = crops
                .iter()
                .map(|c| RecognitionResult::new(c.line_id().clone(), c.line_id().as_str(), Some(0.9)))
                .collect();
            if self.reverse {
                results.reverse();
            }
            Ok(results)
        }

        fn device(&self) -> &DeviceSpec {
            &DeviceSpec::Cpu
        }

        fn max_batch_size(&self) -> usize {
            8
        }
    }

    fn crops(ids: &[&str]) -> Vec<LineCrop> {
        ids.iter()
            .map(|id| {
                LineCrop::new(
                    LineId::new(*id),
                    RegionId::new("r1"),
                    RgbImage::new(8, 4),
                    PixelRect {
                        x: 0,
                        y: 0,
                        width: 8,
                        height: 4,
                    },
                )
            })
            .collect()
    }

    fn flaky(poisoned: Vec<&'static str>, reverse: bool) -> Flaky {
        Flaky {
            poisoned,
            reverse,
            calls: Mutex::new(Vec::new()),
        }
    }

    struct OutOfMemory;

    impl LineRecognizer for OutOfMemory {
        fn recognize(&self, crops: &[LineCrop]) -> RecResult<Vec<RecognitionResult>> {
            Err(RecError::ModelInference {
                model_name: "trocr".to_string(),
                operation: "encoder".to_string(),
                batch_size: crops.len(),
                input_shape: vec![crops.len(), 3, 384, 384],
                context: "encoder forward".to_string(),
                source: Box::new(OpaqueError("CUDA out of memory".to_string())),
            })
        }

        fn device(&self) -> &DeviceSpec {
            &DeviceSpec::Cpu
        }

        fn max_batch_size(&self) -> usize {
            8
        }
    }

    #[test]
    fn test_diagnostic_keeps_the_runtime_cause() {
        let outcome = recognize_isolated(&OutOfMemory, &crops(&["a"]));
        assert_eq!(outcome.diagnostics.len(), 1);
        let message = &outcome.diagnostics[0].message;
        assert!(message.contains("failed during encoder"));
        assert!(message.contains("CUDA out of memory"));
    }

    #[test]
    fn test_healthy_batch_is_submitted_once() {
        let recognizer = flaky(vec![], false);
        let outcome = recognize_isolated(&recognizer, &crops(&["a", "b", "c"]));
        assert!(!outcome.degraded);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(*recognizer.calls.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_results_are_realigned_by_line_id() {
        let recognizer = flaky(vec![], true);
        let outcome = recognize_isolated(&recognizer, &crops(&["a", "b", "c"]));
        let ids: Vec<&str> = outcome.results.iter().map(|r| r.line_id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(outcome.results.iter().all(|r| r.text() == r.line_id().as_str()));
    }

    #[test]
    fn test_failed_batch_isolates_the_bad_crop() {
        let recognizer = flaky(vec!["b"], false);
        let outcome = recognize_isolated(&recognizer, &crops(&["a", "b", "c"]));
        assert!(outcome.degraded);
        let ids: Vec<&str> = outcome.results.iter().map(|r| r.line_id().as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].line_id.as_str(), "b");
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::InferenceFailed);
        assert_eq!(*recognizer.calls.lock().unwrap(), vec![3, 1, 1, 1]);
    }

    #[test]
    fn test_single_crop_batch_is_not_retried() {
        let recognizer = flaky(vec!["a"], false);
        let outcome = recognize_isolated(&recognizer, &crops(&["a"]));
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(*recognizer.calls.lock().unwrap(), vec![1]);
    }
}
