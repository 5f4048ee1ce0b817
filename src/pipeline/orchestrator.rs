//! Per-document pipeline driver.
//!
//! [`Orchestrator::process`] runs one document through extraction, batching,
//! recognition and writing. Per-line problems become diagnostics; only errors
//! that make the whole document unusable end it in `Errored`.

use super::cancel::CancellationToken;
use super::extractor::{LineExtractor, LineFailure};
use super::report::RunReport;
use super::state::{ErrorReason, PipelineState, StateMachine};
use super::writer::ResultWriter;
use crate::core::batch::{BatchPolicy, BatchScheduler};
use crate::core::config::{ConfigValidator, PipelineConfig};
use crate::core::errors::RecResult;
use crate::core::traits::LineRecognizer;
use crate::domain::{LayoutDocument, LineCrop};
use crate::models::recognition::recognize_isolated;
use image::RgbImage;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives documents through the pipeline states.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: PipelineConfig,
    extractor: LineExtractor,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Creates an orchestrator after validating the configuration.
    pub fn new(config: PipelineConfig) -> RecResult<Self> {
        config.validate()?;
        Ok(Self {
            extractor: LineExtractor::new(&config),
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `token` to stop between batches.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn extractor(&self) -> &LineExtractor {
        &self.extractor
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs every stage for one document and its page image.
    pub fn process<R>(
        &self,
        recognizer: &R,
        doc: &mut LayoutDocument,
        image: &RgbImage,
    ) -> RunReport
    where
        R: LineRecognizer + ?Sized,
    {
        let started = Instant::now();
        let mut machine = StateMachine::new();
        let extracted = match machine.advance(PipelineState::Extracting) {
            Ok(()) => self.extractor.crops(doc, image).iter().collect(),
            Err(_) => Vec::new(),
        };
        self.finish(recognizer, doc, machine, extracted, started)
    }

    /// Continues a document whose crops were extracted ahead of time.
    pub fn process_extracted<R>(
        &self,
        recognizer: &R,
        doc: &mut LayoutDocument,
        extracted: Vec<Result<LineCrop, LineFailure>>,
    ) -> RunReport
    where
        R: LineRecognizer + ?Sized,
    {
        let started = Instant::now();
        let mut machine = StateMachine::new();
        if let Err(e) = machine.advance(PipelineState::Extracting) {
            warn!("{}", e);
        }
        self.finish(recognizer, doc, machine, extracted, started)
    }

    fn finish<R>(
        &self,
        recognizer: &R,
        doc: &mut LayoutDocument,
        mut machine: StateMachine,
        extracted: Vec<Result<LineCrop, LineFailure>>,
        started: Instant,
    ) -> RunReport
    where
        R: LineRecognizer + ?Sized,
    {
        let mut report = RunReport::new(doc.id(), doc.line_count());
        if let Err(e) = self.run_stages(recognizer, doc, &mut machine, extracted, &mut report) {
            warn!("document '{}' failed: {}", doc.id(), e);
            machine.fail(ErrorReason::from_error(&e));
            report.error = Some(e.chain_message());
        }

        report.state = machine.state();
        report.history = machine.history().to_vec();
        report.lines_failed = report.diagnostics.len();
        report.elapsed = started.elapsed();
        info!("{}", report);
        report
    }

    fn run_stages<R>(
        &self,
        recognizer: &R,
        doc: &mut LayoutDocument,
        machine: &mut StateMachine,
        extracted: Vec<Result<LineCrop, LineFailure>>,
        report: &mut RunReport,
    ) -> RecResult<()>
    where
        R: LineRecognizer + ?Sized,
    {
        let mut crops = Vec::with_capacity(extracted.len());
        for outcome in extracted {
            match outcome {
                Ok(crop) => crops.push(crop),
                Err(failure) => {
                    warn!("skipping {}", failure);
                    report.diagnostics.push(failure);
                }
            }
        }
        report.lines_extracted = crops.len();

        machine.advance(PipelineState::Batching)?;
        let policy = BatchPolicy::new(recognizer.max_batch_size())
            .with_max_batch_area(self.config.max_batch_area);
        let batches = BatchScheduler::new(policy)?.partition(crops);
        debug!(
            "document '{}': {} crops in {} batches",
            doc.id(),
            report.lines_extracted,
            batches.len()
        );

        machine.advance(PipelineState::Recognizing)?;
        let mut results = Vec::with_capacity(report.lines_extracted);
        let mut cancelled = false;
        for batch in &batches {
            if self.cancel.is_cancelled() {
                cancelled = true;
                report.lines_pending += batch.len();
                continue;
            }
            let batch_start = Instant::now();
            let outcome = recognize_isolated(recognizer, batch.crops());
            report.metrics.update(batch.len(), batch_start.elapsed());
            if outcome.degraded {
                report.metrics.degraded_batches += 1;
            }
            report.batch_sizes.push(batch.len());
            results.extend(outcome.results);
            report.diagnostics.extend(outcome.diagnostics);
        }
        if cancelled {
            info!(
                "document '{}' cancelled with {} lines not submitted",
                doc.id(),
                report.lines_pending
            );
        }

        machine.advance(PipelineState::Writing)?;
        let summary = ResultWriter::apply(doc, results);
        report.lines_recognized = summary.applied;

        if cancelled {
            machine.fail(ErrorReason::Cancelled);
            report.error = Some("cancelled between batches".to_string());
        } else {
            machine.advance(PipelineState::Done)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DeviceSpec;
    use crate::core::errors::RecError;
    use crate::domain::{DiagnosticKind, LineId, RecognitionResult, Region, TextLine};
    use crate::processors::Polygon;
    use image::Rgb;
    use std::sync::Mutex;

    struct Echo {
        batch_size: usize,
        calls: Mutex<Vec<usize>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl Echo {
        fn new(batch_size: usize) -> Self {
            Self {
                batch_size,
                calls: Mutex::new(Vec::new()),
                cancel_after: None,
            }
        }
    }

    impl LineRecognizer for Echo {
        fn recognize(&self, crops: &[LineCrop]) -> RecResult<Vec<RecognitionResult>> {
            let mut calls = self.calls.lock().map_err(|_| RecError::invalid_input("poisoned"))?;
            calls.push(crops.len());
            if let Some((n, token)) = &self.cancel_after
                && calls.len() >= *n
            {
                token.cancel();
            }
            Ok(crops
                .iter()
                .map(|c| RecognitionResult::new(c.line_id().clone(), format!("text {}", c.line_id()), Some(0.9)))
                .collect())
        }

        fn device(&self) -> &DeviceSpec {
            &DeviceSpec::Cpu
        }

        fn max_batch_size(&self) -> usize {
            self.batch_size
        }
    }

    fn document(lines: usize) -> LayoutDocument {
        let lines = (0..lines)
            .map(|i| {
                let y = (i * 10) as f32;
                TextLine::new(format!("l{i}"), Polygon::from_coords(0.0, y, 80.0, y + 8.0))
            })
            .collect();
        LayoutDocument::new("page", vec![Region::new("r1", lines)]).unwrap()
    }

    fn page() -> RgbImage {
        RgbImage::from_pixel(100, 120, Rgb([200, 200, 200]))
    }

    #[test]
    fn test_batches_follow_line_order() {
        let recognizer = Echo::new(4);
        let mut doc = document(10);
        let orchestrator = Orchestrator::new(PipelineConfig::default()).unwrap();
        let report = orchestrator.process(&recognizer, &mut doc, &page());
        assert!(report.is_done());
        assert_eq!(report.batch_sizes, vec![4, 4, 2]);
        assert_eq!(*recognizer.calls.lock().unwrap(), vec![4, 4, 2]);
        assert_eq!(report.lines_recognized, 10);
        assert_eq!(
            doc.line(&LineId::new("l7")).unwrap().annotation().unwrap().text,
            "text l7"
        );
    }

    #[test]
    fn test_state_history_is_complete() {
        let recognizer = Echo::new(8);
        let mut doc = document(2);
        let orchestrator = Orchestrator::new(PipelineConfig::default()).unwrap();
        let report = orchestrator.process(&recognizer, &mut doc, &page());
        assert_eq!(
            report.history,
            vec![
                PipelineState::Loaded,
                PipelineState::Extracting,
                PipelineState::Batching,
                PipelineState::Recognizing,
                PipelineState::Writing,
                PipelineState::Done,
            ]
        );
    }

    #[test]
    fn test_cancellation_writes_completed_batches() {
        let token = CancellationToken::new();
        let mut recognizer = Echo::new(3);
        recognizer.cancel_after = Some((1, token.clone()));
        let mut doc = document(7);
        let orchestrator = Orchestrator::new(PipelineConfig::default())
            .unwrap()
            .with_cancellation(token);
        let report = orchestrator.process(&recognizer, &mut doc, &page());

        assert_eq!(report.state, PipelineState::Errored(ErrorReason::Cancelled));
        assert_eq!(*recognizer.calls.lock().unwrap(), vec![3]);
        assert_eq!(report.lines_recognized, 3);
        assert_eq!(report.lines_pending, 4);
        assert!(doc.line(&LineId::new("l2")).unwrap().annotation().is_some());
        assert!(doc.line(&LineId::new("l3")).unwrap().annotation().is_none());
    }

    #[test]
    fn test_area_budget_splits_batches() {
        let recognizer = Echo::new(8);
        let mut doc = document(4);
        // Each crop is 80x8; two fit into the budget, three do not.
        let config = PipelineConfig::default().with_max_batch_area(80 * 8 * 2);
        let orchestrator = Orchestrator::new(config).unwrap();
        let report = orchestrator.process(&recognizer, &mut doc, &page());
        assert_eq!(report.batch_sizes, vec![2, 2]);
    }

    #[test]
    fn test_extraction_failures_become_diagnostics() {
        let recognizer = Echo::new(4);
        let mut doc = LayoutDocument::new(
            "page",
            vec![Region::new(
                "r1",
                vec![
                    TextLine::new("ok", Polygon::from_coords(0.0, 0.0, 50.0, 10.0)),
                    TextLine::new("outside", Polygon::from_coords(500.0, 500.0, 550.0, 510.0)),
                ],
            )],
        )
        .unwrap();
        let orchestrator = Orchestrator::new(PipelineConfig::default()).unwrap();
        let report = orchestrator.process(&recognizer, &mut doc, &page());
        assert!(report.is_done());
        assert_eq!(report.lines_failed, 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::OutOfBounds);
        assert_eq!(report.lines_recognized, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(Orchestrator::new(PipelineConfig::default().with_prefetch_depth(0)).is_err());
    }
}
