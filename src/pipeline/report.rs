//! Run reports.
//!
//! [`RunReport`] describes one document: its final state, line counts,
//! batches, diagnostics and timing. [`RunSummary`] folds the reports of a
//! multi-document run into totals for the command line.

use super::state::{ErrorReason, PipelineState};
use crate::core::batch::BatchMetrics;
use crate::core::errors::RecError;
use crate::domain::Diagnostic;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Outcome of processing one document.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Document identifier.
    pub document_id: String,
    /// Final state.
    pub state: PipelineState,
    /// Every state the document passed through.
    pub history: Vec<PipelineState>,
    /// Number of lines in the document.
    pub lines_total: usize,
    /// Lines that produced a crop.
    pub lines_extracted: usize,
    /// Lines whose annotation was written.
    pub lines_recognized: usize,
    /// Lines with a diagnostic.
    pub lines_failed: usize,
    /// Lines never submitted because the run was cancelled.
    pub lines_pending: usize,
    /// Sizes of the submitted batches, in submission order.
    pub batch_sizes: Vec<usize>,
    /// Per-line failures.
    pub diagnostics: Vec<Diagnostic>,
    /// Message of the error that ended the run, if any.
    pub error: Option<String>,
    /// Backend timing.
    #[serde(skip)]
    pub metrics: BatchMetrics,
    /// Wall time for the whole document.
    pub elapsed: Duration,
}

impl RunReport {
    /// An empty report for a document that has just been loaded.
    pub fn new(document_id: impl Into<String>, lines_total: usize) -> Self {
        Self {
            document_id: document_id.into(),
            state: PipelineState::Loaded,
            history: vec![PipelineState::Loaded],
            lines_total,
            lines_extracted: 0,
            lines_recognized: 0,
            lines_failed: 0,
            lines_pending: 0,
            batch_sizes: Vec::new(),
            diagnostics: Vec::new(),
            error: None,
            metrics: BatchMetrics::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// A report for a document that failed before any line was processed.
    pub fn setup_failed(document_id: impl Into<String>, lines_total: usize, error: &RecError) -> Self {
        let reason = ErrorReason::from_error(error);
        let mut report = Self::new(document_id, lines_total);
        report.state = PipelineState::Errored(reason);
        report.history.push(report.state);
        report.error = Some(error.chain_message());
        report
    }

    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.state, PipelineState::Errored(_))
    }

    /// The error reason, when the run ended in `Errored`.
    pub fn error_reason(&self) -> Option<ErrorReason> {
        match self.state {
            PipelineState::Errored(reason) => Some(reason),
            _ => None,
        }
    }

    /// Lines recognized per second of wall time.
    pub fn lines_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.lines_recognized as f64 / secs
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({} of {} lines recognized, {} failed",
            self.document_id, self.state, self.lines_recognized, self.lines_total, self.lines_failed
        )?;
        if self.lines_pending > 0 {
            write!(f, ", {} not submitted", self.lines_pending)?;
        }
        write!(
            f,
            ", {} batches, {:.2}s)",
            self.batch_sizes.len(),
            self.elapsed.as_secs_f64()
        )?;
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}

/// Totals over several documents.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub documents: usize,
    pub errored: usize,
    pub lines_total: usize,
    pub lines_recognized: usize,
    pub lines_failed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one document's report.
    pub fn record(&mut self, report: &RunReport) {
        self.documents += 1;
        if report.is_errored() {
            self.errored += 1;
        }
        self.lines_total += report.lines_total;
        self.lines_recognized += report.lines_recognized;
        self.lines_failed += report.lines_failed;
        self.elapsed += report.elapsed;
    }

    /// Returns the share of lines recognized as a percentage (0.0 to 100.0).
    pub fn recognition_rate(&self) -> f64 {
        if self.lines_total == 0 {
            0.0
        } else {
            (self.lines_recognized as f64 / self.lines_total as f64) * 100.0
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errored > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Recognition summary:")?;
        writeln!(
            f,
            "  Documents: {} ({} errored)",
            self.documents, self.errored
        )?;
        writeln!(
            f,
            "  Lines recognized: {} of {} ({:.1}%)",
            self.lines_recognized,
            self.lines_total,
            self.recognition_rate()
        )?;
        writeln!(f, "  Lines failed: {}", self.lines_failed)?;
        write!(f, "  Total time: {:.2}s", self.elapsed.as_secs_f64())
    }
}
