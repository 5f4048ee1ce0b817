//! Per-document processing states.

use crate::core::errors::{ProcessingStage, RecError, RecResult};
use serde::Serialize;
use std::fmt;

/// Why a document ended in [`PipelineState::Errored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    ModelUnavailable,
    DeviceUnavailable,
    MalformedDocument,
    Cancelled,
    Internal,
}

impl ErrorReason {
    /// Classifies a fatal error.
    pub fn from_error(error: &RecError) -> Self {
        match error {
            RecError::ModelLoad { .. } | RecError::Session(_) => Self::ModelUnavailable,
            RecError::DeviceUnavailable { .. } => Self::DeviceUnavailable,
            // A page whose image cannot be read cannot be processed either.
            RecError::MalformedDocument { .. } | RecError::Xml(_) | RecError::ImageLoad(_) => {
                Self::MalformedDocument
            }
            RecError::Cancelled => Self::Cancelled,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ModelUnavailable => "model unavailable",
            Self::DeviceUnavailable => "device unavailable",
            Self::MalformedDocument => "malformed document",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// Lifecycle of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PipelineState {
    Loaded,
    Extracting,
    Batching,
    Recognizing,
    Writing,
    Done,
    Errored(ErrorReason),
}

impl PipelineState {
    /// True for `Done` and `Errored`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored(_))
    }

    /// The state that follows on success, if any.
    pub fn successor(&self) -> Option<PipelineState> {
        match self {
            Self::Loaded => Some(Self::Extracting),
            Self::Extracting => Some(Self::Batching),
            Self::Batching => Some(Self::Recognizing),
            Self::Recognizing => Some(Self::Writing),
            Self::Writing => Some(Self::Done),
            Self::Done | Self::Errored(_) => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => f.write_str("loaded"),
            Self::Extracting => f.write_str("extracting"),
            Self::Batching => f.write_str("batching"),
            Self::Recognizing => f.write_str("recognizing"),
            Self::Writing => f.write_str("writing"),
            Self::Done => f.write_str("done"),
            Self::Errored(reason) => write!(f, "errored ({reason})"),
        }
    }
}

/// Checked state transitions with a record of every visited state.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Starts in `Loaded`.
    pub fn new() -> Self {
        Self {
            state: PipelineState::Loaded,
            history: vec![PipelineState::Loaded],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// States visited so far, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Moves to `next`.
    ///
    /// Only the successor of the current state, or `Errored` from a
    /// non-terminal state, is accepted.
    pub fn advance(&mut self, next: PipelineState) -> RecResult<()> {
        let allowed = match next {
            PipelineState::Errored(_) => !self.state.is_terminal(),
            _ => self.state.successor() == Some(next),
        };
        if !allowed {
            return Err(RecError::processing_message(
                ProcessingStage::Generic,
                format!("illegal state transition {} -> {}", self.state, next),
            ));
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to `Errored(reason)` unless the run already finished.
    pub fn fail(&mut self, reason: ErrorReason) {
        if !self.state.is_terminal() {
            self.state = PipelineState::Errored(reason);
            self.history.push(self.state);
        }
    }
}
