//! Replies returned by the recorder's control surface

use serde::Serialize;

use crate::config::CaptureMode;
use crate::export::ExportOutcome;
use crate::filter::FilterSpec;
use crate::Result;

/// Recording gate as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// Capturing admitted requests
    Recording,
    /// Capturing nothing
    Stopped,
}

impl From<bool> for RecordingState {
    fn from(is_recording: bool) -> Self {
        if is_recording {
            RecordingState::Recording
        } else {
            RecordingState::Stopped
        }
    }
}

/// Reply to start, stop and toggle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingReply {
    /// Gate after the change
    pub status: RecordingState,
    /// Active capture mode
    pub mode: CaptureMode,
    /// Records currently stored
    pub captured: usize,
}

/// Reply to a capture mode change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeReply {
    /// Mode after the change
    pub mode: CaptureMode,
}

/// Reply to a filter change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterReply {
    /// Filter after the merge
    pub filter: FilterSpec,
}

/// Reply to a capacity change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityReply {
    /// Bound after the change
    pub max_captures: usize,
    /// Records evicted to fit the new bound
    pub evicted: usize,
}

/// Reply to clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearReply {
    /// Records removed
    pub cleared: usize,
}

/// Snapshot of the recorder configuration and counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Recording gate
    pub is_recording: bool,
    /// Active capture mode
    pub capture_mode: CaptureMode,
    /// Records currently stored
    pub total_captures: usize,
    /// Calls seen by the interceptor
    pub fetch_calls: u64,
    /// Installations performed
    pub injections: u64,
    /// Custom-mode filter
    pub filter: FilterSpec,
    /// Store bound
    pub max_captures: usize,
    /// Whether the interceptor is the active entry point
    pub is_our_interceptor: bool,
}

/// Reply to an export request
///
/// Failures are reported here rather than raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportReply {
    /// Payload handed to the sink
    Exported {
        /// Records exported
        exported: usize,
        /// Name offered to the sink
        filename: String,
    },
    /// No record selected, sink not called
    NothingToExport {
        /// Human readable reason
        error: String,
    },
    /// Serialization or sink failure
    Failed {
        /// Failure description
        error: String,
    },
}

impl ExportReply {
    pub(crate) fn from_outcome(outcome: Result<ExportOutcome>, empty_reason: &str) -> Self {
        match outcome {
            Ok(ExportOutcome::Exported { count, filename }) => ExportReply::Exported {
                exported: count,
                filename,
            },
            Ok(ExportOutcome::NothingToExport) => ExportReply::NothingToExport {
                error: empty_reason.to_string(),
            },
            Err(e) => ExportReply::Failed {
                error: e.to_string(),
            },
        }
    }

    /// Records exported, zero unless the export happened
    #[must_use]
    pub fn exported(&self) -> usize {
        match self {
            ExportReply::Exported { exported, .. } => *exported,
            ExportReply::NothingToExport { .. } | ExportReply::Failed { .. } => 0,
        }
    }
}
