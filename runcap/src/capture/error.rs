// Error types for the capture lifecycle
//
// Failures during normal flow are either fatal to a single recording (start)
// or isolated to the background finalize task (save/discard). Nothing in this
// module aborts the overall test run.

use std::path::PathBuf;

use crate::capture::handle::{CaptureId, CaptureKind, HandleState};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The strategy could not begin capturing. Propagates synchronously out
    /// of the lifecycle hook that attempted to start the recording.
    #[error("failed to start {kind} capture #{id}")]
    StartFailed {
        id: CaptureId,
        kind: CaptureKind,
        #[source]
        source: anyhow::Error,
    },

    /// The strategy could not end an active capture.
    #[error("failed to stop capture #{id}")]
    StopFailed {
        id: CaptureId,
        #[source]
        source: anyhow::Error,
    },

    /// Persisting a captured artifact failed. Occurs inside a deferred task
    /// and surfaces only through the task queue's report channel.
    #[error("failed to save capture #{id} to {}", path.display())]
    SaveFailed {
        id: CaptureId,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Releasing a discarded capture's resources failed. Deferred-task only,
    /// like [`CaptureError::SaveFailed`].
    #[error("failed to discard capture #{id}")]
    DiscardFailed {
        id: CaptureId,
        #[source]
        source: anyhow::Error,
    },

    /// A handle was asked to move backwards or to finalize twice.
    #[error("invalid capture state transition {from} -> {to}")]
    InvalidTransition { from: HandleState, to: HandleState },
}
