// Capture handle bookkeeping
//
// A handle references one in-progress or completed capture. It is shared
// (Arc) between the controller, the deferred finalize task that settles it,
// and the emergency teardown path, so its state lives behind a mutex.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::error::CaptureError;
use crate::capture::strategy::TestContext;

/// Unique capture identifier, scoped to one run
pub type CaptureId = u64;

/// Which phase of the run a capture belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Spans process boot until the first test begins
    Startup,
    /// Covers a single test
    Test,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKind::Startup => write!(f, "startup"),
            CaptureKind::Test => write!(f, "test"),
        }
    }
}

/// Per-handle lifecycle state. Transitions are forward-only; `Killed` is an
/// out-of-band terminal reachable from any non-finalized state, used only by
/// emergency exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Created,
    Started,
    Stopped,
    Saving,
    Discarding,
    Finalized,
    Killed,
}

impl HandleState {
    fn can_advance_to(self, next: HandleState) -> bool {
        use HandleState::*;
        match (self, next) {
            (Created, Started) => true,
            (Started, Stopped) => true,
            (Stopped, Saving) | (Stopped, Discarding) => true,
            (Saving, Finalized) | (Discarding, Finalized) => true,
            (from, Killed) => from != Finalized && from != Killed,
            _ => false,
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleState::Created => "created",
            HandleState::Started => "started",
            HandleState::Stopped => "stopped",
            HandleState::Saving => "saving",
            HandleState::Discarding => "discarding",
            HandleState::Finalized => "finalized",
            HandleState::Killed => "killed",
        };
        write!(f, "{}", name)
    }
}

/// One capture, opaque to the controller except for its bookkeeping.
///
/// `C` is the strategy's capture data (device paths, child processes, ...);
/// the controller never inspects it.
pub struct CaptureHandle<C> {
    id: CaptureId,
    kind: CaptureKind,
    test: Option<TestContext>,
    created_at: DateTime<Utc>,
    state: Mutex<HandleState>,
    capture: C,
}

impl<C> CaptureHandle<C> {
    pub fn new(id: CaptureId, kind: CaptureKind, test: Option<TestContext>, capture: C) -> Self {
        Self {
            id,
            kind,
            test,
            created_at: Utc::now(),
            state: Mutex::new(HandleState::Created),
            capture,
        }
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    /// The test this capture belongs to; `None` for startup captures
    pub fn test(&self) -> Option<&TestContext> {
        self.test.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn state(&self) -> HandleState {
        *self.state.lock().unwrap()
    }

    /// Move the handle forward. Rejects backwards moves and double
    /// finalization, leaving the state unchanged.
    pub fn advance(&self, next: HandleState) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        if !state.can_advance_to(next) {
            return Err(CaptureError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Emergency-only transition to `Killed`. Returns false (and leaves the
    /// state alone) for handles that already finalized, which must not be
    /// killed again.
    pub fn mark_killed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.can_advance_to(HandleState::Killed) {
            return false;
        }
        *state = HandleState::Killed;
        true
    }
}

impl<C> fmt::Debug for CaptureHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}
