// Capture strategy contract and the harness-facing vocabulary types
//
// A strategy knows how to physically capture one kind of artifact (log
// stream, screen recording, screenshot). The lifecycle controller drives it
// but never looks inside its capture data.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capture::handle::CaptureKind;

/// Identity of a test as reported by the harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestContext {
    /// Test title, e.g. "logs in with stored credentials"
    pub title: String,
    /// Fully qualified name including suite path
    pub full_name: String,
}

impl TestContext {
    pub fn new(title: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            full_name: full_name.into(),
        }
    }
}

/// Terminal status of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome reported by the harness after a test finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test: TestContext,
    pub status: TestStatus,
}

impl TestOutcome {
    pub fn new(test: TestContext, status: TestStatus) -> Self {
        Self { test, status }
    }

    pub fn failed(&self) -> bool {
        self.status == TestStatus::Failed
    }
}

/// Identity of an app process launched on the device during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppLaunchRef {
    pub bundle_id: String,
    pub process_id: u32,
}

/// Contract between the lifecycle controller and a concrete capture kind.
///
/// `start`/`stop`/`save`/`discard` may perform slow device I/O; `create` and
/// `kill` must not block. `kill` is the emergency path: forceful, as
/// synchronous as possible, and called only for handles that have not
/// finalized.
#[async_trait]
pub trait CaptureStrategy: Send + Sync + 'static {
    /// Capability-specific capture data, owned exclusively by the strategy
    type Capture: Send + Sync + 'static;

    /// Allocate capture data for a new recording. Bookkeeping only, no I/O.
    fn create(&self, test: Option<&TestContext>) -> Self::Capture;

    /// Begin capturing. May block until the capture is confirmed active.
    async fn start(&self, capture: &Self::Capture) -> Result<()>;

    /// End an active capture. Idempotent if already stopped.
    async fn stop(&self, capture: &Self::Capture) -> Result<()>;

    /// Persist the captured artifact to `dest`. May be slow (device pull).
    async fn save(&self, capture: &Self::Capture, dest: &Path) -> Result<()>;

    /// Release on-device or temporary resources without persisting.
    async fn discard(&self, capture: &Self::Capture) -> Result<()>;

    /// Forceful teardown for emergency exit. Best-effort; a failure here is
    /// logged by the caller and never blocks killing the remaining captures.
    fn kill(&self, capture: &Self::Capture) -> Result<()>;

    /// Notification that an app process launched. Strategies that filter by
    /// process identity record it here.
    fn on_app_launch(&self, _app: &AppLaunchRef) {}

    /// Artifact file name for a capture of the given kind, e.g. "test.log"
    fn artifact_filename(&self, kind: CaptureKind) -> String;
}
