// Deferred finalize task queue
//
// Runs save/discard work on the tokio runtime, detached from the lifecycle
// hook that scheduled it, so slow device I/O never stalls the next test.
// Completion reports go out on a broadcast channel; failures never reach the
// hook caller. There are no retries.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::capture::handle::{CaptureId, CaptureKind};

/// What a finalize task was asked to do with its capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeAction {
    Save,
    Discard,
}

impl std::fmt::Display for FinalizeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalizeAction::Save => write!(f, "save"),
            FinalizeAction::Discard => write!(f, "discard"),
        }
    }
}

/// Completion report for one finalize task
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub capture_id: CaptureId,
    pub kind: CaptureKind,
    pub action: FinalizeAction,
    /// Destination path for successful saves
    pub saved_to: Option<PathBuf>,
    /// Failure description; the task still settled and released its handle
    pub error: Option<String>,
}

impl FinalizeReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Queue of in-flight finalize tasks with trackable completion
pub struct DeferredTaskQueue {
    reports_tx: broadcast::Sender<FinalizeReport>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeferredTaskQueue {
    pub fn new() -> Self {
        let (reports_tx, _) = broadcast::channel(64);
        Self {
            reports_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to completion reports
    pub fn subscribe(&self) -> broadcast::Receiver<FinalizeReport> {
        self.reports_tx.subscribe()
    }

    /// Number of tasks that have not yet settled
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|t| !t.is_finished());
        tasks.len()
    }

    /// Spawn a finalize task. The caller's hook returns immediately; the
    /// report is broadcast when the task settles.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = FinalizeReport> + Send + 'static,
    {
        let reports_tx = self.reports_tx.clone();
        let handle = tokio::spawn(async move {
            let report = task.await;
            if let Some(error) = &report.error {
                warn!(
                    capture = report.capture_id,
                    action = %report.action,
                    error = %error,
                    "finalize task failed"
                );
            }
            // Ignore send errors (no subscribers)
            let _ = reports_tx.send(report);
        });
        self.tasks.lock().unwrap().push(handle);
    }

    /// Wait until every task spawned so far has settled
    pub async fn wait_idle(&self) {
        loop {
            let task = self.tasks.lock().unwrap().pop();
            match task {
                Some(task) => {
                    let _ = task.await;
                }
                None => break,
            }
        }
    }
}

impl Default for DeferredTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
