// Recording lifecycle controller
//
// Reconciles three timelines into consistent state: the run lifecycle
// (start/exit), the test lifecycle (before/after each), and asynchronous
// finalization I/O. The harness invokes hooks strictly sequentially, so
// foreground state needs no locking; the active set is the one structure
// shared with finalize tasks and the emergency path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::capture::deferred::{DeferredTaskQueue, FinalizeAction, FinalizeReport};
use crate::capture::emergency::EmergencyKill;
use crate::capture::error::CaptureError;
use crate::capture::handle::{CaptureHandle, CaptureId, CaptureKind, HandleState};
use crate::capture::manifest::{ArtifactRecord, RunManifest};
use crate::capture::paths::PathBuilder;
use crate::capture::policy::RetentionPolicy;
use crate::capture::strategy::{AppLaunchRef, CaptureStrategy, TestContext, TestOutcome};

type HandleRef<S> = Arc<CaptureHandle<<S as CaptureStrategy>::Capture>>;

/// Orchestrates capture lifecycle across a whole test run.
///
/// One instance per run. At most one foreground recording exists at a time;
/// finalize work for earlier recordings overlaps freely with later foreground
/// activity.
pub struct RecordingLifecycle<S: CaptureStrategy> {
    strategy: Arc<S>,
    policy: Arc<dyn RetentionPolicy>,
    paths: Arc<dyn PathBuilder>,
    queue: DeferredTaskQueue,
    manifest: Arc<Mutex<RunManifest>>,
    /// Next capture id to assign
    next_id: CaptureId,
    /// Full run history, append-only
    recordings: Vec<HandleRef<S>>,
    /// Handles whose finalize has not completed; the emergency kill targets.
    /// Shared with finalize tasks, which remove their own handle on settle.
    active: Arc<Mutex<Vec<HandleRef<S>>>>,
    /// The startup recording, non-null from creation until its finalize
    /// completes. Shared with its finalize task, which clears it on settle.
    startup: Arc<Mutex<Option<HandleRef<S>>>>,
    /// The foreground recording of the currently open phase
    current: Option<HandleRef<S>>,
    /// Latched to true by the first failing test, never reset
    has_failing_tests: bool,
    /// Set by emergency exit; suppresses any later finalize scheduling
    aborted: Arc<AtomicBool>,
}

impl<S: CaptureStrategy> RecordingLifecycle<S> {
    pub fn new(
        strategy: Arc<S>,
        policy: Arc<dyn RetentionPolicy>,
        paths: Arc<dyn PathBuilder>,
    ) -> Self {
        Self {
            strategy,
            policy,
            paths,
            queue: DeferredTaskQueue::new(),
            manifest: Arc::new(Mutex::new(RunManifest::default())),
            next_id: 0,
            recordings: Vec::new(),
            active: Arc::new(Mutex::new(Vec::new())),
            startup: Arc::new(Mutex::new(None)),
            current: None,
            has_failing_tests: false,
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run is starting: begin the startup recording if policy allows
    pub async fn on_run_start(&mut self) -> Result<(), CaptureError> {
        if !self.policy.should_record_startup() {
            debug!("startup capture disabled by policy");
            return Ok(());
        }

        let handle = self.new_handle(CaptureKind::Startup, None);
        *self.startup.lock().unwrap() = Some(Arc::clone(&handle));
        self.current = Some(Arc::clone(&handle));
        self.register_and_start(handle).await
    }

    /// A test is about to begin: close out the startup recording, then begin
    /// a test recording if policy allows
    pub async fn on_before_test(&mut self, test: &TestContext) -> Result<(), CaptureError> {
        if let Some(startup) = self.startup_if_recording() {
            self.stop_recording(&startup).await?;
            self.current = None;
            self.maybe_save_startup();
        }

        if self.policy.should_record_test(test) {
            let handle = self.new_handle(CaptureKind::Test, Some(test.clone()));
            self.current = Some(Arc::clone(&handle));
            self.register_and_start(handle).await?;
        } else {
            debug!(test = %test.full_name, "test capture disabled by policy");
        }

        Ok(())
    }

    /// A test finished: latch failure state, stop the foreground recording,
    /// re-evaluate the startup recording, finalize the test recording
    pub async fn on_after_test(&mut self, outcome: &TestOutcome) -> Result<(), CaptureError> {
        if outcome.failed() && !self.has_failing_tests {
            info!(test = %outcome.test.full_name, "first failing test observed");
            self.has_failing_tests = true;
        }

        if let Some(current) = self.current.clone() {
            self.stop_recording(&current).await?;
        }

        if self.startup.lock().unwrap().is_some() {
            self.maybe_save_startup();
        }

        if let Some(current) = self.current.take() {
            if self.policy.should_keep_test_recording(outcome) {
                self.schedule_finalize(current, FinalizeAction::Save);
            } else {
                self.schedule_finalize(current, FinalizeAction::Discard);
            }
        }

        Ok(())
    }

    /// Run is over: last chance to finalize the startup recording
    pub async fn on_run_exit(&mut self) -> Result<(), CaptureError> {
        // A run without tests exits with the startup recording still live
        if let Some(startup) = self.startup_if_recording() {
            self.stop_recording(&startup).await?;
            self.current = None;
        }

        let keep = self
            .policy
            .should_keep_startup_recording(self.has_failing_tests);
        let startup = self.startup.lock().unwrap().clone();
        if let Some(startup) = startup {
            if keep {
                self.schedule_finalize(startup, FinalizeAction::Save);
            } else {
                self.schedule_finalize(startup, FinalizeAction::Discard);
            }
        }

        Ok(())
    }

    /// An app process launched on the device; forwarded to the strategy so
    /// it can filter by process identity. No controller state changes.
    pub fn on_app_launch(&self, app: &AppLaunchRef) {
        debug!(bundle = %app.bundle_id, pid = app.process_id, "app launched");
        self.strategy.on_app_launch(app);
    }

    /// Abrupt termination: synchronously force-kill every capture whose
    /// finalize has not completed, bypassing save/discard entirely
    pub fn on_emergency_exit(&mut self) {
        self.emergency_handle().kill_all();
    }

    /// Detached kill view over the active set, usable from a signal-handling
    /// thread while the controller is owned elsewhere
    pub fn emergency_handle(&self) -> EmergencyKill<S> {
        EmergencyKill::new(
            Arc::clone(&self.strategy),
            Arc::clone(&self.active),
            Arc::clone(&self.aborted),
        )
    }

    /// Wait until every scheduled finalize task has settled. Harnesses that
    /// need artifacts on disk before process exit call this after
    /// [`Self::on_run_exit`].
    pub async fn wait_for_finalizers(&self) {
        self.queue.wait_idle().await;
    }

    /// Subscribe to finalize completion reports
    pub fn subscribe_finalize(&self) -> broadcast::Receiver<FinalizeReport> {
        self.queue.subscribe()
    }

    /// Index of artifacts saved so far, shared with finalize tasks
    pub fn manifest(&self) -> Arc<Mutex<RunManifest>> {
        Arc::clone(&self.manifest)
    }

    pub fn has_failing_tests(&self) -> bool {
        self.has_failing_tests
    }

    /// Full run history, in creation order
    pub fn recordings(&self) -> &[HandleRef<S>] {
        &self.recordings
    }

    /// Snapshot of handles whose finalize has not completed
    pub fn active_handles(&self) -> Vec<HandleRef<S>> {
        self.active.lock().unwrap().clone()
    }

    pub fn current_handle(&self) -> Option<HandleRef<S>> {
        self.current.clone()
    }

    pub fn startup_handle(&self) -> Option<HandleRef<S>> {
        self.startup.lock().unwrap().clone()
    }

    pub fn is_recording_startup(&self) -> bool {
        self.startup_if_recording().is_some()
    }

    /// The startup handle, if it is also the current foreground recording
    fn startup_if_recording(&self) -> Option<HandleRef<S>> {
        let startup = self.startup.lock().unwrap().clone()?;
        let current_id = self.current.as_ref().map(|h| h.id())?;
        if current_id == startup.id() {
            Some(startup)
        } else {
            None
        }
    }

    fn new_handle(&mut self, kind: CaptureKind, test: Option<TestContext>) -> HandleRef<S> {
        let id = self.next_id;
        self.next_id += 1;
        let capture = self.strategy.create(test.as_ref());
        Arc::new(CaptureHandle::new(id, kind, test, capture))
    }

    /// Register the handle in history and the active set, then start it.
    /// On start failure the handle is treated as never having happened for
    /// state tracking (no current/startup slot, not active) but stays in
    /// history for audit.
    async fn register_and_start(&mut self, handle: HandleRef<S>) -> Result<(), CaptureError> {
        self.recordings.push(Arc::clone(&handle));
        self.active.lock().unwrap().push(Arc::clone(&handle));

        info!(capture = handle.id(), kind = %handle.kind(), "starting capture");
        match self.strategy.start(handle.capture()).await {
            Ok(()) => {
                handle.advance(HandleState::Started)?;
                Ok(())
            }
            Err(source) => {
                self.active.lock().unwrap().retain(|h| h.id() != handle.id());
                if self.current.as_ref().map(|h| h.id()) == Some(handle.id()) {
                    self.current = None;
                }
                let mut startup = self.startup.lock().unwrap();
                if startup.as_ref().map(|h| h.id()) == Some(handle.id()) {
                    *startup = None;
                }
                Err(CaptureError::StartFailed {
                    id: handle.id(),
                    kind: handle.kind(),
                    source,
                })
            }
        }
    }

    async fn stop_recording(&self, handle: &HandleRef<S>) -> Result<(), CaptureError> {
        if handle.state() != HandleState::Started {
            return Ok(());
        }
        self.strategy
            .stop(handle.capture())
            .await
            .map_err(|source| CaptureError::StopFailed {
                id: handle.id(),
                source,
            })?;
        handle.advance(HandleState::Stopped)?;
        info!(capture = handle.id(), kind = %handle.kind(), "capture stopped");
        Ok(())
    }

    /// Schedule the startup save once it becomes eligible. Under
    /// failures-only retention an ineligible startup recording is left
    /// pending, not discarded: a later failing test can still make it worth
    /// keeping, and run exit has the final word.
    fn maybe_save_startup(&mut self) {
        if !self
            .policy
            .should_keep_startup_recording(self.has_failing_tests)
        {
            return;
        }
        let startup = self.startup.lock().unwrap().clone();
        if let Some(startup) = startup {
            self.schedule_finalize(startup, FinalizeAction::Save);
        }
    }

    /// Hand a stopped recording to the deferred queue. The hook returns
    /// before the task runs; when the task settles it advances the handle to
    /// Finalized, removes exactly that handle from the active set, and clears
    /// the startup slot if it owned it.
    fn schedule_finalize(&self, handle: HandleRef<S>, action: FinalizeAction) {
        if self.aborted.load(Ordering::SeqCst) {
            debug!(capture = handle.id(), "skipping finalize after emergency exit");
            return;
        }

        let next = match action {
            FinalizeAction::Save => HandleState::Saving,
            FinalizeAction::Discard => HandleState::Discarding,
        };
        if handle.advance(next).is_err() {
            // Already scheduled, finalized, or killed
            return;
        }
        debug!(capture = handle.id(), action = %action, "finalize scheduled");

        let strategy = Arc::clone(&self.strategy);
        let paths = Arc::clone(&self.paths);
        let active = Arc::clone(&self.active);
        let startup_slot = Arc::clone(&self.startup);
        let manifest = Arc::clone(&self.manifest);
        let filename = self.strategy.artifact_filename(handle.kind());

        self.queue.spawn(async move {
            let result = match action {
                FinalizeAction::Save => {
                    save_capture(&*strategy, &*paths, &handle, &filename).await.map(Some)
                }
                FinalizeAction::Discard => strategy
                    .discard(handle.capture())
                    .await
                    .map(|_| None)
                    .map_err(|source| CaptureError::DiscardFailed {
                        id: handle.id(),
                        source,
                    }),
            };

            // The handle settles regardless of success: it leaves the active
            // set so emergency exit never targets work that won't be retried.
            let _ = handle.advance(HandleState::Finalized);
            active.lock().unwrap().retain(|h| h.id() != handle.id());
            if handle.kind() == CaptureKind::Startup {
                let mut slot = startup_slot.lock().unwrap();
                if slot.as_ref().map(|h| h.id()) == Some(handle.id()) {
                    *slot = None;
                }
            }

            match result {
                Ok(saved_to) => {
                    if let Some(path) = &saved_to {
                        manifest.lock().unwrap().record(ArtifactRecord {
                            capture_id: handle.id(),
                            kind: handle.kind(),
                            test_full_name: handle.test().map(|t| t.full_name.clone()),
                            path: path.clone(),
                            saved_at: chrono::Utc::now(),
                        });
                    }
                    FinalizeReport {
                        capture_id: handle.id(),
                        kind: handle.kind(),
                        action,
                        saved_to,
                        error: None,
                    }
                }
                Err(err) => FinalizeReport {
                    capture_id: handle.id(),
                    kind: handle.kind(),
                    action,
                    saved_to: None,
                    error: Some(err.to_string()),
                },
            }
        });
    }
}

/// Build the destination path and persist one capture
async fn save_capture<S: CaptureStrategy>(
    strategy: &S,
    paths: &dyn PathBuilder,
    handle: &CaptureHandle<S::Capture>,
    filename: &str,
) -> Result<std::path::PathBuf, CaptureError> {
    let dest = match handle.test() {
        Some(test) => paths.test_artifact(test, filename),
        None => paths.run_artifact(filename),
    }
    .map_err(|source| CaptureError::SaveFailed {
        id: handle.id(),
        path: std::path::PathBuf::from(filename),
        source,
    })?;

    strategy
        .save(handle.capture(), &dest)
        .await
        .map_err(|source| CaptureError::SaveFailed {
            id: handle.id(),
            path: dest.clone(),
            source,
        })?;

    Ok(dest)
}
