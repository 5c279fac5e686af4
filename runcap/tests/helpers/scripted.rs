// Scripted capture strategy
//
// Records every strategy call so tests can assert on the exact sequence the
// controller drives, with switches for start failures, save failures, and
// holding finalize tasks open (to observe mid-save state).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::watch;

use runcap::capture::{AppLaunchRef, CaptureKind, CaptureStrategy, TestContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyCall {
    Create(u64),
    Start(u64),
    Stop(u64),
    Save(u64, PathBuf),
    Discard(u64),
    Kill(u64),
    AppLaunch(String),
}

pub struct ScriptedCapture {
    pub serial: u64,
}

pub struct ScriptedStrategy {
    calls: Mutex<Vec<StrategyCall>>,
    next_serial: AtomicU64,
    fail_next_start: AtomicBool,
    fail_next_save: AtomicBool,
    hold_tx: watch::Sender<bool>,
}

impl Default for ScriptedStrategy {
    fn default() -> Self {
        let (hold_tx, _) = watch::channel(false);
        Self {
            calls: Mutex::new(Vec::new()),
            next_serial: AtomicU64::new(0),
            fail_next_start: AtomicBool::new(false),
            fail_next_save: AtomicBool::new(false),
            hold_tx,
        }
    }
}

impl ScriptedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StrategyCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matcher: impl Fn(&StrategyCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matcher(*c))
            .count()
    }

    pub fn saves(&self) -> usize {
        self.count(|c| matches!(c, StrategyCall::Save(..)))
    }

    pub fn discards(&self) -> usize {
        self.count(|c| matches!(c, StrategyCall::Discard(..)))
    }

    pub fn kills(&self) -> usize {
        self.count(|c| matches!(c, StrategyCall::Kill(..)))
    }

    /// Make the next start call fail
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Make the next save call fail (after it gets past any hold)
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Park save/discard calls until released, keeping finalize tasks
    /// observably in flight
    pub fn hold_finalizers(&self) {
        self.hold_tx.send_replace(true);
    }

    pub fn release_finalizers(&self) {
        self.hold_tx.send_replace(false);
    }

    fn record(&self, call: StrategyCall) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait_released(&self) {
        let mut rx = self.hold_tx.subscribe();
        let _ = rx.wait_for(|held| !held).await;
    }
}

#[async_trait]
impl CaptureStrategy for ScriptedStrategy {
    type Capture = ScriptedCapture;

    fn create(&self, _test: Option<&TestContext>) -> Self::Capture {
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        self.record(StrategyCall::Create(serial));
        ScriptedCapture { serial }
    }

    async fn start(&self, capture: &Self::Capture) -> Result<()> {
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            bail!("capture backend unavailable");
        }
        self.record(StrategyCall::Start(capture.serial));
        Ok(())
    }

    async fn stop(&self, capture: &Self::Capture) -> Result<()> {
        self.record(StrategyCall::Stop(capture.serial));
        Ok(())
    }

    async fn save(&self, capture: &Self::Capture, dest: &Path) -> Result<()> {
        self.wait_released().await;
        self.record(StrategyCall::Save(capture.serial, dest.to_path_buf()));
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            bail!("device pull failed");
        }
        std::fs::write(dest, b"artifact")?;
        Ok(())
    }

    async fn discard(&self, capture: &Self::Capture) -> Result<()> {
        self.wait_released().await;
        self.record(StrategyCall::Discard(capture.serial));
        Ok(())
    }

    fn kill(&self, capture: &Self::Capture) -> Result<()> {
        self.record(StrategyCall::Kill(capture.serial));
        Ok(())
    }

    fn on_app_launch(&self, app: &AppLaunchRef) {
        self.record(StrategyCall::AppLaunch(app.bundle_id.clone()));
    }

    fn artifact_filename(&self, kind: CaptureKind) -> String {
        match kind {
            CaptureKind::Startup => "startup.log".to_string(),
            CaptureKind::Test => "test.log".to_string(),
        }
    }
}

/// Policy with each predicate pinned by the test
#[derive(Debug, Clone, Copy)]
pub struct ScriptedPolicy {
    pub enabled: bool,
    pub record_startup: bool,
    pub only_failed: bool,
}

impl ScriptedPolicy {
    pub fn keep_everything() -> Self {
        Self {
            enabled: true,
            record_startup: true,
            only_failed: false,
        }
    }

    pub fn failures_only() -> Self {
        Self {
            enabled: true,
            record_startup: true,
            only_failed: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            record_startup: false,
            only_failed: false,
        }
    }
}

impl runcap::capture::RetentionPolicy for ScriptedPolicy {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn should_record_startup(&self) -> bool {
        self.enabled && self.record_startup
    }

    fn keep_only_failed_artifacts(&self) -> bool {
        self.only_failed
    }
}
