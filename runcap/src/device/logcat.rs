// Device log capture
//
// Streams logcat into an on-device file for the duration of a recording,
// optionally filtered to the app process announced via on_app_launch. Save
// pulls the file off the device once logcat has released it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::capture::handle::CaptureKind;
use crate::capture::strategy::{AppLaunchRef, CaptureStrategy, TestContext};
use crate::device::adapter::{DeviceAdapter, DeviceProcess};

const CREATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CREATE_POLL_TIMEOUT: Duration = Duration::from_secs(15);
const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RELEASE_POLL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LogcatStrategy {
    device: Arc<dyn DeviceAdapter>,
    /// Allocates distinct on-device log paths within a run
    counter: AtomicU64,
    /// Identity of the most recently launched app process
    launch: Mutex<Option<AppLaunchRef>>,
}

/// One in-flight or completed logcat recording
pub struct LogcatCapture {
    device_path: String,
    /// Process filter snapshotted at creation time
    pid_filter: Option<u32>,
    process: Mutex<Option<DeviceProcess>>,
}

impl LogcatCapture {
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl LogcatStrategy {
    pub fn new(device: Arc<dyn DeviceAdapter>) -> Self {
        Self {
            device,
            counter: AtomicU64::new(0),
            launch: Mutex::new(None),
        }
    }

    /// Logcat buffers output; the recording only counts as active once the
    /// on-device file exists.
    async fn wait_until_created(&self, capture: &LogcatCapture) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.device.file_size(&capture.device_path).await?.is_some() {
                return Ok(());
            }
            if started.elapsed() >= CREATE_POLL_TIMEOUT {
                bail!(
                    "logcat output {} not created within {:?}",
                    capture.device_path,
                    CREATE_POLL_TIMEOUT
                );
            }
            tokio::time::sleep(CREATE_POLL_INTERVAL).await;
        }
    }

    /// After an interrupt, logcat may briefly keep the file open while it
    /// flushes. Pulling before release yields a truncated artifact.
    async fn wait_until_released(&self, capture: &LogcatCapture) -> Result<()> {
        let started = Instant::now();
        while self.device.is_file_open(&capture.device_path).await? {
            if started.elapsed() >= RELEASE_POLL_TIMEOUT {
                bail!(
                    "logcat did not release {} within {:?}",
                    capture.device_path,
                    RELEASE_POLL_TIMEOUT
                );
            }
            tokio::time::sleep(RELEASE_POLL_INTERVAL).await;
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureStrategy for LogcatStrategy {
    type Capture = LogcatCapture;

    fn create(&self, _test: Option<&TestContext>) -> Self::Capture {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        LogcatCapture {
            device_path: format!("/sdcard/{}.log", n),
            pid_filter: self.launch.lock().unwrap().as_ref().map(|l| l.process_id),
            process: Mutex::new(None),
        }
    }

    async fn start(&self, capture: &Self::Capture) -> Result<()> {
        // -T takes the device's own clock, not the host's
        let since = self.device.shell(&["date", "+%Y-%m-%d %H:%M:%S.000"]).await?;

        let mut args: Vec<String> = vec![
            "logcat".into(),
            "-f".into(),
            capture.device_path.clone(),
            "-T".into(),
            since,
        ];
        if let Some(pid) = capture.pid_filter {
            args.push("--pid".into());
            args.push(pid.to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let process = self.device.spawn_shell(&arg_refs).await?;
        *capture.process.lock().unwrap() = Some(process);

        self.wait_until_created(capture).await
    }

    async fn stop(&self, capture: &Self::Capture) -> Result<()> {
        let process = capture.process.lock().unwrap().take();
        match process {
            Some(process) => process.interrupt().await,
            // Already stopped
            None => Ok(()),
        }
    }

    async fn save(&self, capture: &Self::Capture, dest: &Path) -> Result<()> {
        self.wait_until_released(capture).await?;
        self.device.pull(&capture.device_path, dest).await?;
        self.device.rm(&capture.device_path).await
    }

    async fn discard(&self, capture: &Self::Capture) -> Result<()> {
        self.wait_until_released(capture).await?;
        self.device.rm(&capture.device_path).await
    }

    fn kill(&self, capture: &Self::Capture) -> Result<()> {
        if let Some(process) = capture.process.lock().unwrap().take() {
            process.kill_now();
        }
        Ok(())
    }

    fn on_app_launch(&self, app: &AppLaunchRef) {
        debug!(bundle = %app.bundle_id, pid = app.process_id, "filtering logcat by app process");
        *self.launch.lock().unwrap() = Some(app.clone());
    }

    fn artifact_filename(&self, kind: CaptureKind) -> String {
        match kind {
            CaptureKind::Startup => "startup.log".to_string(),
            CaptureKind::Test => "test.log".to_string(),
        }
    }
}
