// Screen recording capture
//
// Runs screenrecord into an on-device mp4. Stop interrupts the recorder,
// which finalizes the file on SIGINT; only emergency kill uses SIGKILL and
// accepts a corrupt artifact.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::time::Instant;

use crate::capture::handle::CaptureKind;
use crate::capture::strategy::{CaptureStrategy, TestContext};
use crate::device::adapter::{DeviceAdapter, DeviceProcess};

const CREATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CREATE_POLL_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ScreenRecordStrategy {
    device: Arc<dyn DeviceAdapter>,
    counter: AtomicU64,
}

pub struct ScreenRecordCapture {
    device_path: String,
    process: Mutex<Option<DeviceProcess>>,
}

impl ScreenRecordCapture {
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl ScreenRecordStrategy {
    pub fn new(device: Arc<dyn DeviceAdapter>) -> Self {
        Self {
            device,
            counter: AtomicU64::new(0),
        }
    }

    async fn wait_until_created(&self, capture: &ScreenRecordCapture) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.device.file_size(&capture.device_path).await?.is_some() {
                return Ok(());
            }
            if started.elapsed() >= CREATE_POLL_TIMEOUT {
                bail!(
                    "screenrecord output {} not created within {:?}",
                    capture.device_path,
                    CREATE_POLL_TIMEOUT
                );
            }
            tokio::time::sleep(CREATE_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl CaptureStrategy for ScreenRecordStrategy {
    type Capture = ScreenRecordCapture;

    fn create(&self, _test: Option<&TestContext>) -> Self::Capture {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ScreenRecordCapture {
            device_path: format!("/sdcard/{}.mp4", n),
            process: Mutex::new(None),
        }
    }

    async fn start(&self, capture: &Self::Capture) -> Result<()> {
        let process = self
            .device
            .spawn_shell(&["screenrecord", &capture.device_path])
            .await?;
        *capture.process.lock().unwrap() = Some(process);
        self.wait_until_created(capture).await
    }

    async fn stop(&self, capture: &Self::Capture) -> Result<()> {
        let process = capture.process.lock().unwrap().take();
        match process {
            Some(process) => process.interrupt().await,
            None => Ok(()),
        }
    }

    async fn save(&self, capture: &Self::Capture, dest: &Path) -> Result<()> {
        self.device.pull(&capture.device_path, dest).await?;
        self.device.rm(&capture.device_path).await
    }

    async fn discard(&self, capture: &Self::Capture) -> Result<()> {
        self.device.rm(&capture.device_path).await
    }

    fn kill(&self, capture: &Self::Capture) -> Result<()> {
        if let Some(process) = capture.process.lock().unwrap().take() {
            process.kill_now();
        }
        Ok(())
    }

    fn artifact_filename(&self, kind: CaptureKind) -> String {
        match kind {
            CaptureKind::Startup => "startup.mp4".to_string(),
            CaptureKind::Test => "test.mp4".to_string(),
        }
    }
}
