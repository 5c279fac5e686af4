// Screenshot capture
//
// A screenshot is taken in full at start; there is no streaming process, so
// stop and kill have nothing to do.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::capture::handle::CaptureKind;
use crate::capture::strategy::{CaptureStrategy, TestContext};
use crate::device::adapter::DeviceAdapter;

pub struct ScreenshotStrategy {
    device: Arc<dyn DeviceAdapter>,
    counter: AtomicU64,
}

pub struct ScreenshotCapture {
    device_path: String,
}

impl ScreenshotCapture {
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl ScreenshotStrategy {
    pub fn new(device: Arc<dyn DeviceAdapter>) -> Self {
        Self {
            device,
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl CaptureStrategy for ScreenshotStrategy {
    type Capture = ScreenshotCapture;

    fn create(&self, _test: Option<&TestContext>) -> Self::Capture {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ScreenshotCapture {
            device_path: format!("/sdcard/{}.png", n),
        }
    }

    async fn start(&self, capture: &Self::Capture) -> Result<()> {
        self.device
            .shell(&["screencap", "-p", &capture.device_path])
            .await?;
        if self.device.file_size(&capture.device_path).await?.is_none() {
            bail!("screencap produced no output at {}", capture.device_path);
        }
        Ok(())
    }

    async fn stop(&self, _capture: &Self::Capture) -> Result<()> {
        // The shot is already complete
        Ok(())
    }

    async fn save(&self, capture: &Self::Capture, dest: &Path) -> Result<()> {
        self.device.pull(&capture.device_path, dest).await?;
        self.device.rm(&capture.device_path).await
    }

    async fn discard(&self, capture: &Self::Capture) -> Result<()> {
        self.device.rm(&capture.device_path).await
    }

    fn kill(&self, _capture: &Self::Capture) -> Result<()> {
        // No streaming process to tear down
        Ok(())
    }

    fn artifact_filename(&self, kind: CaptureKind) -> String {
        match kind {
            CaptureKind::Startup => "startup.png".to_string(),
            CaptureKind::Test => "test.png".to_string(),
        }
    }
}
