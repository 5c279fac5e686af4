// Device access for capture strategies
//
// Wraps the adb CLI behind a narrow async trait so strategies can be tested
// against a scripted device. The lifecycle controller never touches this
// layer directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};

/// How long to wait for a process to exit after an interrupt
const INTERRUPT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Narrow device surface consumed by capture strategies
#[async_trait]
pub trait DeviceAdapter: Send + Sync + 'static {
    /// Run a shell command on the device and collect its trimmed stdout
    async fn shell(&self, args: &[&str]) -> Result<String>;

    /// Start a long-running shell command on the device
    async fn spawn_shell(&self, args: &[&str]) -> Result<DeviceProcess>;

    /// Transfer a file off the device
    async fn pull(&self, remote: &str, local: &Path) -> Result<()>;

    /// Remove a file on the device
    async fn rm(&self, remote: &str) -> Result<()>;

    /// Size of an on-device file, or None while it does not exist
    async fn file_size(&self, remote: &str) -> Result<Option<u64>>;

    /// Whether some process still holds the on-device file open
    async fn is_file_open(&self, remote: &str) -> Result<bool>;
}

/// A long-running process started through the adapter
pub struct DeviceProcess {
    child: Child,
    pid: Option<u32>,
}

impl DeviceProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Graceful stop: SIGINT lets the remote tool flush and close its
    /// output, then wait (bounded) for the process to exit.
    pub async fn interrupt(mut self) -> Result<()> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            unsafe { libc::kill(pid as i32, libc::SIGINT) };
        }
        #[cfg(not(unix))]
        let _ = self.child.start_kill();

        let _ = tokio::time::timeout(INTERRUPT_WAIT_TIMEOUT, self.child.wait()).await;
        Ok(())
    }

    /// Forceful synchronous teardown for emergency exit. Never blocks on the
    /// process actually exiting.
    #[cfg(unix)]
    pub fn kill_now(&self) {
        if let Some(pid) = self.pid {
            unsafe { libc::kill(pid as i32, libc::SIGKILL) };
        }
    }

    #[cfg(not(unix))]
    pub fn kill_now(&self) {}
}

/// Device adapter backed by the adb CLI
pub struct AdbDevice {
    serial: String,
    adb: PathBuf,
}

impl AdbDevice {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            adb: default_adb_path(),
        }
    }

    pub fn with_adb(mut self, adb: impl Into<PathBuf>) -> Self {
        self.adb = adb.into();
        self
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.adb);
        cmd.arg("-s").arg(&self.serial);
        cmd
    }
}

#[async_trait]
impl DeviceAdapter for AdbDevice {
    async fn shell(&self, args: &[&str]) -> Result<String> {
        let output = self
            .command()
            .arg("shell")
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run adb shell {:?}", args))?;

        if !output.status.success() {
            bail!(
                "adb shell {:?} exited with {}: {}",
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn spawn_shell(&self, args: &[&str]) -> Result<DeviceProcess> {
        let child = self
            .command()
            .arg("shell")
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn adb shell {:?}", args))?;

        Ok(DeviceProcess::new(child))
    }

    async fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        let output = self
            .command()
            .arg("pull")
            .arg(remote)
            .arg(local)
            .output()
            .await
            .with_context(|| format!("Failed to run adb pull {}", remote))?;

        if !output.status.success() {
            bail!(
                "adb pull {} exited with {}: {}",
                remote,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn rm(&self, remote: &str) -> Result<()> {
        self.shell(&["rm", "-f", remote]).await.map(|_| ())
    }

    async fn file_size(&self, remote: &str) -> Result<Option<u64>> {
        // stat exits non-zero while the file does not exist yet
        match self.shell(&["stat", "-c", "%s", remote]).await {
            Ok(out) => Ok(out.parse::<u64>().ok()),
            Err(_) => Ok(None),
        }
    }

    async fn is_file_open(&self, remote: &str) -> Result<bool> {
        match self.shell(&["lsof", remote]).await {
            Ok(out) => Ok(out.contains(remote)),
            Err(_) => Ok(false),
        }
    }
}

/// ANDROID_HOME/platform-tools/adb when set, otherwise rely on PATH
fn default_adb_path() -> PathBuf {
    if let Ok(home) = std::env::var("ANDROID_HOME") {
        return PathBuf::from(home).join("platform-tools").join("adb");
    }
    PathBuf::from("adb")
}
