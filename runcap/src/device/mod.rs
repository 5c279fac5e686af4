// Device capture strategies
// Concrete CaptureStrategy implementations over a narrow device adapter

pub mod adapter;
pub mod logcat;
pub mod screenrecord;
pub mod screenshot;

pub use adapter::{AdbDevice, DeviceAdapter, DeviceProcess};
pub use logcat::LogcatStrategy;
pub use screenrecord::ScreenRecordStrategy;
pub use screenshot::ScreenshotStrategy;
