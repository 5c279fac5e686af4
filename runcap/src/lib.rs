//! Diagnostic artifact capture orchestration for automated device test runs.
//!
//! A test harness drives the [`capture::RecordingLifecycle`] through its
//! lifecycle hooks (run start, per-test before/after, run exit, or emergency
//! abort). The controller decides when captures exist and whether they are
//! persisted or discarded, delegating the actual device work to a
//! [`capture::CaptureStrategy`] and running slow save/discard I/O in the
//! background so it never blocks the next test.

// Lifecycle controller, collaborator contracts, run-scoped state
pub mod capture;

// Concrete strategies for Android devices (logcat, screenrecord, screencap)
pub mod device;

pub use capture::{
    CaptureConfig, CaptureError, CaptureStrategy, RecordingLifecycle, RetentionMode,
    RetentionPolicy,
};
