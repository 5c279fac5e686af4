// Retention policy predicates
//
// Pure decisions about whether to capture and whether to keep. No I/O here;
// the controller consults these at each lifecycle hook.

use crate::capture::config::{CaptureConfig, RetentionMode};
use crate::capture::strategy::{TestContext, TestOutcome};

/// Policy seam between configuration and the lifecycle controller.
///
/// The default method bodies encode the keep-only-failed rules; most
/// implementations only need to answer the first three questions.
pub trait RetentionPolicy: Send + Sync {
    /// Master switch for this capture kind
    fn is_enabled(&self) -> bool;

    /// Whether to record from process boot until the first test
    fn should_record_startup(&self) -> bool {
        self.is_enabled()
    }

    /// Whether to record the given test
    fn should_record_test(&self, _test: &TestContext) -> bool {
        self.is_enabled()
    }

    /// Global retention mode: discard artifacts of non-failing work
    fn keep_only_failed_artifacts(&self) -> bool {
        false
    }

    /// A startup recording is kept unless retention is failures-only and no
    /// failure has been observed yet.
    fn should_keep_startup_recording(&self, has_failing_tests: bool) -> bool {
        !(self.keep_only_failed_artifacts() && !has_failing_tests)
    }

    /// A test recording is kept unless retention is failures-only and this
    /// test did not fail.
    fn should_keep_test_recording(&self, outcome: &TestOutcome) -> bool {
        !(self.keep_only_failed_artifacts() && !outcome.failed())
    }
}

/// Retention policy driven by a [`CaptureConfig`]
#[derive(Debug, Clone)]
pub struct ConfigPolicy {
    config: CaptureConfig,
}

impl ConfigPolicy {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl RetentionPolicy for ConfigPolicy {
    fn is_enabled(&self) -> bool {
        self.config.mode != RetentionMode::None
    }

    fn should_record_startup(&self) -> bool {
        self.is_enabled() && self.config.record_startup
    }

    fn keep_only_failed_artifacts(&self) -> bool {
        self.config.mode == RetentionMode::Failing
    }
}
