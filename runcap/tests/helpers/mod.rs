// Shared fixtures for lifecycle integration tests
#![allow(dead_code)]

pub mod scripted;

pub use scripted::{ScriptedPolicy, ScriptedStrategy, StrategyCall};

use std::sync::Arc;

use runcap::capture::{ArtifactPaths, RecordingLifecycle, TestContext, TestOutcome, TestStatus};
use tempfile::TempDir;

/// Opt-in test logging via RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Controller over a scripted strategy with artifacts in a temp directory
pub fn lifecycle(
    strategy: Arc<ScriptedStrategy>,
    policy: ScriptedPolicy,
) -> (RecordingLifecycle<ScriptedStrategy>, TempDir) {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let paths = Arc::new(ArtifactPaths::new(temp.path().join("run")));
    (
        RecordingLifecycle::new(strategy, Arc::new(policy), paths),
        temp,
    )
}

pub fn ctx(name: &str) -> TestContext {
    TestContext::new(name, format!("suite > {}", name))
}

pub fn passed(name: &str) -> TestOutcome {
    TestOutcome::new(ctx(name), TestStatus::Passed)
}

pub fn failed(name: &str) -> TestOutcome {
    TestOutcome::new(ctx(name), TestStatus::Failed)
}
