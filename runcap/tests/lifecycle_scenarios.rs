// End-to-end lifecycle scenarios driven through the public hook protocol

mod helpers;

use helpers::{ctx, failed, lifecycle, passed, ScriptedPolicy, ScriptedStrategy, StrategyCall};

use std::sync::Arc;

use runcap::capture::{CaptureKind, HandleState};

#[tokio::test]
async fn startup_recording_saved_before_first_test_under_keep_everything() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::keep_everything());

    lifecycle.on_run_start().await.unwrap();

    let startup = lifecycle.startup_handle().expect("startup handle exists");
    assert_eq!(startup.kind(), CaptureKind::Startup);
    assert_eq!(startup.state(), HandleState::Started);
    assert_eq!(lifecycle.active_handles().len(), 1);
    assert!(lifecycle.is_recording_startup());

    lifecycle.on_before_test(&ctx("first")).await.unwrap();

    // Startup stopped, save scheduled; the slot stays occupied until the
    // finalize task completes
    lifecycle.wait_for_finalizers().await;
    assert!(lifecycle.startup_handle().is_none());
    assert!(lifecycle.active_handles().iter().all(|h| h.id() != startup.id()));
    assert_eq!(startup.state(), HandleState::Finalized);
    assert_eq!(strategy.saves(), 1);
    assert_eq!(strategy.discards(), 0);

    // The startup artifact landed at the run directory root
    let saved = strategy
        .calls()
        .into_iter()
        .find_map(|c| match c {
            StrategyCall::Save(_, path) => Some(path),
            _ => None,
        })
        .unwrap();
    assert!(saved.ends_with("startup.log"));
    assert!(saved.exists());
}

#[tokio::test]
async fn startup_slot_stays_occupied_while_save_is_in_flight() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::keep_everything());
    strategy.hold_finalizers();

    lifecycle.on_run_start().await.unwrap();
    let startup = lifecycle.startup_handle().unwrap();
    lifecycle.on_before_test(&ctx("first")).await.unwrap();

    // Save scheduled but parked: still the startup recording, still active,
    // no longer current
    assert_eq!(startup.state(), HandleState::Saving);
    assert!(lifecycle.startup_handle().is_some());
    assert_eq!(lifecycle.active_handles().len(), 2, "startup + test capture");
    assert!(!lifecycle.is_recording_startup());

    strategy.release_finalizers();
    lifecycle.wait_for_finalizers().await;
    assert!(lifecycle.startup_handle().is_none());
}

#[tokio::test]
async fn startup_finalize_deferred_until_first_failure_under_failures_only() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::failures_only());

    lifecycle.on_run_start().await.unwrap();
    lifecycle.on_before_test(&ctx("first")).await.unwrap();

    // No failure yet: the startup recording is stopped but neither saved nor
    // discarded
    let startup = lifecycle.startup_handle().expect("still pending finalize");
    assert_eq!(startup.state(), HandleState::Stopped);
    assert_eq!(strategy.saves() + strategy.discards(), 0);

    lifecycle.on_after_test(&failed("first")).await.unwrap();
    lifecycle.wait_for_finalizers().await;

    // The failure made the startup recording eligible
    assert!(lifecycle.has_failing_tests());
    assert!(lifecycle.startup_handle().is_none());
    assert_eq!(startup.state(), HandleState::Finalized);
    assert!(strategy
        .calls()
        .iter()
        .any(|c| matches!(c, StrategyCall::Save(serial, _) if *serial == 0)));
}

#[tokio::test]
async fn passing_test_recording_discarded_under_failures_only() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let policy = ScriptedPolicy {
        record_startup: false,
        ..ScriptedPolicy::failures_only()
    };
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), policy);

    lifecycle.on_run_start().await.unwrap();
    assert!(lifecycle.startup_handle().is_none());

    lifecycle.on_before_test(&ctx("steady")).await.unwrap();
    let test_handle = lifecycle.current_handle().expect("test capture running");
    assert_eq!(test_handle.kind(), CaptureKind::Test);
    assert_eq!(test_handle.state(), HandleState::Started);

    lifecycle.on_after_test(&passed("steady")).await.unwrap();
    assert!(lifecycle.current_handle().is_none());

    lifecycle.wait_for_finalizers().await;
    assert_eq!(strategy.saves(), 0);
    assert_eq!(strategy.discards(), 1);
    assert_eq!(test_handle.state(), HandleState::Finalized);
    assert!(lifecycle.active_handles().is_empty());
}

#[tokio::test]
async fn failing_test_recording_saved_into_test_directory() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let policy = ScriptedPolicy {
        record_startup: false,
        ..ScriptedPolicy::failures_only()
    };
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), policy);

    lifecycle.on_run_start().await.unwrap();
    lifecycle.on_before_test(&ctx("broken")).await.unwrap();
    lifecycle.on_after_test(&failed("broken")).await.unwrap();
    lifecycle.on_run_exit().await.unwrap();
    lifecycle.wait_for_finalizers().await;

    let saved = strategy
        .calls()
        .into_iter()
        .find_map(|c| match c {
            StrategyCall::Save(_, path) => Some(path),
            _ => None,
        })
        .expect("failing test artifact saved");
    assert!(saved.ends_with("test.log"));
    assert!(saved
        .parent()
        .unwrap()
        .to_string_lossy()
        .contains("suite > broken"));

    // Saved artifacts are indexed in the manifest
    let manifest = lifecycle.manifest();
    let manifest = manifest.lock().unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(
        manifest.artifacts[0].test_full_name.as_deref(),
        Some("suite > broken")
    );
}

#[tokio::test]
async fn startup_discarded_at_run_exit_when_nothing_failed() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::failures_only());

    lifecycle.on_run_start().await.unwrap();
    lifecycle.on_before_test(&ctx("fine")).await.unwrap();
    lifecycle.on_after_test(&passed("fine")).await.unwrap();

    // Still pending: a later test could fail
    assert!(lifecycle.startup_handle().is_some());

    lifecycle.on_run_exit().await.unwrap();
    lifecycle.wait_for_finalizers().await;

    assert!(lifecycle.startup_handle().is_none());
    assert!(strategy
        .calls()
        .iter()
        .any(|c| matches!(c, StrategyCall::Discard(0))));
    // The passing test's capture was discarded too; nothing was saved
    assert_eq!(strategy.saves(), 0);
}

#[tokio::test]
async fn run_without_tests_still_finalizes_startup_at_exit() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::keep_everything());

    lifecycle.on_run_start().await.unwrap();
    lifecycle.on_run_exit().await.unwrap();
    lifecycle.wait_for_finalizers().await;

    assert_eq!(strategy.saves(), 1);
    assert!(lifecycle.startup_handle().is_none());
    assert!(lifecycle.active_handles().is_empty());
}

#[tokio::test]
async fn disabled_startup_policy_never_creates_a_startup_handle() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let policy = ScriptedPolicy {
        record_startup: false,
        ..ScriptedPolicy::keep_everything()
    };
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), policy);

    lifecycle.on_run_start().await.unwrap();
    lifecycle.on_before_test(&ctx("one")).await.unwrap();
    lifecycle.on_after_test(&passed("one")).await.unwrap();
    lifecycle.on_run_exit().await.unwrap();
    lifecycle.wait_for_finalizers().await;

    assert!(lifecycle.startup_handle().is_none());
    assert!(lifecycle
        .recordings()
        .iter()
        .all(|h| h.kind() == CaptureKind::Test));
}

#[tokio::test]
async fn no_handle_is_both_saved_and_discarded_across_a_mixed_run() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::failures_only());

    lifecycle.on_run_start().await.unwrap();
    for (name, outcome) in [
        ("a", passed("a")),
        ("b", failed("b")),
        ("c", passed("c")),
        ("d", failed("d")),
    ] {
        lifecycle.on_before_test(&ctx(name)).await.unwrap();
        lifecycle.on_after_test(&outcome).await.unwrap();
    }
    lifecycle.on_run_exit().await.unwrap();
    lifecycle.wait_for_finalizers().await;

    // Each handle finalized exactly once, as either save or discard
    let calls = strategy.calls();
    for handle in lifecycle.recordings() {
        let saves = calls
            .iter()
            .filter(|c| matches!(c, StrategyCall::Save(s, _) if *s == handle.id()))
            .count();
        let discards = calls
            .iter()
            .filter(|c| matches!(c, StrategyCall::Discard(s) if *s == handle.id()))
            .count();
        assert_eq!(
            saves + discards,
            1,
            "capture {} finalized exactly once",
            handle.id()
        );
        assert_eq!(handle.state(), HandleState::Finalized);
    }

    // startup + b + d kept; a + c dropped
    assert_eq!(strategy.saves(), 3);
    assert_eq!(strategy.discards(), 2);
    assert!(lifecycle.active_handles().is_empty());
}

#[tokio::test]
async fn current_recording_tracks_only_the_open_phase() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::keep_everything());

    assert!(lifecycle.current_handle().is_none());

    lifecycle.on_run_start().await.unwrap();
    assert_eq!(
        lifecycle.current_handle().map(|h| h.kind()),
        Some(CaptureKind::Startup)
    );

    lifecycle.on_before_test(&ctx("t")).await.unwrap();
    assert_eq!(
        lifecycle.current_handle().map(|h| h.kind()),
        Some(CaptureKind::Test)
    );

    lifecycle.on_after_test(&passed("t")).await.unwrap();
    assert!(lifecycle.current_handle().is_none());

    lifecycle.on_run_exit().await.unwrap();
    assert!(lifecycle.current_handle().is_none());
    lifecycle.wait_for_finalizers().await;
}

#[tokio::test]
async fn start_failure_propagates_and_leaves_no_foreground_state() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let policy = ScriptedPolicy {
        record_startup: false,
        ..ScriptedPolicy::keep_everything()
    };
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), policy);

    lifecycle.on_run_start().await.unwrap();

    strategy.fail_next_start();
    let err = lifecycle.on_before_test(&ctx("t")).await.unwrap_err();
    assert!(err.to_string().contains("failed to start test capture"));

    // Treated as never having happened for state tracking, but kept in
    // history for audit
    assert!(lifecycle.current_handle().is_none());
    assert!(lifecycle.active_handles().is_empty());
    assert_eq!(lifecycle.recordings().len(), 1);
    assert_eq!(lifecycle.recordings()[0].state(), HandleState::Created);

    // The next test proceeds normally
    lifecycle.on_before_test(&ctx("u")).await.unwrap();
    lifecycle.on_after_test(&passed("u")).await.unwrap();
    lifecycle.wait_for_finalizers().await;
    assert_eq!(strategy.saves(), 1);
}

#[tokio::test]
async fn failed_save_still_settles_and_reports() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let policy = ScriptedPolicy {
        record_startup: false,
        ..ScriptedPolicy::keep_everything()
    };
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), policy);
    let mut reports = lifecycle.subscribe_finalize();

    lifecycle.on_run_start().await.unwrap();
    lifecycle.on_before_test(&ctx("t")).await.unwrap();
    strategy.fail_next_save();
    lifecycle.on_after_test(&passed("t")).await.unwrap();
    lifecycle.wait_for_finalizers().await;

    let report = reports.recv().await.unwrap();
    assert!(!report.succeeded());
    assert!(report.error.as_deref().unwrap().contains("device pull failed"));

    // The handle still left the active set; nothing will retry it
    assert!(lifecycle.active_handles().is_empty());
    let manifest = lifecycle.manifest();
    assert!(manifest.lock().unwrap().is_empty());
}

#[tokio::test]
async fn app_launch_is_forwarded_without_state_changes() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let (mut lifecycle, _temp) = lifecycle(strategy.clone(), ScriptedPolicy::keep_everything());

    lifecycle.on_run_start().await.unwrap();
    let before = lifecycle.active_handles().len();

    lifecycle.on_app_launch(&runcap::capture::AppLaunchRef {
        bundle_id: "com.example.app".into(),
        process_id: 1234,
    });

    assert_eq!(lifecycle.active_handles().len(), before);
    assert!(lifecycle.is_recording_startup());
    assert!(strategy
        .calls()
        .iter()
        .any(|c| matches!(c, StrategyCall::AppLaunch(b) if b == "com.example.app")));

    lifecycle.on_run_exit().await.unwrap();
    lifecycle.wait_for_finalizers().await;
}
