//! Orchestrator tests for the forward path: apply, persist, restart, commit.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt as _;
use tempfile::TempDir;
use tokio::sync::Notify;
use update_agent::domain::{
    ApplyOutcome, ApplyState, DownloadError, Severity, UpdateError,
};
use update_agent::infra::state::FileUpdateStore;

use crate::mocks::{
    Events, Fixture, MockDownloader, MockSupervisor, full_manifest, level_only, manifest,
    plugin_manifest,
};

#[tokio::test]
async fn test_apply_full_manifest_from_41_commits_42() {
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        ..Fixture::default()
    }
    .build();
    let events = orchestrator.ports().catalog.events();

    let outcome = orchestrator
        .apply_updates(Some(full_manifest(42)), false)
        .await
        .expect("apply");

    assert_eq!(outcome, ApplyOutcome::Committed { level: 42 });
    assert!(outcome.started());

    // Every download and the deletion finish before the snapshot.
    let snapshot = events.position("snapshot");
    assert!(events.position("download jenkins.war") < snapshot);
    assert!(events.position("download git.hpi") < snapshot);
    assert!(events.position("remove-plugins legacy") < snapshot);
    // snapshot → save → restart → health-check, then the flag is cleared.
    assert!(snapshot < events.position("save 42"));
    assert!(events.position("save 42") < events.position("restart jenkins"));
    assert!(events.position("restart jenkins") < events.position("health-check"));
    assert!(events.position("health-check") < events.position("clear-restart-flag"));

    let labels = orchestrator.ports().snapshots.labels.lock().unwrap().clone();
    assert_eq!(
        labels,
        vec!["UL41->UL42 Snapshot after downloads completed, before restart".to_string()]
    );
    assert_eq!(orchestrator.current_level().await, 42);
    assert_eq!(orchestrator.state(), ApplyState::Idle);
    assert!(orchestrator.in_progress_since().is_none());
}

#[tokio::test]
async fn test_apply_publishes_progress_notifications_in_order() {
    let orchestrator = Fixture::default().build();

    orchestrator
        .apply_updates(Some(plugin_manifest(3)), false)
        .await
        .expect("apply");

    let texts = orchestrator.ports().notifier.texts();
    assert_eq!(
        texts,
        vec![
            "Starting to apply updates".to_string(),
            "All downloads completed, snapshotting data before restart".to_string(),
            "All downloads completed and snapshotting done, restarting jenkins".to_string(),
            "jenkins is being restarted, health checking!".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_apply_level_only_manifest_persists_without_restart() {
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        ..Fixture::default()
    }
    .build();
    let events = orchestrator.ports().catalog.events();

    let outcome = orchestrator
        .apply_updates(Some(level_only(42)), false)
        .await
        .expect("apply");

    assert_eq!(outcome, ApplyOutcome::UpToDate { level: 42 });
    assert_eq!(*orchestrator.ports().store.saved.lock().unwrap(), vec![42]);
    assert_eq!(events.count("restart"), 0);
    assert_eq!(events.count("snapshot"), 0);
    assert_eq!(events.count("health-check"), 0);
}

#[tokio::test]
async fn test_apply_without_manifest_is_not_started() {
    let orchestrator = Fixture::default().build();
    let events = orchestrator.ports().catalog.events();

    let outcome = orchestrator.apply_updates(None, false).await.expect("apply");

    assert_eq!(outcome, ApplyOutcome::NotStarted);
    assert!(!outcome.started());
    assert!(events.all().is_empty());
    assert!(orchestrator.ports().notifier.texts().is_empty());
}

#[tokio::test]
async fn test_concurrent_apply_returns_not_started_and_changes_nothing() {
    let events = Events::default();
    let started = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let orchestrator = Fixture {
        events: events.clone(),
        downloader: Some(MockDownloader::new(events.clone()).gated(started.clone(), gate.clone())),
        ..Fixture::default()
    }
    .build();

    let first = orchestrator.apply_updates(Some(plugin_manifest(42)), false);
    let second = async {
        started.notified().await;
        assert_eq!(orchestrator.state(), ApplyState::AwaitingDownloads);
        assert!(orchestrator.in_progress_since().is_some());
        let outcome = orchestrator
            .apply_updates(Some(full_manifest(43)), false)
            .await;
        gate.notify_one();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(second.expect("second"), ApplyOutcome::NotStarted);
    assert_eq!(first.expect("first"), ApplyOutcome::Committed { level: 42 });
    // Only the first cycle's work happened.
    assert_eq!(events.count("download"), 1);
    assert_eq!(events.count("remove-plugins"), 0);
    assert_eq!(*orchestrator.ports().store.saved.lock().unwrap(), vec![42]);
    assert!(orchestrator.in_progress_since().is_none());
}

#[tokio::test]
async fn test_forced_apply_joining_a_cycle_keeps_marker_until_both_end() {
    let events = Events::default();
    let started = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let orchestrator = Fixture {
        events: events.clone(),
        downloader: Some(MockDownloader::new(events.clone()).gated(started.clone(), gate.clone())),
        ..Fixture::default()
    }
    .build();

    let first = orchestrator.apply_updates(Some(plugin_manifest(42)), false);
    let forced = async {
        started.notified().await;
        let since = orchestrator.in_progress_since();
        let outcome = orchestrator
            .apply_updates(Some(level_only(41)), true)
            .await;
        // The first cycle is still running: the marker stays set.
        assert_eq!(orchestrator.in_progress_since(), since);
        assert!(since.is_some());
        assert_ne!(orchestrator.state(), ApplyState::Idle);
        assert_eq!(
            orchestrator.apply_updates(Some(level_only(50)), false).await.expect("guarded"),
            ApplyOutcome::NotStarted
        );
        gate.notify_one();
        outcome
    };
    let (first, forced) = tokio::join!(first, forced);

    assert_eq!(forced.expect("forced"), ApplyOutcome::UpToDate { level: 41 });
    assert_eq!(first.expect("first"), ApplyOutcome::Committed { level: 42 });
    assert!(orchestrator.in_progress_since().is_none());
    assert_eq!(orchestrator.state(), ApplyState::Idle);
    assert_eq!(events.count("clear-restart-flag"), 2);
}

#[tokio::test]
async fn test_panicking_cycle_still_clears_flag_and_marker() {
    let events = Events::default();
    let orchestrator = Fixture {
        events: events.clone(),
        supervisor: Some(MockSupervisor::new(events.clone()).panicking_restart()),
        ..Fixture::default()
    }
    .build();

    let result = AssertUnwindSafe(orchestrator.apply_updates(Some(plugin_manifest(42)), false))
        .catch_unwind()
        .await;

    assert!(result.is_err());
    assert_eq!(events.count("clear-restart-flag"), 1);
    assert!(orchestrator.in_progress_since().is_none());
    assert_eq!(orchestrator.state(), ApplyState::Idle);

    let next = orchestrator
        .apply_updates(Some(level_only(43)), false)
        .await
        .expect("next cycle");
    assert_eq!(next, ApplyOutcome::UpToDate { level: 43 });
}

#[tokio::test]
async fn test_apply_after_cycle_ends_is_accepted() {
    let orchestrator = Fixture::default().build();

    let first = orchestrator
        .apply_updates(Some(plugin_manifest(1)), false)
        .await
        .expect("first");
    let second = orchestrator
        .apply_updates(Some(plugin_manifest(2)), false)
        .await
        .expect("second");

    assert_eq!(first, ApplyOutcome::Committed { level: 1 });
    assert_eq!(second, ApplyOutcome::Committed { level: 2 });
}

#[tokio::test]
async fn test_download_failure_fails_cycle_before_persisting() {
    let events = Events::default();
    let orchestrator = Fixture {
        events: events.clone(),
        current: Some(level_only(41)),
        downloader: Some(MockDownloader::new(events.clone()).failing("git.hpi")),
        ..Fixture::default()
    }
    .build();

    let err = orchestrator
        .apply_updates(Some(full_manifest(42)), false)
        .await
        .expect_err("checksum mismatch fails the cycle");

    assert!(matches!(
        err,
        UpdateError::Download(DownloadError::ChecksumMismatch { .. })
    ));
    // Sibling downloads still ran to completion.
    assert_eq!(events.count("download"), 2);
    assert!(orchestrator.ports().store.saved.lock().unwrap().is_empty());
    assert_eq!(events.count("snapshot"), 0);
    assert_eq!(events.count("restart"), 0);
    assert_eq!(events.count("clear-restart-flag"), 1);
    assert_eq!(orchestrator.current_level().await, 41);
    assert_eq!(orchestrator.state(), ApplyState::Idle);
    assert!(
        !orchestrator
            .ports()
            .notifier
            .with_severity(Severity::Error)
            .is_empty()
    );

    // The marker was released: the next cycle runs.
    let retry = orchestrator
        .apply_updates(Some(level_only(42)), false)
        .await
        .expect("retry");
    assert_eq!(retry, ApplyOutcome::UpToDate { level: 42 });
}

#[tokio::test]
async fn test_apply_unsafe_artifact_id_is_validation_error() {
    let orchestrator = Fixture::default().build();
    let bad = manifest(serde_json::json!({
        "plugins": { "updates": [{ "url": "https://x.example/a.hpi", "artifactId": "../evil" }] },
        "meta": { "level": 5 }
    }));

    let err = orchestrator
        .apply_updates(Some(bad), false)
        .await
        .expect_err("rejected");

    assert!(matches!(err, UpdateError::Validation(_)));
    assert_eq!(orchestrator.ports().catalog.events().count("download"), 0);
    assert!(orchestrator.ports().store.saved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_current_level_moves_from_0_to_42_with_one_audit_line() {
    let home = TempDir::new().expect("tempdir");
    let store = FileUpdateStore::new(home.path());
    let audit_log = store.audit_log_path();
    let orchestrator = Fixture::default().build_with_store(store);

    assert_eq!(orchestrator.current_level().await, 0);

    orchestrator
        .save(Some(&level_only(42)))
        .await
        .expect("save");

    assert_eq!(orchestrator.current_level().await, 42);
    let log = std::fs::read_to_string(audit_log).expect("audit log");
    assert_eq!(log.lines().count(), 1);
    let entry: serde_json::Value = serde_json::from_str(log.trim()).expect("json");
    assert_eq!(entry["updateLevel"], 42);
    assert!(entry["timestamp"].is_string());
}

#[tokio::test]
async fn test_save_without_manifest_is_validation_error() {
    let orchestrator = Fixture::default().build();
    let err = orchestrator.save(None).await.expect_err("required");
    assert_eq!(err.to_string(), "Update Manifest is required!");
}

#[tokio::test]
async fn test_taint_level_defaults_to_current_level() {
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        ..Fixture::default()
    }
    .build();

    orchestrator.taint_level(None).await.expect("taint current");
    orchestrator.taint_level(Some(7)).await.expect("taint explicit");

    assert_eq!(*orchestrator.ports().catalog.taints.lock().unwrap(), vec![41, 7]);
}

#[tokio::test]
async fn test_query_sends_current_level() {
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        catalog_responses: vec![plugin_manifest(42)],
        ..Fixture::default()
    }
    .build();

    let manifest = orchestrator.query().await.expect("query");

    assert_eq!(manifest.level(), 42);
    assert_eq!(*orchestrator.ports().catalog.queried_levels.lock().unwrap(), vec![41]);
}

#[tokio::test]
async fn test_prepare_initialises_snapshots_for_primary_dir() {
    let orchestrator = Fixture::default().build();
    orchestrator.prepare().await.expect("prepare");
    assert_eq!(
        orchestrator.ports().catalog.events().all(),
        vec!["snapshot-init /srv/instance".to_string()]
    );
}
