//! Orchestrator tests for the recovery path: unhealthy restart, rollback,
//! forced re-apply and permanent failure.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use update_agent::domain::update::PERMANENT_FAILURE_MESSAGE;
use update_agent::domain::{ApplyOutcome, ApplyState, Severity};

use crate::mocks::{
    Events, Fixture, MockSnapshots, MockSupervisor, full_manifest, level_only, plugin_manifest,
};

#[tokio::test]
async fn test_unhealthy_restart_rolls_back_to_catalog_level() {
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        health: vec![false, true],
        catalog_responses: vec![plugin_manifest(41)],
        ..Fixture::default()
    }
    .build();
    let events = orchestrator.ports().catalog.events();

    let outcome = orchestrator
        .apply_updates(Some(full_manifest(42)), false)
        .await
        .expect("apply");

    assert_eq!(outcome, ApplyOutcome::Committed { level: 41 });
    assert_eq!(*orchestrator.ports().catalog.taints.lock().unwrap(), vec![42]);
    assert_eq!(events.count("report-versions"), 1);
    assert_eq!(events.count("query"), 1);
    assert_eq!(events.count("revert 42"), 1);
    assert_eq!(events.count("restart jenkins"), 2);

    // restore → report → taint → query, then the forced re-apply.
    let revert = events.position("revert 42");
    assert!(events.position("health-check") < revert);
    assert!(revert < events.position("report-versions"));
    assert!(events.position("report-versions") < events.position("taint 42"));
    assert!(events.position("taint 42") < events.position("query 42"));
    assert!(events.position("query 42") < events.position("save 41"));

    assert_eq!(*orchestrator.ports().store.saved.lock().unwrap(), vec![42, 41]);
    let labels = orchestrator.ports().snapshots.labels.lock().unwrap().clone();
    assert_eq!(labels.len(), 2);
    assert!(labels[1].starts_with("UL42->UL41 "));

    let warnings = orchestrator.ports().notifier.with_severity(Severity::Warn);
    assert_eq!(warnings.len(), 1);
    assert!(
        warnings[0]
            .starts_with("jenkins detected as unhealthy. Rolling back to previous update level (")
    );
    assert_eq!(orchestrator.state(), ApplyState::Idle);
    assert!(orchestrator.in_progress_since().is_none());
}

#[tokio::test]
async fn test_failed_restart_rolls_back_without_health_check() {
    let events = Events::default();
    let orchestrator = Fixture {
        events: events.clone(),
        current: Some(level_only(41)),
        catalog_responses: vec![plugin_manifest(41)],
        supervisor: Some(MockSupervisor::new(events.clone()).failing_restart()),
        ..Fixture::default()
    }
    .build();

    let outcome = orchestrator
        .apply_updates(Some(full_manifest(42)), false)
        .await
        .expect("apply");

    assert_eq!(outcome, ApplyOutcome::Committed { level: 41 });
    assert_eq!(events.count("revert 42"), 1);
    assert_eq!(events.count("taint"), 1);
    assert_eq!(events.count("query"), 1);
    assert_eq!(events.count("restart jenkins"), 2);
    // Only the re-applied level was health checked.
    assert_eq!(events.count("health-check"), 1);
    assert!(events.position("revert 42") < events.position("health-check"));
    assert_eq!(*orchestrator.ports().store.saved.lock().unwrap(), vec![42, 41]);
}

#[tokio::test]
async fn test_rollback_to_level_only_manifest_commits_without_second_restart() {
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        health: vec![false],
        catalog_responses: vec![level_only(41)],
        ..Fixture::default()
    }
    .build();
    let events = orchestrator.ports().catalog.events();

    let outcome = orchestrator
        .apply_updates(Some(plugin_manifest(42)), false)
        .await
        .expect("apply");

    assert_eq!(outcome, ApplyOutcome::UpToDate { level: 41 });
    assert_eq!(events.count("restart"), 1);
    assert_eq!(orchestrator.current_level().await, 41);
}

#[tokio::test]
async fn test_second_health_failure_is_permanent_failure() {
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        health: vec![false, false],
        catalog_responses: vec![plugin_manifest(41)],
        ..Fixture::default()
    }
    .build();
    let events = orchestrator.ports().catalog.events();

    let outcome = orchestrator
        .apply_updates(Some(full_manifest(42)), false)
        .await
        .expect("permanent failure is not an error");

    assert_eq!(outcome, ApplyOutcome::PermanentFailure { level: 41 });
    // Exactly one rollback was attempted.
    assert_eq!(events.count("taint"), 1);
    assert_eq!(events.count("revert"), 1);
    assert_eq!(events.count("health-check"), 2);

    let errors = orchestrator.ports().notifier.with_severity(Severity::Error);
    assert_eq!(errors, vec![PERMANENT_FAILURE_MESSAGE.to_string()]);
    assert_eq!(events.count("clear-restart-flag"), 1);
    assert!(orchestrator.in_progress_since().is_none());

    // The agent stays usable for a corrective update.
    let next = orchestrator
        .apply_updates(Some(plugin_manifest(43)), false)
        .await
        .expect("next cycle");
    assert_eq!(next, ApplyOutcome::Committed { level: 43 });
}

#[tokio::test]
async fn test_restore_failure_is_permanent_failure_without_taint() {
    let events = Events::default();
    let orchestrator = Fixture {
        events: events.clone(),
        current: Some(level_only(41)),
        health: vec![false],
        snapshots: Some(MockSnapshots::new(events.clone()).failing_revert()),
        ..Fixture::default()
    }
    .build();

    let outcome = orchestrator
        .apply_updates(Some(plugin_manifest(42)), false)
        .await
        .expect("apply");

    assert_eq!(outcome, ApplyOutcome::PermanentFailure { level: 42 });
    assert_eq!(events.count("taint"), 0);
    assert_eq!(events.count("query"), 0);
    assert_eq!(
        orchestrator.ports().notifier.with_severity(Severity::Error),
        vec![PERMANENT_FAILURE_MESSAGE.to_string()]
    );
}

#[tokio::test]
async fn test_requery_failure_is_permanent_failure() {
    // No catalog responses queued: the re-query fails.
    let orchestrator = Fixture {
        current: Some(level_only(41)),
        health: vec![false],
        ..Fixture::default()
    }
    .build();
    let events = orchestrator.ports().catalog.events();

    let outcome = orchestrator
        .apply_updates(Some(plugin_manifest(42)), false)
        .await
        .expect("apply");

    assert_eq!(outcome, ApplyOutcome::PermanentFailure { level: 42 });
    assert_eq!(events.count("taint 42"), 1);
    assert_eq!(events.count("restart"), 1);
    assert_eq!(orchestrator.state(), ApplyState::Idle);
}
