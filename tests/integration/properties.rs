//! Invariants that hold across any run.
//!
//! These tests check scheduling guarantees rather than specific outcomes:
//! the concurrency ceiling, dispatch order, dependency ordering, and what
//! observers can see while a run is in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use taskweave::orchestration::TimeoutPerformer;
use taskweave::{ExecutionPlan, ItemId, OrchestratorEvent, WorkStatus};

use crate::fixtures::{
    chain_items, config, diamond_items, drain, independent_items, item, orchestrator,
    spawn_drain, GatedPerformer, RecordingPerformer,
};

/// Property: never more than max_concurrency items run at once
#[tokio::test(start_paused = true)]
async fn test_concurrency_ceiling_holds() {
    for max in [1, 3, 5] {
        let performer = Arc::new(RecordingPerformer::new().with_delay(Duration::from_millis(20)));
        let orch = orchestrator(Arc::clone(&performer), config(max));

        let result = orch.orchestrate(independent_items(12)).await.unwrap();

        assert_eq!(result.completed.len(), 12);
        assert_eq!(performer.peak(), max, "peak with max_concurrency {}", max);
        assert_eq!(result.rounds, 12_usize.div_ceil(max));
    }
}

/// Property: higher priority dispatches first, ties keep input order
#[tokio::test]
async fn test_priority_decides_dispatch_order() {
    let performer = Arc::new(RecordingPerformer::new());
    let orch = orchestrator(Arc::clone(&performer), config(1));

    let items = vec![
        item("low").with_priority(1),
        item("mid-1"),
        item("high").with_priority(9),
        item("mid-2"),
        item("top").with_priority(10),
    ];
    orch.orchestrate(items).await.unwrap();

    assert_eq!(
        performer.calls(),
        vec!["top", "high", "mid-1", "mid-2", "low"]
    );
}

/// Property: an item starts only after all of its dependencies completed
#[tokio::test]
async fn test_dependencies_complete_before_dependents_start() {
    let performer = Arc::new(RecordingPerformer::new());
    let (tx, rx) = mpsc::channel(256);
    let orch = orchestrator(Arc::clone(&performer), config(3)).with_events(tx);

    let mut items = diamond_items();
    items.extend(chain_items(4));
    let deps: Vec<(ItemId, Vec<ItemId>)> = items
        .iter()
        .map(|it| (it.id.clone(), it.dependencies.clone()))
        .collect();

    orch.orchestrate(items).await.unwrap();
    drop(orch);
    let events = drain(rx).await;

    let started_at = |id: &ItemId| {
        events.iter().position(
            |e| matches!(e, OrchestratorEvent::ItemStarted { item_id, .. } if item_id == id),
        )
    };
    let completed_at = |id: &ItemId| {
        events.iter().position(
            |e| matches!(e, OrchestratorEvent::ItemCompleted { item_id, .. } if item_id == id),
        )
    };

    for (id, dependencies) in deps {
        let started = started_at(&id).unwrap();
        for dep in dependencies {
            let completed = completed_at(&dep).unwrap();
            assert!(completed < started, "{} started before {} completed", id, dep);
        }
    }
}

/// Property: settled items were dispatched first
#[tokio::test]
async fn test_settled_items_were_in_progress() {
    let performer = Arc::new(RecordingPerformer::new().always_failing("item-1"));
    let orch = orchestrator(Arc::clone(&performer), config(2));

    let result = orch.orchestrate(independent_items(3)).await.unwrap();

    for settled in result.completed.iter().chain(&result.failed) {
        assert!(settled.attempts >= 1);
        assert!(settled.started_at.is_some());
        assert!(settled.completed_at.is_some());
        assert!(settled.assigned_worker.is_none());
        assert!(settled.duration().is_some());
    }
}

/// Property: empty input returns immediately with an empty report
#[tokio::test]
async fn test_empty_run_returns_immediately() {
    let performer = Arc::new(RecordingPerformer::new());
    let orch = orchestrator(Arc::clone(&performer), config(2));

    let result = tokio::time::timeout(Duration::from_secs(1), orch.orchestrate(Vec::new()))
        .await
        .unwrap()
        .unwrap();

    assert!(result.completed.is_empty());
    assert!(result.failed.is_empty());
    assert!(result.blocked.is_empty());
    assert_eq!(result.total_duration, Duration::ZERO);
    assert!(performer.calls().is_empty());
}

/// Property: observers see in-flight items while a batch runs
#[tokio::test]
async fn test_execution_state_shows_active_items() {
    let (performer, gate) = GatedPerformer::new();
    let orch = Arc::new(orchestrator(Arc::new(performer), config(2)));

    let handle = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.orchestrate(independent_items(3)).await })
    };

    let mut snapshot = orch.execution_state().await;
    for _ in 0..200 {
        if snapshot.active_executions > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        snapshot = orch.execution_state().await;
    }

    assert_eq!(snapshot.active_executions, 2);
    let contents: Vec<&str> = snapshot.items.iter().map(|a| a.content.as_str()).collect();
    assert_eq!(contents, vec!["item-0", "item-1"]);
    assert!(snapshot
        .items
        .iter()
        .all(|a| a.status == WorkStatus::InProgress && a.attempt == 1));
    assert_ne!(snapshot.items[0].worker, snapshot.items[1].worker);

    gate.send(true).unwrap();
    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.completed.len(), 3);
    assert_eq!(orch.execution_state().await.active_executions, 0);
}

/// Property: a performer timeout is an ordinary item failure
#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failure() {
    let slow = RecordingPerformer::new().with_delay(Duration::from_secs(10));
    let performer = Arc::new(TimeoutPerformer::new(slow, Duration::from_secs(1)));
    let orch = orchestrator(performer, config(2).with_max_attempts(1));

    let result = orch
        .orchestrate(vec![item("slow"), item("after").depends_on("slow")])
        .await
        .unwrap();

    assert_eq!(result.failed[0].error.as_deref(), Some("Timed out after 1s"));
    assert_eq!(result.blocked[0].id, ItemId::from("after"));
    assert_eq!(result.exhausted, vec![ItemId::from("slow")]);
}

/// Property: the static plan agrees with the dynamic rounds
#[tokio::test]
async fn test_plan_phases_match_unbounded_rounds() {
    let items = diamond_items();
    let plan = ExecutionPlan::build(&items).unwrap();

    let performer = Arc::new(RecordingPerformer::new());
    let orch = orchestrator(Arc::clone(&performer), config(plan.max_width()));
    let result = orch.orchestrate(items).await.unwrap();

    assert_eq!(plan.phase_count(), result.rounds);
    assert!(result.is_success());
}

/// Property: concurrent runs on one orchestrator keep separate snapshots
#[tokio::test]
async fn test_execution_state_spans_concurrent_runs() {
    let (performer, gate) = GatedPerformer::new();
    let orch = Arc::new(orchestrator(Arc::new(performer), config(2)));

    let first = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.orchestrate(independent_items(2)).await })
    };
    let second = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.orchestrate(vec![item("x"), item("y")]).await })
    };

    let mut snapshot = orch.execution_state().await;
    for _ in 0..200 {
        if snapshot.active_executions == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        snapshot = orch.execution_state().await;
    }

    assert_eq!(snapshot.active_executions, 4);
    let mut contents: Vec<&str> = snapshot.items.iter().map(|a| a.content.as_str()).collect();
    contents.sort_unstable();
    assert_eq!(contents, vec!["item-0", "item-1", "x", "y"]);

    gate.send(true).unwrap();
    assert!(first.await.unwrap().unwrap().is_success());
    assert!(second.await.unwrap().unwrap().is_success());
    assert_eq!(orch.execution_state().await.active_executions, 0);
}

/// Property: a small event channel drained alongside the run never stalls it
#[tokio::test]
async fn test_small_event_channel_drained_concurrently() {
    let performer = Arc::new(RecordingPerformer::new().always_failing("item-3"));
    let (tx, rx) = mpsc::channel(1);
    let orch = orchestrator(Arc::clone(&performer), config(3).with_max_attempts(1))
        .with_events(tx);
    let watcher = spawn_drain(rx);

    let run = orch.orchestrate(independent_items(10));
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    drop(orch);
    let events = watcher.await.unwrap();

    assert_eq!(result.completed.len(), 9);
    let started = events
        .iter()
        .filter(|e| matches!(e, OrchestratorEvent::ItemStarted { .. }))
        .count();
    assert_eq!(started, 10);
    assert_eq!(
        events.last(),
        Some(&OrchestratorEvent::RunComplete {
            completed: 9,
            failed: 1,
            blocked: 0
        })
    );
}
