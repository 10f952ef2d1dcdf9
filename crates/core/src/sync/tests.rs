use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::*;
use crate::errors::Error;
use crate::test_support::{raw_op, FakeRemote, RemoteCall};

struct Harness {
    remote: Arc<FakeRemote>,
    engine: Arc<SyncEngine>,
}

fn harness(online: bool) -> Harness {
    harness_with_sink(online, Arc::new(NoOpSyncEventSink))
}

fn harness_with_sink(online: bool, sink: Arc<dyn SyncEventSink>) -> Harness {
    let remote = FakeRemote::shared();
    let queue = Arc::new(MutationQueue::new(
        Arc::new(MemoryStore::new()),
        DEFAULT_RETRY_BUDGET,
    ));
    let engine = SyncEngine::new(queue, remote.clone(), Connectivity::new(online))
        .with_event_sink(sink);
    Harness {
        remote,
        engine: Arc::new(engine),
    }
}

async fn enqueue_creates(engine: &SyncEngine, count: usize) {
    for n in 1..=count {
        engine
            .queue()
            .append(NewQueueOperation::create(
                EntityFamily::Transaction,
                format!("local-{n}"),
                serde_json::json!({ "description": format!("op-{n}") }),
            ))
            .await
            .expect("append");
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

#[async_trait]
impl SyncEventSink for RecordingSink {
    async fn emit(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn offline_pass_has_no_side_effects() {
    let h = harness(false);
    enqueue_creates(&h.engine, 2).await;

    let result = h.engine.run_sync_pass().await;
    assert_eq!(result.status, SyncPassStatus::Offline);
    assert!(!result.success);
    assert!(h.remote.calls().is_empty());
    let ops = h.engine.queue().list().await;
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|op| op.retry_count == 0));
}

#[tokio::test]
async fn failures_at_positions_two_and_five_do_not_abort_the_pass() {
    let h = harness(true);
    let n = 7;
    enqueue_creates(&h.engine, n).await;
    h.remote.fail_on("op-2");
    h.remote.fail_on("op-5");

    let result = h.engine.run_sync_pass().await;

    assert_eq!(result.status, SyncPassStatus::Completed);
    assert!(!result.success);
    assert_eq!(result.processed_count, n - 2);
    assert_eq!(result.failed_count, 2);
    assert_eq!(result.errors.len(), 2);

    let remaining = h.engine.queue().list().await;
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|op| op.retry_count == 1));
    let descriptions: Vec<_> = remaining
        .iter()
        .map(|op| op.payload["description"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(descriptions, vec!["op-2", "op-5"]);
}

#[tokio::test]
async fn pass_replays_in_fifo_order() {
    let h = harness(true);
    for (id, t) in [("late", 30), ("early", 10), ("middle", 20)] {
        h.engine.queue().push_raw(raw_op(id, t, 0)).await;
    }

    h.engine.run_sync_pass().await;

    let order: Vec<_> = h
        .remote
        .write_calls()
        .into_iter()
        .map(|call| match call {
            RemoteCall::Create(_, payload) => payload["description"].as_str().unwrap().to_string(),
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(order, vec!["early", "middle", "late"]);
}

#[tokio::test]
async fn exhausted_budget_moves_operation_to_quarantine() {
    let h = harness(true);
    enqueue_creates(&h.engine, 1).await;
    h.remote.fail_on("op-1");

    for _ in 0..DEFAULT_RETRY_BUDGET {
        h.engine.run_sync_pass().await;
    }
    let queue = h.engine.queue();
    assert!(queue.pending().await.is_empty());
    assert_eq!(queue.quarantined().await.len(), 1);

    // Quarantined operations are not retried automatically.
    let calls_before = h.remote.calls().len();
    let result = h.engine.run_sync_pass().await;
    assert_eq!(result.processed_count + result.failed_count, 0);
    assert_eq!(h.remote.calls().len(), calls_before);
}

#[tokio::test]
async fn retry_all_resets_budget_before_running_the_pass() {
    let h = harness(true);
    h.engine.queue().push_raw(raw_op("stuck", 1, 3)).await;
    h.engine.queue().push_raw(raw_op("healed", 2, 3)).await;
    h.remote.fail_on("stuck");

    let result = h.engine.retry_all_quarantined().await;

    assert_eq!(result.processed_count, 1);
    assert_eq!(result.failed_count, 1);
    let remaining = h.engine.queue().list().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "stuck");
    assert_eq!(remaining[0].retry_count, 1);
}

#[tokio::test]
async fn clear_quarantined_removes_exactly_the_quarantined() {
    let h = harness(true);
    let queue = h.engine.queue();
    queue.push_raw(raw_op("dead-1", 1, 3)).await;
    queue.push_raw(raw_op("pending", 2, 2)).await;
    queue.push_raw(raw_op("dead-2", 3, 3)).await;
    queue.push_raw(raw_op("fresh", 4, 0)).await;

    assert_eq!(h.engine.clear_quarantined().await, 2);
    let ids: Vec<_> = queue.list().await.into_iter().map(|op| op.id).collect();
    assert_eq!(ids, vec!["pending", "fresh"]);
}

#[tokio::test]
async fn confirmed_create_rewrites_queued_references_to_server_id() {
    let sink = Arc::new(RecordingSink::default());
    let h = harness_with_sink(true, sink.clone());
    h.remote.seed(EntityFamily::Transaction, Vec::new());
    let queue = h.engine.queue();
    queue
        .append(NewQueueOperation::create(
            EntityFamily::Transaction,
            "local-1",
            serde_json::json!({ "id": "local-1", "description": "Coffee" }),
        ))
        .await
        .unwrap();
    queue
        .append(NewQueueOperation::update(
            EntityFamily::Transaction,
            "local-1",
            serde_json::json!({ "description": "Espresso" }),
        ))
        .await
        .unwrap();
    queue
        .append(NewQueueOperation::delete(EntityFamily::Transaction, "local-1"))
        .await
        .unwrap();

    let result = h.engine.run_sync_pass().await;

    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.processed_count, 3);
    assert_eq!(
        h.remote.write_calls()[1..],
        [
            RemoteCall::Update(
                EntityFamily::Transaction,
                "srv-1".to_string(),
                serde_json::json!({ "description": "Espresso" })
            ),
            RemoteCall::Delete(EntityFamily::Transaction, "srv-1".to_string()),
        ]
    );

    let events = sink.events.lock().unwrap().clone();
    assert_eq!(events.len(), 3);
    let SyncEvent::OperationConfirmed(first) = &events[0];
    assert_eq!(first.local_id.as_deref(), Some("local-1"));
    assert_eq!(first.entity_id.as_deref(), Some("srv-1"));
}

#[tokio::test]
async fn overlapping_triggers_coalesce_into_one_pass() {
    let h = harness(true);
    enqueue_creates(&h.engine, 1).await;
    h.remote.hold_creates(true);

    let engine = Arc::clone(&h.engine);
    let first = tokio::spawn(async move { engine.run_sync_pass().await });
    h.remote.create_entered.notified().await;

    assert!(h.engine.is_syncing());
    let second = h.engine.run_sync_pass().await;
    assert_eq!(second.status, SyncPassStatus::Coalesced);

    h.remote.release_create.notify_one();
    let first = first.await.expect("join");
    assert_eq!(first.processed_count, 1);
    assert_eq!(h.remote.write_calls().len(), 1);
    assert!(h.engine.queue().is_empty().await);
}

#[tokio::test]
async fn status_reports_counts_and_oldest() {
    let h = harness(true);
    let empty = h.engine.get_status().await;
    assert_eq!(empty.total, 0);
    assert!(empty.oldest.is_none());
    assert!(empty.oldest_age_ms.is_none());

    let queue = h.engine.queue();
    queue.push_raw(raw_op("b", 200, 3)).await;
    queue.push_raw(raw_op("a", 100, 0)).await;
    let status = h.engine.get_status().await;
    assert_eq!(status.total, 2);
    assert_eq!(status.pending, 1);
    assert_eq!(status.quarantined, 1);
    assert_eq!(status.oldest.map(|op| op.id).as_deref(), Some("a"));
    assert!(status.oldest_age_ms.unwrap() > 0);
}

#[tokio::test]
async fn transient_errors_are_captured_per_operation() {
    let h = harness(true);
    enqueue_creates(&h.engine, 2).await;
    h.remote
        .fail_all_with(Some(|| Error::Offline("connection reset".to_string())));

    let result = h.engine.run_sync_pass().await;
    assert_eq!(result.failed_count, 2);
    assert!(result.errors[0].contains("connection reset"));
    let ops = h.engine.queue().list().await;
    assert!(ops
        .iter()
        .all(|op| op.last_error.as_deref() == Some("Offline: connection reset")));
}

#[tokio::test]
async fn operations_on_an_unconfirmed_create_wait_for_it() {
    let h = harness(true);
    let queue = h.engine.queue();
    queue
        .append(NewQueueOperation::create(
            EntityFamily::Category,
            "local-flaky",
            serde_json::json!({ "id": "local-flaky", "name": "Flaky" }),
        ))
        .await
        .unwrap();
    queue
        .append(NewQueueOperation::delete(EntityFamily::Category, "local-flaky"))
        .await
        .unwrap();
    h.remote.fail_on("Flaky");

    let first = h.engine.run_sync_pass().await;
    assert_eq!(first.processed_count, 0);
    assert_eq!(first.failed_count, 1);
    assert!(!h
        .remote
        .write_calls()
        .iter()
        .any(|call| matches!(call, RemoteCall::Delete(..))));
    let ops = queue.list().await;
    assert_eq!(ops[1].kind, OperationKind::Delete);
    assert_eq!(ops[1].retry_count, 0);

    h.remote.stop_failing("Flaky");
    let second = h.engine.run_sync_pass().await;
    assert_eq!(second.processed_count, 2);
    assert!(queue.is_empty().await);
    assert!(h.remote.records(EntityFamily::Category).is_empty());
    assert_eq!(
        h.remote.write_calls().last(),
        Some(&RemoteCall::Delete(EntityFamily::Category, "srv-1".to_string()))
    );
}
