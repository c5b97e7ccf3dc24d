mod support;

use dashql::{ExplorerConfig, QueryConfigModel, QueueEvent, WorkError, WorkQueue};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{sleep, timeout};

async fn wait_until_empty(queue: &WorkQueue) {
    timeout(Duration::from_secs(5), async {
        while !queue.is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue should drain");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_operations_stay_under_the_ceiling() {
    support::init_tracing();
    let queue = WorkQueue::new(2).expect("runtime is available");
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8u32)
        .map(|index| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            queue.enqueue(
                move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(index)
                },
                false,
            )
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.outcome().await.expect("operation should resolve"));
    }

    assert_eq!(results, (0..8).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 2);
    wait_until_empty(&queue).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generated_queries_run_through_the_queue() {
    support::init_tracing();
    let config = ExplorerConfig::default();
    let queue = config.work_queue().expect("runtime is available");

    let sql = config
        .get_sql(&QueryConfigModel::default(), None)
        .expect("default query should build");
    let mut work = queue.enqueue(
        move || async move {
            sleep(Duration::from_millis(5)).await;
            Ok::<_, String>(sql.lines().count())
        },
        false,
    );

    assert_eq!(work.next_event().await, Some(QueueEvent::Started));
    assert_eq!(work.next_event().await, Some(QueueEvent::Resolved(16)));
    assert_eq!(work.next_event().await, None);
    wait_until_empty(&queue).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_do_not_stall_the_queue() {
    support::init_tracing();
    let queue = WorkQueue::new(1).expect("runtime is available");

    let failing = queue.enqueue(
        || async { Err::<u32, _>("warehouse unavailable".to_string()) },
        false,
    );
    let next = queue.enqueue(|| async { Ok::<_, String>(42u32) }, false);

    assert_eq!(
        failing.outcome().await,
        Err(WorkError::Rejected("warehouse unavailable".to_string()))
    );
    assert_eq!(next.outcome().await, Ok(42));
    wait_until_empty(&queue).await;
}
