use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, TimeZone, Utc};

use torque_core::{FixedClock, Versioned};
use torque_infra::{
    DeliveryOutcome, Dispatcher, DispatcherConfig, InMemoryStore, ServiceError, TaskQuery,
    TaskService,
};
use torque_tasks::{NewTask, SchedulingConfig, Task, TaskStatus};

type Service = TaskService<Arc<InMemoryStore>, Arc<FixedClock>>;

fn service(max_retries: u32) -> (Service, Arc<FixedClock>) {
    torque_observability::init();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap(),
    ));
    let policy = SchedulingConfig {
        max_retries,
        ..Default::default()
    }
    .policy()
    .unwrap();
    (
        TaskService::with_clock(InMemoryStore::arc(), policy, clock.clone()),
        clock,
    )
}

#[test]
fn racing_advances_on_same_version_commit_once() {
    let (svc, _clock) = service(10);
    let svc = Arc::new(svc);
    let id = svc
        .create(NewTask::new("https://example.com/hook", 30))
        .unwrap()
        .id_typed();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let snapshot = svc.get(id).unwrap();
                barrier.wait();
                svc.advance_snapshot(snapshot)
            })
        })
        .collect();

    let results: Vec<Result<Task, ServiceError>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_conflict()))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 1);

    let stored = svc.get(id).unwrap();
    assert_eq!(stored.retry_count(), 1);
    assert_eq!(stored.version(), 2);
}

#[test]
fn many_concurrent_advances_each_bump_by_one() {
    let (svc, _clock) = service(1_000);
    let svc = Arc::new(svc);
    let id = svc
        .create(NewTask::new("https://example.com/hook", 30))
        .unwrap()
        .id_typed();

    let committed = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            let committed = Arc::clone(&committed);
            thread::spawn(move || {
                for _ in 0..25 {
                    if svc.advance_retry(id).is_ok() {
                        committed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stored = svc.get(id).unwrap();
    let committed = committed.load(Ordering::SeqCst) as u32;
    assert_eq!(stored.retry_count(), committed);
    assert_eq!(stored.version(), u64::from(committed) + 1);
}

#[test]
fn exhausting_the_budget_then_completion_is_rejected() {
    let (svc, _clock) = service(3);
    let id = svc
        .create(NewTask::new("https://example.com/hook", 30))
        .unwrap()
        .id_typed();

    for _ in 0..3 {
        svc.advance_retry(id).unwrap();
    }

    assert_eq!(svc.get(id).unwrap().status(), TaskStatus::Failed);
    assert!(matches!(
        svc.mark_completed(id),
        Err(ServiceError::TerminalState(_))
    ));
}

#[test]
fn summary_json_carries_payload_on_request() {
    let (svc, _clock) = service(3);
    let id = svc
        .create(
            NewTask::new("https://example.com/hook", 30)
                .with_header("X-Token", "t0k3n")
                .with_body("a=1&b=2"),
        )
        .unwrap()
        .id_typed();

    let full = serde_json::to_value(svc.summary(id, true).unwrap()).unwrap();
    assert_eq!(full["headers"]["X-Token"], "t0k3n");
    assert_eq!(full["body"], "a=1&b=2");
    assert_eq!(full["enctype"], "application/x-www-form-urlencoded");

    let brief = serde_json::to_value(svc.summary(id, false).unwrap()).unwrap();
    let keys: Vec<_> = brief.as_object().unwrap().keys().cloned().collect();
    assert_eq!(
        keys,
        vec!["due", "id", "retry_count", "status", "timeout", "url"]
    );
}

#[test]
fn worker_pool_delivers_every_due_task() {
    let (svc, clock) = service(5);
    for n in 0..20 {
        svc.create(NewTask::new(format!("https://example.com/hook/{n}"), 5))
            .unwrap();
    }
    clock.advance(Duration::seconds(10));

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let dispatcher = Arc::new(Dispatcher::new(svc, move |_: &Task| {
        counter.fetch_add(1, Ordering::SeqCst);
        DeliveryOutcome::Delivered
    }));

    let handle = Arc::clone(&dispatcher)
        .spawn(
            DispatcherConfig::default()
                .with_name("test-pool")
                .with_workers(4)
                .with_batch_size(3)
                .with_poll_interval(StdDuration::from_millis(5)),
        )
        .unwrap();
    assert_eq!(handle.worker_count(), 4);

    let deadline = Instant::now() + StdDuration::from_secs(10);
    while handle.stats().completed < 20 {
        assert!(Instant::now() < deadline, "pool did not drain in time");
        thread::sleep(StdDuration::from_millis(5));
    }

    let stats = handle.stats();
    handle.shutdown();

    assert_eq!(stats.completed, 20);
    assert_eq!(stats.errors, 0);
    let completed_query = TaskQuery::all().with_statuses([TaskStatus::Completed]);
    assert_eq!(dispatcher.tasks().list(&completed_query).unwrap().len(), 20);
    // Duplicate deliveries are possible; each surplus one shows up as a discard.
    assert!(attempts.load(Ordering::SeqCst) >= 20);
    assert!(dispatcher.tasks().due_tasks(100).unwrap().is_empty());
}
