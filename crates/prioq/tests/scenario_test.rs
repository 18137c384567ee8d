//! End-to-end scenario: an unpausable low task, a pausable middle task and
//! a long unpausable high task pushed once the middle one is running.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prioq::{Scheduler, Task, TaskState};
use tracing_subscriber::EnvFilter;

const UNIT: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(10);

/// Poll `cond` until it holds or `WAIT` elapses.
fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn all_tasks_complete_in_priority_order() {
    init_tracing();
    let finished: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&finished);
    let a = Task::named("a", 1, false, move |_| {
        thread::sleep(UNIT * 2);
        log.lock().push("a");
    });

    let log = Arc::clone(&finished);
    let b = Task::named("b", 2, true, move |pause| {
        for _ in 0..5 {
            pause.check();
            thread::sleep(UNIT / 2);
        }
        log.lock().push("b");
    });

    let log = Arc::clone(&finished);
    let c = Task::named("c", 3, false, move |_| {
        thread::sleep(UNIT * 6);
        log.lock().push("c");
    });

    let scheduler = Scheduler::new();
    scheduler.push(Arc::clone(&a)).unwrap();
    scheduler.push(Arc::clone(&b)).unwrap();

    let started = Instant::now();
    scheduler.start().unwrap();

    // b outranks a, so it is dispatched first.
    assert!(eventually(|| b.state() == TaskState::Running));
    assert_eq!(a.state(), TaskState::Queued);

    scheduler.push(Arc::clone(&c)).unwrap();

    // c preempts b at its next checkpoint and runs while b is parked.
    assert!(eventually(|| b.is_paused() && c.state() == TaskState::Running));
    assert_eq!(a.state(), TaskState::Queued);
    assert_eq!(scheduler.len(), 2);
    assert!(finished.lock().is_empty());

    for task in [&a, &b, &c] {
        assert!(task.wait_finished_timeout(WAIT), "{:?} did not finish", task.name());
    }

    assert_eq!(*finished.lock(), vec!["c", "b", "a"]);
    assert_eq!(scheduler.len(), 0);
    // a + b + c run back to back on one slot.
    assert!(started.elapsed() >= UNIT * 10);

    scheduler.shutdown();
    assert!(!scheduler.is_active());
    assert_eq!(scheduler.in_flight(), 0);

    let stats = scheduler.stats();
    assert_eq!(stats.tasks_pushed, 3);
    assert_eq!(stats.tasks_started, 3);
    assert_eq!(stats.tasks_finished, 3);
    assert_eq!(stats.tasks_preempted, 1);
    assert_eq!(stats.tasks_resumed, 1);
}
