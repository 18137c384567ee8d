//! Signals shared between producers, execution threads and the scheduler loop.
//!
//! - [`Mailbox`]: the three event sources the loop waits on (completion,
//!   wake-up, stop) behind one lock.
//! - [`InFlight`]: count of execution threads actively running a work
//!   function, with a blocking wait-until-zero used by the shutdown drain.
//! - [`LoopFlag`]: whether a scheduler loop thread is alive, so a restart
//!   never overlaps a loop that is still draining.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::task::TaskId;

/// An event taken from the [`Mailbox`], in the order the loop handles them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// A work function returned for the final time.
    Finished(TaskId),
    /// The store changed or a slot freed up; re-read state.
    Wake,
    /// Stop was requested.
    Stop,
}

#[derive(Debug, Default)]
struct Pending {
    finished: VecDeque<TaskId>,
    /// Single-slot dirty flag. Repeated wakes collapse into one.
    wake: bool,
    stop: bool,
}

/// Event source for the scheduler loop.
///
/// The wake-up is level-triggered: it carries no payload and any number of
/// wakes raised before the loop consumes one collapse into a single event.
/// Consumers must re-derive decisions from the store and running set.
/// Completion reports are queued individually and never block the sender.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    pending: Mutex<Pending>,
    ready: Condvar,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Raise the wake-up flag. A no-op if one is already pending.
    pub(crate) fn wake(&self) {
        let mut pending = self.pending.lock();
        if !pending.wake {
            pending.wake = true;
            self.ready.notify_one();
        }
    }

    pub(crate) fn report_finished(&self, id: TaskId) {
        let mut pending = self.pending.lock();
        pending.finished.push_back(id);
        self.ready.notify_one();
    }

    pub(crate) fn request_stop(&self) {
        let mut pending = self.pending.lock();
        pending.stop = true;
        self.ready.notify_one();
    }

    /// Block until an event is available and take it.
    ///
    /// Completions are handed out first so the running set is current before
    /// any wake or stop is evaluated.
    pub(crate) fn next(&self) -> Event {
        let mut pending = self.pending.lock();
        loop {
            if let Some(id) = pending.finished.pop_front() {
                return Event::Finished(id);
            }
            if pending.stop {
                pending.stop = false;
                return Event::Stop;
            }
            if pending.wake {
                pending.wake = false;
                return Event::Wake;
            }
            self.ready.wait(&mut pending);
        }
    }

    /// Drop completions queued for a loop that has exited.
    pub(crate) fn clear_finished(&self) -> usize {
        let mut pending = self.pending.lock();
        let n = pending.finished.len();
        pending.finished.clear();
        n
    }

    /// Forget a stop request that has not been consumed yet.
    pub(crate) fn clear_stop(&self) {
        self.pending.lock().stop = false;
    }
}

/// Number of execution threads currently running a work function.
///
/// A thread parked at a checkpoint is not counted; the pause that parked it
/// releases its slot and the resume re-acquires it.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    zero: Condvar,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn acquire(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn release(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "in-flight counter underflow");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }

    /// Block until no execution thread is running a work function.
    pub(crate) fn wait_zero(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }
}

/// Releases one [`InFlight`] slot when dropped.
///
/// Held by an execution thread for its whole lifetime so the counter
/// balances even when the work function unwinds.
pub(crate) struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
}

impl<'a> InFlightGuard<'a> {
    /// Wrap a slot that has already been acquired.
    pub(crate) fn adopt(in_flight: &'a InFlight) -> Self {
        Self { in_flight }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.release();
    }
}

/// Tracks whether a scheduler loop thread is alive.
#[derive(Debug, Default)]
pub(crate) struct LoopFlag {
    running: Mutex<bool>,
    changed: Condvar,
}

impl LoopFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_running(&self) {
        *self.running.lock() = true;
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.running.lock()
    }

    pub(crate) fn set_stopped(&self) {
        let mut running = self.running.lock();
        *running = false;
        self.changed.notify_all();
    }

    /// Block until no loop thread is alive.
    pub(crate) fn wait_stopped(&self) {
        let mut running = self.running.lock();
        while *running {
            self.changed.wait(&mut running);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wakes_coalesce() {
        let mailbox = Mailbox::new();
        mailbox.wake();
        mailbox.wake();
        mailbox.wake();
        assert_eq!(mailbox.next(), Event::Wake);

        mailbox.request_stop();
        // Only the stop is pending; the three wakes produced one event.
        assert_eq!(mailbox.next(), Event::Stop);
    }

    #[test]
    fn completions_come_first() {
        let mailbox = Mailbox::new();
        let a = TaskId::new();
        let b = TaskId::new();
        mailbox.wake();
        mailbox.report_finished(a);
        mailbox.request_stop();
        mailbox.report_finished(b);

        assert_eq!(mailbox.next(), Event::Finished(a));
        assert_eq!(mailbox.next(), Event::Finished(b));
        assert_eq!(mailbox.next(), Event::Stop);
        assert_eq!(mailbox.next(), Event::Wake);
    }

    #[test]
    fn next_blocks_until_signalled() {
        let mailbox = Arc::new(Mailbox::new());
        let waker = Arc::clone(&mailbox);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waker.wake();
        });
        assert_eq!(mailbox.next(), Event::Wake);
        handle.join().unwrap();
    }

    #[test]
    fn clear_finished_discards_stale_reports() {
        let mailbox = Mailbox::new();
        mailbox.report_finished(TaskId::new());
        mailbox.report_finished(TaskId::new());
        assert_eq!(mailbox.clear_finished(), 2);
        mailbox.wake();
        assert_eq!(mailbox.next(), Event::Wake);
    }

    #[test]
    fn guard_releases_on_unwind() {
        let in_flight = Arc::new(InFlight::new());
        in_flight.acquire();
        let shared = Arc::clone(&in_flight);
        let result = thread::spawn(move || {
            let _guard = InFlightGuard::adopt(&shared);
            panic!("work failed");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(in_flight.get(), 0);
    }

    #[test]
    fn loop_flag_wait_returns_after_stop() {
        let flag = Arc::new(LoopFlag::new());
        flag.set_running();

        let stopper = Arc::clone(&flag);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            stopper.set_stopped();
        });
        flag.wait_stopped();
        assert!(!flag.is_running());
        handle.join().unwrap();
    }

    #[test]
    fn wait_zero_blocks_until_drained() {
        let in_flight = Arc::new(InFlight::new());
        in_flight.acquire();
        in_flight.acquire();

        let worker = Arc::clone(&in_flight);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            worker.release();
            thread::sleep(Duration::from_millis(30));
            worker.release();
        });

        in_flight.wait_zero();
        assert_eq!(in_flight.get(), 0);
        handle.join().unwrap();
    }
}
