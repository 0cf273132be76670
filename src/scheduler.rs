//! Timer-driven scheduling of the background statistics worker.
//!
//! # Architecture
//! - A single [`Timer`] owns one named OS thread that sleeps until its
//!   deadline and then runs the bound task to completion. The task never runs
//!   concurrently with itself; re-arming while it runs only sets the next
//!   deadline.
//! - The [`Scheduler`] wraps the optional timer in its own lock, separate
//!   from the pool lock.
//! - [`Scheduler::schedule`] only ever *tries* that lock. Shutdown holds it
//!   while joining the timer thread, and the worker running on that thread
//!   reschedules itself when throttled; a blocking acquisition there would
//!   deadlock. A skipped reschedule can only delay processing, never lose it:
//!   the pool stays non-empty and the next successful schedule drains it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::error::StatsError;

const TIMER_THREAD_NAME: &str = "stats-recalc-timer";

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

/// One-shot, re-armable timer bound to a task.
pub struct Timer {
    shared: Arc<TimerShared>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl Timer {
    /// Spawn the timer thread. The timer starts disarmed.
    pub fn spawn<F>(task: F) -> Result<Self, StatsError>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(TimerShared::default());
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || run_timer(&thread_shared, task))?;
        let thread_id = thread.thread().id();
        Ok(Self {
            shared,
            thread: Some(thread),
            thread_id,
        })
    }

    /// Fire once after `delay`, replacing any pending deadline.
    pub fn set_time(&self, delay: Duration) {
        let mut state = self.shared.state.lock();
        state.deadline = Some(Instant::now() + delay);
        self.shared.wake.notify_one();
    }

}

impl Drop for Timer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.deadline = None;
            self.shared.wake.notify_one();
        }
        // Dropped from inside its own task: the thread exits once the task
        // returns, joining here would wait on ourselves.
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("stats_recalc: timer thread terminated abnormally");
        }
    }
}

fn run_timer<F: Fn()>(shared: &TimerShared, task: F) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let Some(at) = state.deadline else {
            shared.wake.wait(&mut state);
            continue;
        };
        if Instant::now() < at {
            shared.wake.wait_until(&mut state, at);
            continue;
        }
        state.deadline = None;
        MutexGuard::unlocked(&mut state, || {
            if std::panic::catch_unwind(AssertUnwindSafe(&task)).is_err() {
                warn!("stats_recalc: background task panicked; timer keeps running");
            }
        });
    }
}

/// Owner of the single worker timer.
#[derive(Default)]
pub struct Scheduler {
    timer: Mutex<Option<Timer>>,
    /// Mirrors `timer.is_some()` so status reads never contend with
    /// [`Scheduler::schedule`].
    running: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the timer bound to `task` unless one exists.
    ///
    /// Returns `true` when a timer was created by this call.
    pub fn start<F>(&self, task: F) -> Result<bool, StatsError>
    where
        F: Fn() + Send + 'static,
    {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return Ok(false);
        }
        *timer = Some(Timer::spawn(task)?);
        self.running.store(true, Ordering::Release);
        debug!("stats_recalc: scheduler timer created");
        Ok(true)
    }

    /// Arm the timer to fire once after `delay`.
    ///
    /// Returns `false` when the timer lock was contended or no timer exists.
    pub fn schedule(&self, delay: Duration) -> bool {
        let Some(timer) = self.timer.try_lock() else {
            trace!(
                delay_ms = delay.as_millis() as u64,
                "stats_recalc: reschedule skipped, timer lock busy"
            );
            return false;
        };
        match timer.as_ref() {
            Some(timer) => {
                timer.set_time(delay);
                true
            }
            None => false,
        }
    }

    pub fn schedule_now(&self) -> bool {
        self.schedule(Duration::ZERO)
    }

    /// Destroy the timer so no further firing can happen.
    ///
    /// Waits for a firing in progress. Enqueuers must have stopped producing
    /// work, otherwise a late enqueue can sit in the pool unscheduled until
    /// the next start. Returns `true` if a timer existed.
    pub fn shutdown(&self) -> bool {
        let mut timer = self.timer.lock();
        self.running.store(false, Ordering::Release);
        let existed = timer.take().is_some();
        if existed {
            debug!("stats_recalc: scheduler timer destroyed");
        }
        existed
    }

    /// Whether a timer exists. Does not touch the timer lock.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
