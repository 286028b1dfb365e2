//! # Condition variable
//!
//! `wait` unlocks the mutex, waits for a notification and locks the mutex back.
//! Like the futex underneath it may wake spuriously, so callers always wait in a loop
//! re-checking their condition.
//!
//! The futex atomic is used as a notification counter: a waiter remembers the counter
//! before unlocking the mutex and only sleeps if nothing was notified since. A notifier has
//! to hold the same mutex to change the waiter's condition, which gives the happens-before
//! between the waiter's unlock and the notifier's increment.
//!
//! The counter overflows after 2^32 notifications, a waiter that misses exactly that many
//! would sleep. We consider it negligible.
//!
//! `num_waiters` lets notifiers skip the wake syscall when nobody is waiting.

use std::sync::atomic::{
    AtomicU32, AtomicUsize,
    Ordering::Relaxed,
};

use atomic_wait::{wait, wake_all, wake_one};

use super::mutex::MutexGuard;

pub struct Condvar {
    counter: AtomicU32,
    num_waiters: AtomicUsize, // counts threads, can't overflow
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            num_waiters: AtomicUsize::new(0),
        }
    }

    pub fn notify_one(&self) {
        if self.num_waiters.load(Relaxed) > 0 {
            self.counter.fetch_add(1, Relaxed);
            wake_one(&self.counter);
        }
    }

    pub fn notify_all(&self) {
        if self.num_waiters.load(Relaxed) > 0 {
            self.counter.fetch_add(1, Relaxed);
            wake_all(&self.counter);
        }
    }

    /// takes and returns a guard as a proof that the mutex is locked
    pub fn wait<'a, Y>(&self, guard: MutexGuard<'a, Y>) -> MutexGuard<'a, Y> {
        self.num_waiters.fetch_add(1, Relaxed);

        let counter_value = self.counter.load(Relaxed);
        let mutex = guard.mutex;
        drop(guard);

        // sleeps only if nobody notified since we've unlocked
        wait(&self.counter, counter_value);

        self.num_waiters.fetch_sub(1, Relaxed);

        mutex.lock()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
