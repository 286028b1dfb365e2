//! # Semaphore
//!
//! A counting semaphore: a non-negative count, `wait` (P) blocks while it's 0 and then
//! decrements, `signal` (V) increments and wakes one waiter.
//!
//! It's a [Mutex] around the count plus a [Condvar] to sleep on. The decrement happens
//! with the mutex held after re-checking the count, so two waiters can't both consume
//! the same signal, whoever wakes up first takes it and the other goes back to sleep.
//!
//! A semaphore created at 0 works as a repeatable event: see the whalemating coordinator.

use tracing::trace;

use super::{condvar::Condvar, mutex::Mutex, owned_name, Reserve};
use crate::error::SyncError;

pub struct Semaphore {
    name: String,
    count: Mutex<u32>,
    positive: Condvar,
}

impl Semaphore {
    /// Fails only if the name can't be allocated
    pub fn create(name: &str, initial: u32) -> Result<Self, SyncError> {
        Self::create_with(name, initial, String::try_reserve_exact)
    }

    pub(crate) fn create_with(name: &str, initial: u32, reserve: Reserve) -> Result<Self, SyncError> {
        Ok(Self {
            name: owned_name("semaphore", name, reserve)?,
            count: Mutex::new(initial),
            positive: Condvar::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// P: block until the count is positive, then take one
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            count = self.positive.wait(count);
        }
        *count -= 1;
        trace!(sem = %self.name, count = *count, "P");
    }

    /// V: never blocks
    pub fn signal(&self) {
        let mut count = self.count.lock();
        let next = count
            .checked_add(1)
            .unwrap_or_else(|| panic!("semaphore {}: count overflow", self.name));
        *count = next;
        trace!(sem = %self.name, count = *count, "V");
        drop(count);
        self.positive.notify_one();
    }

    /// snapshot, stale as soon as it's returned
    pub fn count(&self) -> u32 {
        *self.count.lock()
    }

    /// Ownership guarantees nobody is blocked in [Semaphore::wait] at this point
    pub fn destroy(self) {
        trace!(sem = %self.name, count = self.count(), "destroy");
    }
}
