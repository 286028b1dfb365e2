//! # Whale mating
//!
//! Three kinds of threads: males, females and matchmakers. A male or a female can't go
//! on until some matchmaker has matched it, each matchmaker matches exactly one male
//! and one female.
//!
//! Two semaphores at 0 are enough, one release channel per role. A matchmaker signals
//! each of them once. With a single shared semaphore two males could eat one matchmaker's
//! pair of signals and leave a female hanging. Which of the waiting males (females) gets
//! released is up to the semaphore, there's no FIFO here.
//!
//! The start / end steps are reported to a [MatingObserver], by default it just logs.

use tracing::debug;

use crate::{error::SyncError, sync::Semaphore};

/// Hooks called around the waits, `index` is whatever the caller passed in
pub trait MatingObserver {
    fn male_start(&self, index: u32) {
        debug!(index, "male starts");
    }
    fn male_end(&self, index: u32) {
        debug!(index, "male proceeds");
    }
    fn female_start(&self, index: u32) {
        debug!(index, "female starts");
    }
    fn female_end(&self, index: u32) {
        debug!(index, "female proceeds");
    }
    fn matchmaker_start(&self, index: u32) {
        debug!(index, "matchmaker starts");
    }
    fn matchmaker_end(&self, index: u32) {
        debug!(index, "matchmaker ends");
    }
}

/// logs every step and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl MatingObserver for LoggingObserver {}

pub struct Whalemating<O = LoggingObserver> {
    male_ready: Semaphore,
    female_ready: Semaphore,
    observer: O,
}

impl Whalemating {
    pub fn init() -> Result<Self, SyncError> {
        Self::with_observer(LoggingObserver)
    }
}

impl<O: MatingObserver> Whalemating<O> {
    pub fn with_observer(observer: O) -> Result<Self, SyncError> {
        Ok(Self {
            male_ready: Semaphore::create("male sem", 0)?,
            female_ready: Semaphore::create("female sem", 0)?,
            observer,
        })
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// returns once some matchmaker released this male
    pub fn male(&self, index: u32) {
        self.observer.male_start(index);
        self.male_ready.wait();
        self.observer.male_end(index);
    }

    pub fn female(&self, index: u32) {
        self.observer.female_start(index);
        self.female_ready.wait();
        self.observer.female_end(index);
    }

    /// never blocks
    pub fn matchmaker(&self, index: u32) {
        self.observer.matchmaker_start(index);
        self.male_ready.signal();
        self.female_ready.signal();
        self.observer.matchmaker_end(index);
    }

    /// Gives the observer back. Nobody can be blocked in male / female: they'd borrow self.
    pub fn cleanup(self) -> O {
        self.male_ready.destroy();
        self.female_ready.destroy();
        self.observer
    }
}
