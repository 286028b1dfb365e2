//! # Read-write lock
//! Two kinds of locking:
//! - exclusive / write - one thread at a time, like the [Mutex]
//! - shared / read - any number of threads at once
//!
//! and only one kind at a given moment of time.
//!
//! Unlike a futex-only RWLock, the bookkeeping here is a plain struct behind the internal
//! [Mutex], with a condvar per kind of waiter. The mutex is held for a few instructions at a
//! time and never while sleeping: [Condvar::wait] gives it up.
//!
//! ## Writer preference
//! A lock that lets readers in whenever no writer *holds* it can starve writers forever
//! under a steady stream of readers. Here a new reader also backs off when a writer is
//! *waiting*, so a writer waits at most for the readers already inside to drain.
//! The flip side: continuous writers can starve readers.
//! Nothing is promised about the order among waiters of the same kind.
//!
//! ## Misuse
//! Releasing a kind of lock the calling thread doesn't hold panics on the spot, before
//! touching the counters, with the lock's name in the message. So does taking the write
//! lock twice from one thread.
//!
//! The writer's [ThreadId] sits in the shared state. Read holds are per thread: each thread
//! keeps a map from lock id to how many read holds it has, so `release_read` from a thread
//! that never acquired is caught even while other threads read. Ids come from a global
//! counter, an address could be reused by the next lock.
//!
//! ## Interface
//! The explicit `acquire_*` / `release_*` pairs are the core. [RwLock::read] and
//! [RwLock::write] wrap them into guards that release on drop.

use std::{
    cell::RefCell,
    collections::HashMap,
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
    thread::{self, ThreadId},
};

use tracing::trace;

use super::{condvar::Condvar, mutex::Mutex, owned_name, Reserve};
use crate::error::SyncError;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// lock id -> read holds of the current thread, zero entries are removed
    static READ_HOLDS: RefCell<HashMap<u64, u32>> = RefCell::new(HashMap::new());
}

struct State {
    readers: u32,
    writer: Option<ThreadId>,
    waiting_writers: u32,
}

/// Snapshot of what the lock is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Reading(u32),
    Writing,
}

pub struct RwLock {
    id: u64,
    name: String,
    state: Mutex<State>,
    readers_cv: Condvar,
    writers_cv: Condvar,
}

impl RwLock {
    /// Fails only if the name can't be allocated
    pub fn create(name: &str) -> Result<Self, SyncError> {
        Self::create_with(name, String::try_reserve_exact)
    }

    pub(crate) fn create_with(name: &str, reserve: Reserve) -> Result<Self, SyncError> {
        let name = owned_name("rwlock", name, reserve)?;
        trace!(lock = %name, "create");
        Ok(Self {
            id: NEXT_ID.fetch_add(1, Relaxed),
            name,
            state: Mutex::new(State {
                readers: 0,
                writer: None,
                waiting_writers: 0,
            }),
            readers_cv: Condvar::new(),
            writers_cv: Condvar::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// blocks while a writer holds the lock or waits for it
    pub fn acquire_read(&self) {
        let mut s = self.state.lock();
        while s.writer.is_some() || s.waiting_writers > 0 {
            s = self.readers_cv.wait(s);
        }
        // be safe - don't let the counter wrap
        assert!(s.readers < u32::MAX, "rwlock {}: too many readers", self.name);
        s.readers += 1;
        trace!(lock = %self.name, readers = s.readers, "acquire_read");
        drop(s);

        READ_HOLDS.with(|holds| *holds.borrow_mut().entry(self.id).or_insert(0) += 1);
    }

    pub fn release_read(&self) {
        if !self.take_read_hold() {
            panic!(
                "rwlock {}: release_read without a held read lock",
                self.name
            );
        }

        let mut s = self.state.lock();
        // a hold of ours is counted in readers
        debug_assert!(s.readers > 0);
        s.readers -= 1;
        trace!(lock = %self.name, readers = s.readers, "release_read");
        let wake_writer = s.readers == 0 && s.waiting_writers > 0;
        drop(s);

        if wake_writer {
            self.writers_cv.notify_one();
        }
    }

    /// drop one of the current thread's read holds, false if it has none
    fn take_read_hold(&self) -> bool {
        READ_HOLDS.with(|holds| {
            let mut holds = holds.borrow_mut();
            let Some(n) = holds.get_mut(&self.id) else {
                return false;
            };
            *n -= 1;
            if *n == 0 {
                holds.remove(&self.id);
            }
            true
        })
    }

    /// blocks until there're neither readers nor a writer
    pub fn acquire_write(&self) {
        let me = thread::current().id();
        let mut s = self.state.lock();
        if s.writer == Some(me) {
            drop(s);
            panic!("rwlock {}: acquire_write while already holding it", self.name);
        }

        // announce ourselves so that new readers queue up behind us
        s.waiting_writers += 1;
        while s.readers > 0 || s.writer.is_some() {
            s = self.writers_cv.wait(s);
        }
        s.waiting_writers -= 1;
        s.writer = Some(me);
        trace!(lock = %self.name, waiting_writers = s.waiting_writers, "acquire_write");
    }

    pub fn release_write(&self) {
        let me = thread::current().id();
        let mut s = self.state.lock();
        match s.writer {
            Some(owner) if owner == me => {}
            Some(_) => {
                drop(s);
                panic!(
                    "rwlock {}: release_write of a write lock held by another thread",
                    self.name
                );
            }
            None => {
                drop(s);
                panic!(
                    "rwlock {}: release_write without a held write lock",
                    self.name
                );
            }
        }
        s.writer = None;
        trace!(lock = %self.name, waiting_writers = s.waiting_writers, "release_write");
        let writers_waiting = s.waiting_writers > 0;
        drop(s);

        // the next writer goes first, readers get in once no writer is left
        if writers_waiting {
            self.writers_cv.notify_one();
        } else {
            self.readers_cv.notify_all();
        }
    }

    pub fn read(&self) -> ReadGuard<'_> {
        self.acquire_read();
        ReadGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn write(&self) -> WriteGuard<'_> {
        self.acquire_write();
        WriteGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn state(&self) -> LockState {
        let s = self.state.lock();
        match (s.writer, s.readers) {
            (Some(_), _) => LockState::Writing,
            (None, 0) => LockState::Idle,
            (None, n) => LockState::Reading(n),
        }
    }

    pub fn waiting_writers(&self) -> u32 {
        self.state.lock().waiting_writers
    }

    /// Ownership guarantees nobody holds or waits for the lock at this point
    pub fn destroy(self) {
        trace!(lock = %self.name, "destroy");
    }
}

/// Releases the shared access on drop.
/// Not Send: the access belongs to the thread that acquired it.
pub struct ReadGuard<'a> {
    lock: &'a RwLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Releases the exclusive access on drop, must stay on the acquiring thread
pub struct WriteGuard<'a> {
    lock: &'a RwLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{
            AtomicBool, AtomicU32,
            Ordering::SeqCst,
        },
        thread::{scope, sleep, yield_now},
        time::Duration,
    };

    use super::*;
    use crate::sync::test::exhausted;

    fn wait_for(cond: impl Fn() -> bool) {
        while !cond() {
            sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_create_idle() {
        let lock = RwLock::create("testrwlock").unwrap();
        assert_eq!(lock.name(), "testrwlock");
        assert_eq!(lock.state(), LockState::Idle);
        assert_eq!(lock.waiting_writers(), 0);
        lock.destroy();
    }

    #[test]
    fn test_create_reports_allocation_failure() {
        let err = RwLock::create_with("testrwlock", exhausted).err().unwrap();
        assert!(matches!(err, SyncError::Allocation { kind: "rwlock", len: 10, .. }));
    }

    #[test]
    fn test_transitions() {
        let lock = RwLock::create("transitions").unwrap();
        lock.acquire_read();
        lock.acquire_read();
        assert_eq!(lock.state(), LockState::Reading(2));
        lock.release_read();
        assert_eq!(lock.state(), LockState::Reading(1));
        lock.release_read();
        assert_eq!(lock.state(), LockState::Idle);

        lock.acquire_write();
        assert_eq!(lock.state(), LockState::Writing);
        lock.release_write();
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    fn test_readers_share() {
        let lock = RwLock::create("share").unwrap();
        let _g = lock.read();
        scope(|s| {
            // would hang if readers excluded each other
            s.spawn(|| {
                let _g = lock.read();
                assert_eq!(lock.state(), LockState::Reading(2));
            });
        });
        assert_eq!(lock.state(), LockState::Reading(1));
    }

    #[test]
    fn test_writer_excludes_readers() {
        let lock = RwLock::create("exclusive").unwrap();
        let entered = AtomicBool::new(false);
        scope(|s| {
            lock.acquire_write();
            s.spawn(|| {
                let _g = lock.read();
                entered.store(true, SeqCst);
            });
            sleep(Duration::from_millis(100));
            assert!(!entered.load(SeqCst));
            lock.release_write();
        });
        assert!(entered.load(SeqCst));
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = RwLock::create("fairness").unwrap();
        let order = Mutex::new(Vec::new());

        lock.acquire_read();
        scope(|s| {
            s.spawn(|| {
                let _g = lock.write();
                order.lock().push("writer");
            });
            wait_for(|| lock.waiting_writers() == 1);

            s.spawn(|| {
                let _g = lock.read();
                order.lock().push("reader");
            });
            sleep(Duration::from_millis(100));
            // the newcomer queued behind the writer instead of joining us
            assert_eq!(lock.state(), LockState::Reading(1));
            assert!(order.lock().is_empty());

            lock.release_read();
        });

        assert_eq!(order.into_inner(), ["writer", "reader"]);
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    fn test_writer_not_starved() {
        let lock = RwLock::create("starvation").unwrap();
        let written = AtomicBool::new(false);
        scope(|s| {
            // readers keep overlapping each other, a reader-preferring lock never gets idle
            for _ in 0..4 {
                s.spawn(|| {
                    while !written.load(SeqCst) {
                        let _g = lock.read();
                        sleep(Duration::from_millis(2));
                    }
                });
            }
            sleep(Duration::from_millis(20));
            let _g = lock.write();
            written.store(true, SeqCst);
        });
        assert!(written.load(SeqCst));
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = RwLock::create("stress").unwrap();
        let readers = AtomicU32::new(0);
        let writers = AtomicU32::new(0);
        scope(|s| {
            for i in 0..8 {
                let (lock, readers, writers) = (&lock, &readers, &writers);
                s.spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            lock.acquire_read();
                            readers.fetch_add(1, SeqCst);
                            assert_eq!(writers.load(SeqCst), 0);
                            yield_now();
                            readers.fetch_sub(1, SeqCst);
                            lock.release_read();
                        } else {
                            lock.acquire_write();
                            assert_eq!(writers.fetch_add(1, SeqCst), 0);
                            assert_eq!(readers.load(SeqCst), 0);
                            yield_now();
                            writers.fetch_sub(1, SeqCst);
                            lock.release_write();
                        }
                    }
                });
            }
        });
        assert_eq!(lock.state(), LockState::Idle);
        assert_eq!(lock.waiting_writers(), 0);
    }

    #[test]
    fn test_guards_release_on_drop() {
        let lock = RwLock::create("guards").unwrap();
        {
            let _a = lock.read();
            let _b = lock.read();
            assert_eq!(lock.state(), LockState::Reading(2));
        }
        assert_eq!(lock.state(), LockState::Idle);
        {
            let _w = lock.write();
            assert_eq!(lock.state(), LockState::Writing);
        }
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    #[should_panic(expected = "rwlock testrwlock: release_write without a held write lock")]
    fn test_release_write_not_held() {
        let lock = RwLock::create("testrwlock").unwrap();
        lock.release_write();
    }

    #[test]
    #[should_panic(expected = "rwlock testrwlock: release_read without a held read lock")]
    fn test_release_read_not_held() {
        let lock = RwLock::create("testrwlock").unwrap();
        lock.release_read();
    }

    #[test]
    #[should_panic(expected = "release_read without a held read lock")]
    fn test_double_release_read() {
        let lock = RwLock::create("double").unwrap();
        lock.acquire_read();
        lock.release_read();
        lock.release_read();
    }

    #[test]
    #[should_panic(expected = "release_read without a held read lock")]
    fn test_release_read_while_writing() {
        let lock = RwLock::create("mixed").unwrap();
        lock.acquire_write();
        lock.release_read();
    }

    #[test]
    fn test_release_read_held_by_another_thread() {
        let lock = RwLock::create("foreign_read").unwrap();
        lock.acquire_read();
        scope(|s| {
            let err = s.spawn(|| lock.release_read()).join().unwrap_err();
            let msg = err.downcast_ref::<String>().unwrap();
            assert_eq!(msg, "rwlock foreign_read: release_read without a held read lock");
        });
        // the reader's hold is untouched and still releasable by its owner
        assert_eq!(lock.state(), LockState::Reading(1));
        lock.release_read();
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[test]
    fn test_read_holds_are_per_lock() {
        let a = RwLock::create("a").unwrap();
        let b = RwLock::create("b").unwrap();
        a.acquire_read();
        b.acquire_read();
        b.acquire_read();
        b.release_read();
        a.release_read();
        b.release_read();
        assert_eq!(a.state(), LockState::Idle);
        assert_eq!(b.state(), LockState::Idle);
    }

    #[test]
    #[should_panic(expected = "rwlock a: release_read without a held read lock")]
    fn test_read_hold_on_other_lock_does_not_count() {
        let a = RwLock::create("a").unwrap();
        let b = RwLock::create("b").unwrap();
        b.acquire_read();
        a.release_read();
    }

    #[test]
    #[should_panic(expected = "held by another thread")]
    fn test_release_write_from_other_thread() {
        let lock = RwLock::create("foreign").unwrap();
        scope(|s| {
            s.spawn(|| lock.acquire_write());
        });
        lock.release_write();
    }

    #[test]
    #[should_panic(expected = "acquire_write while already holding it")]
    fn test_recursive_write() {
        let lock = RwLock::create("recursive").unwrap();
        lock.acquire_write();
        lock.acquire_write();
    }
}
