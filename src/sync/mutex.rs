//! # Mutex
//! The low-level exclusion every other primitive here sits on.
//!
//! The state is a u32 so it works with the futex wait & wake:
//! - `0` - unlocked
//! - `1` - locked, nobody else is waiting
//! - `2` - locked, other threads may be waiting
//!
//! Wait and wake take no part in memory consistency, they just spare us from wasting cycles.
//! Acquire on lock and Release on unlock is what makes the protected data visible.
//!
//! ## Avoiding syscalls
//! An uncontended lock/unlock pair does no syscalls at all: `wake_one` is only called when
//! somebody switched the state to `2`. A contended lock spins for a bit first,
//! as critical sections here are a handful of instructions long.

use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Relaxed, Release},
    },
};

use atomic_wait::{wait, wake_one};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

pub struct Mutex<Y> {
    state: AtomicU32,
    value: UnsafeCell<Y>,
}

/// promise to the compiler that it's safe to share if the underlying value is safe to send
unsafe impl<Y> Sync for Mutex<Y> where Y: Send {}

impl<Y> Mutex<Y> {
    pub const fn new(value: Y) -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Y> {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_err()
        {
            Self::lock_contended(&self.state);
        }
        MutexGuard { mutex: self }
    }

    pub fn into_inner(self) -> Y {
        self.value.into_inner()
    }

    /// spin for a while, then fall back to the wait syscall
    #[cold]
    fn lock_contended(state: &AtomicU32) {
        let mut spin_count = 0;

        // only spin on 1: 2 means some other thread already gave up spinning
        while state.load(Relaxed) == LOCKED && spin_count < 100 {
            spin_count += 1;
            std::hint::spin_loop();
        }

        if state
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_ok()
        {
            return;
        }

        // leave 2 behind so the unlocker knows to wake somebody
        while state.swap(CONTENDED, Acquire) != UNLOCKED {
            wait(state, CONTENDED);
        }
    }
}

/// Guard to ease ownership and usage. Dropping it is the only way to unlock.
pub struct MutexGuard<'a, Y> {
    pub(crate) mutex: &'a Mutex<Y>,
}

unsafe impl<Y> Sync for MutexGuard<'_, Y> where Y: Sync {}

impl<Y> Deref for MutexGuard<'_, Y> {
    type Target = Y;
    fn deref(&self) -> &Self::Target {
        // SAFETY: existence of the guard means the mutex is locked
        unsafe { &*self.mutex.value.get() }
    }
}

impl<Y> DerefMut for MutexGuard<'_, Y> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: existence of the guard means the mutex is locked
        unsafe { &mut *self.mutex.value.get() }
    }
}

/// There're no guarantees the woken thread gets the lock, any other thread may be faster.
impl<Y> Drop for MutexGuard<'_, Y> {
    fn drop(&mut self) {
        if self.mutex.state.swap(UNLOCKED, Release) == CONTENDED {
            wake_one(&self.mutex.state);
        }
    }
}
