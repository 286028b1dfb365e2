//! # Synchronization primitives
//!
//! Everything is built bottom-up on the futex wait and wake from the
//! [atomic-wait](https://crates.io/crates/atomic-wait) crate:
//! - `wait(&AtomicU32, u32)` - blocks only if the atomic still has the given value, may wake spuriously
//! - `wake_one(&AtomicU32)` / `wake_all(&AtomicU32)` - wake one / all threads waiting on the atomic
//!
//! [Mutex] and [Condvar] are the internal building blocks, [Semaphore] and [RwLock] are
//! what the rest of the crate uses.

pub mod condvar;
pub mod mutex;
pub mod rwlock;
pub mod semaphore;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};
pub use rwlock::{LockState, ReadGuard, RwLock, WriteGuard};
pub use semaphore::Semaphore;

use std::collections::TryReserveError;

use crate::error::SyncError;

/// How a primitive reserves room for its name, swapped out by tests to fail on purpose
pub(crate) type Reserve = fn(&mut String, usize) -> Result<(), TryReserveError>;

/// Copy a diagnostic name, reporting allocation failure instead of aborting.
/// The error path allocates nothing.
pub(crate) fn owned_name(
    kind: &'static str,
    name: &str,
    reserve: Reserve,
) -> Result<String, SyncError> {
    let mut owned = String::new();
    reserve(&mut owned, name.len()).map_err(|source| SyncError::Allocation {
        kind,
        len: name.len(),
        source,
    })?;
    owned.push_str(name);
    Ok(owned)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// always fails, without allocating: capacity overflow
    pub(crate) fn exhausted(s: &mut String, _: usize) -> Result<(), TryReserveError> {
        s.try_reserve_exact(usize::MAX)
    }

    #[test]
    fn test_owned_name() {
        let name = owned_name("rwlock", "testrwlock", String::try_reserve_exact).unwrap();
        assert_eq!(name, "testrwlock");
    }

    #[test]
    fn test_owned_name_exhausted() {
        let err = owned_name("semaphore", "donesem", exhausted).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Allocation {
                kind: "semaphore",
                len: 7,
                ..
            }
        ));
        assert_eq!(err.to_string(), "failed to allocate a 7 byte name for a semaphore");
    }
}
