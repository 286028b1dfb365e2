//! # Test drivers
//! They spawn worker threads calling into the primitives and check what can be observed
//! from the outside. Each returns `Ok` on success, the misuse tests don't return at all.
//!
//! - [rwt1] - readers never see the value change under a read lock
//! - [rwt2] - releasing a write lock never acquired panics
//! - [rwt3] - releasing a read lock never acquired panics
//! - [rwt4] - same as rwt3, from a worker thread
//! - [rwt5] - releasing a write lock another thread holds panics
//! - [sp1] - whales proceed only after matchmakers
//!
//! The misuse drivers are only meaningful in the binary, where any panic aborts the process.

use std::thread;

use rand::Rng;
use tracing::{error, info};

mod rwtest;
mod whalemating;

pub use rwtest::{rwt1, rwt2, rwt3, rwt4, rwt5};
pub use whalemating::sp1;

/// Yields the current thread a random number of times in `0..max`, to shake interleavings up
pub fn random_yielder(max: u32) {
    if max == 0 {
        return;
    }
    let n = rand::thread_rng().gen_range(0..max);
    for _ in 0..n {
        thread::yield_now();
    }
}

pub fn report_success(test: &str) {
    info!(test, "SUCCESS");
}

pub fn report_failure(test: &str, reason: &dyn std::fmt::Display) {
    error!(test, %reason, "FAIL");
}
