//! # Errors
//!
//! Only the recoverable failures live here. Misusing a primitive (releasing what isn't held)
//! is not an error value, it's a panic at the point of detection: the lock's state can't be
//! trusted after that, so there's nothing to hand back to the caller.

use std::{collections::TryReserveError, io};

use thiserror::Error;

/// Failures while creating a primitive
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to allocate a {len} byte name for a {kind}")]
    Allocation {
        kind: &'static str,
        len: usize,
        #[source]
        source: TryReserveError,
    },
}

/// Failures reported by the test drivers
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{test}: {role} fork failed")]
    Spawn {
        test: &'static str,
        role: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{test}: {mismatches} reader(s) saw the value change under a read lock")]
    ReadMismatch { test: &'static str, mismatches: usize },

    #[error("{test}: {role} proceeded {ended} time(s) with only {matchmakers} matchmaker(s) started")]
    Pairing {
        test: &'static str,
        role: &'static str,
        ended: usize,
        matchmakers: usize,
    },

    #[error("{test}: expected {expected} {role}(s) to finish, got {got}")]
    Incomplete {
        test: &'static str,
        role: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{test}: misuse went unnoticed, the primitive should have panicked")]
    MisuseTolerated { test: &'static str },

    #[error("bad value `{value}` for {var}")]
    Config {
        var: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}
