//! # Synchronization problems
//! Classic puzzles solved with the primitives from [crate::sync].

pub mod whalemating;

pub use whalemating::{LoggingObserver, MatingObserver, Whalemating};
