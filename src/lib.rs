pub mod config;
pub mod error;
pub mod harness;
pub mod sync;
pub mod synchprobs;
