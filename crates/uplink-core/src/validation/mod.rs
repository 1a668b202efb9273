//! Validation modules

pub mod batch;

pub use batch::{validate_batch, RecordFailure};
