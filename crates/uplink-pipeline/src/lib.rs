//! The extraction-and-upload pipeline.
//!
//! A run pulls raw records from a [`source::DataSource`] (database or
//! spreadsheet), validates them as a batch, and submits them through the
//! API client, recording one history entry per terminal state. The
//! [`orchestrator::UploadOrchestrator`] owns that sequence and the
//! at-most-one-concurrent-run lock.

pub mod orchestrator;
pub mod source;
pub mod spreadsheet;
pub mod trigger;

pub use orchestrator::{FailedStage, RunOutcome, UploadOrchestrator};
pub use source::{DataSource, DatabaseSource};
pub use spreadsheet::SpreadsheetSource;
pub use trigger::{run_every, CycleStats};
