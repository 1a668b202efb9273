//! Domain models shared across the workspace.

pub mod history;
pub mod record;

pub use history::{RunHistoryEntry, RunSource, RunStatus};
pub use record::{make_item_id, normalize_report_date, FieldValue, RawRecord, RetailRecord};

#[cfg(any(test, feature = "test-fixtures"))]
pub use record::sample_raw;
