//! Core types for the retail observation uplink: the fixed API schema,
//! field mappings, record models, batch validation, configuration, and
//! the persisted mapping/history stores.

pub mod config;
pub mod error;
pub mod mapping;
pub mod models;
pub mod schema;
pub mod store;
pub mod validation;

pub use config::{ApiConfig, Config, DatabaseConfig, Dialect};
pub use error::{SchemaIssue, Service, UplinkError};
pub use mapping::{is_safe_identifier, FieldMapping, FieldPair, DEFAULT_MAPPING_NAME};
pub use models::{
    make_item_id, normalize_report_date, FieldValue, RawRecord, RetailRecord, RunHistoryEntry,
    RunSource, RunStatus,
};
pub use store::{HistoryStore, MappingStore, HISTORY_CAP};
pub use validation::{validate_batch, RecordFailure};
