//! Error types module
//!
//! All failures in the pipeline are unified under the [`UplinkError`] enum.
//! Variants correspond to the semantic categories the orchestrator cares
//! about: configuration, connectivity, authentication, schema, validation,
//! and upload failures. The orchestrator converts whichever of these it
//! meets into a single terminal run outcome; nothing propagates past it.

use std::fmt;

use crate::validation::RecordFailure;

/// Which remote collaborator a connection failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Database,
    Api,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Database => write!(f, "database"),
            Service::Api => write!(f, "API"),
        }
    }
}

/// A missing table, database, or set of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaIssue {
    /// The configured table does not exist.
    MissingTable(String),
    /// The configured database/catalog does not exist.
    MissingDatabase(String),
    /// Required API fields absent after column mapping.
    MissingFields(Vec<String>),
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaIssue::MissingTable(table) => write!(f, "table '{}' does not exist", table),
            SchemaIssue::MissingDatabase(db) => write!(f, "database '{}' does not exist", db),
            SchemaIssue::MissingFields(fields) => {
                write!(f, "missing required fields: {}", fields.join(", "))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    /// Invalid or missing configuration (field mapping, config file,
    /// unsafe identifier). Fatal for the run, never retried automatically.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The database or API host cannot be reached. Eligible for operator
    /// retry; `timed_out` distinguishes a hung peer from a refused one.
    #[error("cannot reach {service} at {host}:{port}: {detail}")]
    Connection {
        service: Service,
        host: String,
        port: u16,
        detail: String,
        timed_out: bool,
    },

    /// Credentials rejected by the database or the collection API.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Expected table, database, or columns absent.
    #[error("schema error: {0}")]
    Schema(SchemaIssue),

    /// One or more records failed business rules; upload is blocked for
    /// the whole batch.
    #[error("{} record(s) failed validation", .0.len())]
    Validation(Vec<RecordFailure>),

    /// The collection endpoint rejected the batch, or transport failed
    /// mid-submission. `detail` carries the raw server payload when one
    /// was returned.
    #[error("upload failed: {message}")]
    Upload {
        message: String,
        detail: Option<String>,
    },
}

impl UplinkError {
    /// Server-side diagnostic payload, where one exists. Recorded in run
    /// history as `error_detail`.
    pub fn detail(&self) -> Option<String> {
        match self {
            UplinkError::Upload { detail, .. } => detail.clone(),
            UplinkError::Validation(failures) => {
                let lines: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
                Some(lines.join("\n"))
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, UplinkError::Connection { .. })
    }
}
