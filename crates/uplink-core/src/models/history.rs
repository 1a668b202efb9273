//! Run history entries, the durable audit trail of the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failure => write!(f, "failure"),
        }
    }
}

/// What triggered the run that produced an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunSource {
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "spreadsheet-import")]
    SpreadsheetImport,
}

impl Display for RunSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RunSource::Scheduled => write!(f, "scheduled"),
            RunSource::Manual => write!(f, "manual"),
            RunSource::SpreadsheetImport => write!(f, "spreadsheet-import"),
        }
    }
}

/// One line of the audit trail. Appended for every terminal run state,
/// including runs that failed before reaching the network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub record_count: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub source: RunSource,
}

impl RunHistoryEntry {
    pub fn new(
        status: RunStatus,
        record_count: usize,
        message: impl Into<String>,
        error_detail: Option<String>,
        source: RunSource,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            record_count,
            message: message.into(),
            error_detail,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serializes_with_hyphen() {
        let json = serde_json::to_string(&RunSource::SpreadsheetImport).unwrap();
        assert_eq!(json, "\"spreadsheet-import\"");
    }

    #[test]
    fn test_entry_round_trips() {
        let entry = RunHistoryEntry::new(
            RunStatus::Failure,
            0,
            "login failed",
            Some("bad password".into()),
            RunSource::Manual,
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: RunHistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_error_detail_omitted_when_none() {
        let entry = RunHistoryEntry::new(RunStatus::Success, 4, "ok", None, RunSource::Scheduled);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("error_detail"));
    }
}
