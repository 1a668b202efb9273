//! Business-rule validation of a record batch before submission.
//!
//! Pure over its input: no side effects, same batch in, same failures
//! out. Rules are checked in order and the first failing rule wins per
//! record, but every record in the batch is always checked. A non-empty
//! failure list blocks upload for the whole batch.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{FieldValue, RawRecord};
use crate::schema::{field_label, REPORT_DATE_FORMAT, REQUIRED_FIELDS};

/// One record that failed a rule, paired with the reason.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordFailure {
    /// Zero-based position in the submitted batch.
    pub index: usize,
    pub item_id: Option<String>,
    pub reason: String,
    pub record: RawRecord,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item_id {
            Some(id) => write!(f, "record #{} ({}): {}", self.index + 1, id, self.reason),
            None => write!(f, "record #{}: {}", self.index + 1, self.reason),
        }
    }
}

/// First rule a record breaks, if any.
fn check_record(record: &RawRecord) -> Option<String> {
    for (field, _) in REQUIRED_FIELDS {
        match record.get(field) {
            Some(value) if !value.is_empty() => {}
            _ => return Some(format!("{} must not be empty", field_label(field))),
        }
    }

    let report_date = record.get("reportDate").and_then(FieldValue::as_str);
    match report_date {
        Some(raw) if NaiveDate::parse_from_str(raw.trim(), REPORT_DATE_FORMAT).is_ok() => {}
        _ => return Some("date format error: expected YYYY-MM-DD".to_string()),
    }

    match record.get("dataType").and_then(FieldValue::as_int) {
        Some(1..=4) => {}
        Some(_) => return Some("data type must be one of 1, 2, 3, 4".to_string()),
        None => return Some("data type must be an integer".to_string()),
    }

    let Some(data_value) = record.get("dataValue").and_then(FieldValue::as_float) else {
        return Some("data value must be numeric".to_string());
    };
    if data_value < 0.0 {
        return Some("value cannot be negative".to_string());
    }

    None
}

/// Check a whole batch. Returns one failure per offending record; an
/// empty result means the batch may be uploaded.
pub fn validate_batch(records: &[RawRecord]) -> Vec<RecordFailure> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            check_record(record).map(|reason| RecordFailure {
                index,
                item_id: record.item_id().map(str::to_string),
                reason,
                record: record.clone(),
            })
        })
        .collect()
}
