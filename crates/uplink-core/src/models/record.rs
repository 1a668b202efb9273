//! Record types flowing through the pipeline.
//!
//! A [`RawRecord`] is what a data source produces: values keyed by API field
//! name, loosely typed because spreadsheets and databases disagree about
//! types. A [`RetailRecord`] is the strict wire shape submitted to the
//! collection endpoint, built from a raw record after batch validation.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::schema::{
    DEFAULT_DATA_CONVERT_FLAG, DEFAULT_SCENE_FLAG, ITEM_ID_FIELD, ITEM_ID_PREFIX,
    ITEM_ID_SEQ_WIDTH, REPORT_DATE_FORMAT,
};

/// A single cell as produced by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Null or blank text. Numeric zero is a legal observation value and
    /// is never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Int(_) | FieldValue::Float(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value. Strict: text is not coerced here; sources coerce
    /// numeric-looking cells before records reach validation.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Render for the string-typed wire fields.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Text(s) => s.trim().to_string(),
        }
    }
}

/// One row from a data source, keyed by API field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, FieldValue>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn item_id(&self) -> Option<&str> {
        self.get(ITEM_ID_FIELD).and_then(FieldValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Build a record id: fixed prefix + compacted report date + zero-padded
/// sequence. Stable and collision-free within one reporting date as long
/// as sequence numbers are unique within the batch.
pub fn make_item_id(report_date: &str, sequence: u64) -> String {
    format!(
        "{}{}{:0width$}",
        ITEM_ID_PREFIX,
        report_date.replace('-', ""),
        sequence,
        width = ITEM_ID_SEQ_WIDTH
    )
}

/// Normalize a source date cell to `YYYY-MM-DD`.
///
/// Accepts the wire format itself, slashed and compact variants, datetime
/// strings, and Excel serial day numbers (days since 1899-12-30, the
/// representation spreadsheet exports leave behind for date cells).
pub fn normalize_report_date(value: &FieldValue) -> Option<String> {
    const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);
    // Serial numbers outside this window are more likely stray integers
    // than dates (covers 1954..2117).
    const SERIAL_RANGE: std::ops::RangeInclusive<i64> = 20_000..=80_000;

    let from_serial = |days: i64| -> Option<String> {
        if !SERIAL_RANGE.contains(&days) {
            return None;
        }
        let epoch = NaiveDate::from_ymd_opt(EXCEL_EPOCH.0, EXCEL_EPOCH.1, EXCEL_EPOCH.2)?;
        Some(
            epoch
                .checked_add_signed(Duration::days(days))?
                .format(REPORT_DATE_FORMAT)
                .to_string(),
        )
    };

    match value {
        FieldValue::Null => None,
        FieldValue::Int(days) => from_serial(*days),
        FieldValue::Float(days) if days.fract() == 0.0 => from_serial(*days as i64),
        FieldValue::Float(_) => None,
        FieldValue::Text(raw) => {
            let raw = raw.trim();
            for format in [REPORT_DATE_FORMAT, "%Y/%m/%d", "%Y%m%d"] {
                if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                    return Some(date.format(REPORT_DATE_FORMAT).to_string());
                }
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
                if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
                    return Some(dt.date().format(REPORT_DATE_FORMAT).to_string());
                }
            }
            raw.parse::<i64>().ok().and_then(from_serial)
        }
    }
}

/// The wire shape of one observation, matching the collection endpoint
/// field for field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailRecord {
    pub item_id: String,
    pub social_credit_code: String,
    pub comp_name: String,
    pub retail_store_code: String,
    pub retail_store_name: String,
    pub report_date: String,
    pub self_commondity_code: String,
    pub self_commondity_name: String,
    pub unit: String,
    pub spec: String,
    pub barcode: String,
    pub data_type: i64,
    pub data_value: f64,
    pub data_convert_flag: i64,
    pub standard_commondity_code: String,
    pub standard_commondity_name: String,
    pub package_name: String,
    pub supplier_code: String,
    pub supplier_name: String,
    pub manufature_name: String,
    pub origin_code: String,
    pub origin_name: String,
    pub sceneflag: i64,
}

impl RetailRecord {
    /// Build the wire record from a validated raw record. Callers run
    /// [`crate::validation::validate_batch`] first; failures here mean a
    /// source produced a batch that was never validated.
    pub fn from_raw(raw: &RawRecord) -> Result<Self, String> {
        let text = |field: &str| -> String {
            raw.get(field).map(FieldValue::to_text).unwrap_or_default()
        };
        let required = |field: &str| -> Result<String, String> {
            match raw.get(field) {
                Some(value) if !value.is_empty() => Ok(value.to_text()),
                _ => Err(format!("field '{}' is missing", field)),
            }
        };
        let int_or = |field: &str, default: i64| -> Result<i64, String> {
            match raw.get(field) {
                None | Some(FieldValue::Null) => Ok(default),
                Some(value) => value
                    .as_int()
                    .ok_or_else(|| format!("field '{}' is not an integer", field)),
            }
        };

        let data_type = raw
            .get("dataType")
            .and_then(FieldValue::as_int)
            .ok_or_else(|| "field 'dataType' is not an integer".to_string())?;
        let data_value = raw
            .get("dataValue")
            .and_then(FieldValue::as_float)
            .ok_or_else(|| "field 'dataValue' is not numeric".to_string())?;

        Ok(Self {
            item_id: required(ITEM_ID_FIELD)?,
            social_credit_code: required("socialCreditCode")?,
            comp_name: required("compName")?,
            retail_store_code: required("retailStoreCode")?,
            retail_store_name: required("retailStoreName")?,
            report_date: required("reportDate")?,
            self_commondity_code: required("selfCommondityCode")?,
            self_commondity_name: required("selfCommondityName")?,
            unit: required("unit")?,
            spec: required("spec")?,
            barcode: required("barcode")?,
            data_type,
            data_value,
            data_convert_flag: int_or("dataConvertFlag", DEFAULT_DATA_CONVERT_FLAG)?,
            standard_commondity_code: text("standardCommondityCode"),
            standard_commondity_name: text("standardCommondityName"),
            package_name: text("packageName"),
            supplier_code: text("supplierCode"),
            supplier_name: text("supplierName"),
            manufature_name: text("manufatureName"),
            origin_code: text("originCode"),
            origin_name: text("originName"),
            sceneflag: int_or("sceneflag", DEFAULT_SCENE_FLAG)?,
        })
    }
}

/// Raw record with all required fields populated. Test fixture shared by
/// the validation and pipeline tests.
#[cfg(any(test, feature = "test-fixtures"))]
pub fn sample_raw(data_type: i64, data_value: f64) -> RawRecord {
    let mut raw = RawRecord::new();
    raw.insert("itemId", FieldValue::Text("YN20250807000001".into()));
    raw.insert("socialCreditCode", FieldValue::Text("91532901792864164X".into()));
    raw.insert("compName", FieldValue::Text("Sifangjie Trading Co.".into()));
    raw.insert("retailStoreCode", FieldValue::Text("SFJRPA1234".into()));
    raw.insert("retailStoreName", FieldValue::Text("Sifangjie store".into()));
    raw.insert("reportDate", FieldValue::Text("2025-08-07".into()));
    raw.insert("selfCommondityCode", FieldValue::Text("170060".into()));
    raw.insert("selfCommondityName", FieldValue::Text("Peanut milk 1.5L".into()));
    raw.insert("unit", FieldValue::Text("bottle".into()));
    raw.insert("spec", FieldValue::Text("1.5L".into()));
    raw.insert("barcode", FieldValue::Text("6901234567890".into()));
    raw.insert("dataType", FieldValue::Int(data_type));
    raw.insert("dataValue", FieldValue::Float(data_value));
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_item_id_pads_sequence() {
        assert_eq!(make_item_id("2025-08-07", 1), "YN20250807000001");
        assert_eq!(make_item_id("2025-08-07", 123456), "YN20250807123456");
    }

    #[test]
    fn test_normalize_report_date_formats() {
        for raw in ["2025-08-07", "2025/08/07", "20250807", "2025-08-07 13:45:00"] {
            assert_eq!(
                normalize_report_date(&FieldValue::Text(raw.into())).as_deref(),
                Some("2025-08-07"),
                "failed for {raw}"
            );
        }
    }

    #[test]
    fn test_normalize_report_date_excel_serial() {
        // 45876 days after 1899-12-30.
        assert_eq!(
            normalize_report_date(&FieldValue::Int(45876)).as_deref(),
            Some("2025-08-07")
        );
        assert_eq!(
            normalize_report_date(&FieldValue::Text("45876".into())).as_deref(),
            Some("2025-08-07")
        );
        // Out of the plausible window: not a date.
        assert_eq!(normalize_report_date(&FieldValue::Int(7)), None);
    }

    #[test]
    fn test_normalize_report_date_garbage() {
        assert_eq!(normalize_report_date(&FieldValue::Text("not a date".into())), None);
        assert_eq!(normalize_report_date(&FieldValue::Null), None);
    }

    #[test]
    fn test_from_raw_applies_defaults() {
        let record = RetailRecord::from_raw(&sample_raw(1, 100.0)).unwrap();
        assert_eq!(record.data_convert_flag, 2);
        assert_eq!(record.sceneflag, 1);
        assert_eq!(record.supplier_code, "");
    }

    #[test]
    fn test_from_raw_missing_required_field() {
        let mut raw = sample_raw(1, 100.0);
        raw.insert("unit", FieldValue::Null);
        let err = RetailRecord::from_raw(&raw).unwrap_err();
        assert!(err.contains("unit"));
    }

    #[test]
    fn test_wire_names_match_api_schema() {
        let record = RetailRecord::from_raw(&sample_raw(3, 50.0)).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("itemId"));
        assert!(object.contains_key("socialCreditCode"));
        assert!(object.contains_key("manufatureName"));
        assert!(object.contains_key("sceneflag"));
        assert_eq!(object.len(), 23);
    }

    #[test]
    fn test_zero_data_value_is_not_empty() {
        assert!(!FieldValue::Float(0.0).is_empty());
        assert!(!FieldValue::Int(0).is_empty());
        assert!(FieldValue::Text("  ".into()).is_empty());
    }
}
