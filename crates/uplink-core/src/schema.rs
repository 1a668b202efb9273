//! Fixed field set of the collection API.
//!
//! The platform schema is not negotiable: field names (including the
//! `manufatureName` spelling and lowercase `sceneflag`) are what the
//! collection endpoint accepts.

/// Prefix of every generated record id.
pub const ITEM_ID_PREFIX: &str = "YN";

/// Width of the zero-padded sequence suffix in a record id.
pub const ITEM_ID_SEQ_WIDTH: usize = 6;

/// Wire name of the record id field.
pub const ITEM_ID_FIELD: &str = "itemId";

/// Wire name of the report date field. The only field that gets a
/// dialect-specific cast when extracted from a database.
pub const REPORT_DATE_FIELD: &str = "reportDate";

/// Wire date format used throughout the pipeline.
pub const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

pub const DEFAULT_DATA_CONVERT_FLAG: i64 = 2;
pub const DEFAULT_SCENE_FLAG: i64 = 1;

/// Every business field the endpoint accepts.
pub const API_FIELDS: [&str; 22] = [
    "socialCreditCode",
    "compName",
    "retailStoreCode",
    "retailStoreName",
    "reportDate",
    "selfCommondityCode",
    "selfCommondityName",
    "unit",
    "spec",
    "barcode",
    "dataType",
    "dataValue",
    "dataConvertFlag",
    "standardCommondityCode",
    "standardCommondityName",
    "packageName",
    "supplierCode",
    "supplierName",
    "manufatureName",
    "originCode",
    "originName",
    "sceneflag",
];

/// Fields that must be present and non-empty on every record, with the
/// label used in operator-facing messages.
pub const REQUIRED_FIELDS: [(&str, &str); 12] = [
    ("socialCreditCode", "social credit code"),
    ("compName", "company name"),
    ("retailStoreCode", "retail store code"),
    ("retailStoreName", "retail store name"),
    ("reportDate", "report date"),
    ("selfCommondityCode", "commodity code"),
    ("selfCommondityName", "commodity name"),
    ("unit", "unit"),
    ("spec", "spec"),
    ("barcode", "barcode"),
    ("dataType", "data type"),
    ("dataValue", "data value"),
];

/// True if `name` is part of the fixed API schema (`itemId` included).
pub fn is_api_field(name: &str) -> bool {
    name == ITEM_ID_FIELD || API_FIELDS.contains(&name)
}

/// Label shown to operators for a required field, or the wire name itself.
pub fn field_label(name: &str) -> &str {
    REQUIRED_FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, label)| *label)
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields_are_api_fields() {
        for (field, _) in REQUIRED_FIELDS {
            assert!(is_api_field(field), "{field} missing from API_FIELDS");
        }
    }

    #[test]
    fn test_item_id_is_api_field() {
        assert!(is_api_field("itemId"));
        assert!(!is_api_field("item_id"));
    }

    #[test]
    fn test_field_label_falls_back_to_wire_name() {
        assert_eq!(field_label("dataValue"), "data value");
        assert_eq!(field_label("sceneflag"), "sceneflag");
    }
}
