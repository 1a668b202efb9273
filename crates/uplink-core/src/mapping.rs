//! Operator-defined field mappings.
//!
//! A mapping names a source table (or sheet), the auto-increment column
//! used for record ids, and ordered (source column → API field) pairs.
//! Identifiers are validated here with the same whitelist the query
//! builder re-applies at build time: this is the sole SQL-injection
//! defense, deliberately a character whitelist rather than a SQL parser.

use serde::{Deserialize, Serialize};

use crate::error::UplinkError;
use crate::schema::{self, REQUIRED_FIELDS};

/// Name of the reserved built-in mapping. It always resolves and can
/// never be deleted.
pub const DEFAULT_MAPPING_NAME: &str = "default";

pub const DEFAULT_TABLE: &str = "retail_data";
pub const DEFAULT_ID_COLUMN: &str = "id";

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

/// One (source column → API field) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldPair {
    pub source: String,
    pub api: String,
}

impl FieldPair {
    pub fn new(source: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            api: api.into(),
        }
    }
}

/// A named, persisted mapping from local column names to the fixed API
/// schema. Loaded once per run and immutable while the run lasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub fields: Vec<FieldPair>,
}

/// True if `identifier` is safe to interpolate into a query: non-empty,
/// ASCII alphanumeric and underscore only.
pub fn is_safe_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FieldMapping {
    /// The built-in mapping for the stock `retail_data` table layout.
    pub fn default_mapping() -> Self {
        let pairs = [
            ("social_credit_code", "socialCreditCode"),
            ("comp_name", "compName"),
            ("retail_store_code", "retailStoreCode"),
            ("retail_store_name", "retailStoreName"),
            ("report_date", "reportDate"),
            ("commodity_code", "selfCommondityCode"),
            ("commodity_name", "selfCommondityName"),
            ("unit", "unit"),
            ("spec", "spec"),
            ("barcode", "barcode"),
            ("data_type", "dataType"),
            ("data_value", "dataValue"),
            ("data_convert_flag", "dataConvertFlag"),
            ("standard_commodity_code", "standardCommondityCode"),
            ("standard_commodity_name", "standardCommondityName"),
            ("package_name", "packageName"),
            ("supplier_code", "supplierCode"),
            ("supplier_name", "supplierName"),
            ("manufacturer", "manufatureName"),
            ("origin_code", "originCode"),
            ("origin_name", "originName"),
            ("scene_flag", "sceneflag"),
        ];
        Self {
            name: DEFAULT_MAPPING_NAME.to_string(),
            table: DEFAULT_TABLE.to_string(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            fields: pairs
                .into_iter()
                .map(|(source, api)| FieldPair::new(source, api))
                .collect(),
        }
    }

    /// Source column mapped to `api`, if any.
    pub fn source_for(&self, api: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|pair| pair.api == api)
            .map(|pair| pair.source.as_str())
    }

    /// Source column carrying the report date.
    pub fn report_date_source(&self) -> Option<&str> {
        self.source_for(schema::REPORT_DATE_FIELD)
    }

    /// Check the mapping against the fixed schema. Returns every problem
    /// found, not just the first.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("mapping name must not be empty".to_string());
        }
        if !is_safe_identifier(&self.table) {
            problems.push(format!("unsafe table name '{}'", self.table));
        }
        if !is_safe_identifier(&self.id_column) {
            problems.push(format!("unsafe id column '{}'", self.id_column));
        }
        if self.fields.is_empty() {
            problems.push("mapping has no field pairs".to_string());
        }

        for pair in &self.fields {
            if !is_safe_identifier(&pair.source) {
                problems.push(format!("unsafe source column '{}'", pair.source));
            }
            if !schema::is_api_field(&pair.api) {
                problems.push(format!("'{}' is not an API field", pair.api));
            }
        }

        for (i, pair) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|p| p.source == pair.source) {
                problems.push(format!("source column '{}' mapped twice", pair.source));
            }
            if self.fields[..i].iter().any(|p| p.api == pair.api) {
                problems.push(format!("API field '{}' mapped twice", pair.api));
            }
        }

        for (required, label) in REQUIRED_FIELDS {
            if self.source_for(required).is_none() {
                problems.push(format!("required field '{}' ({}) is not mapped", required, label));
            }
        }

        problems
    }

    /// Validation as a hard gate, for use before extraction.
    pub fn ensure_valid(&self) -> Result<(), UplinkError> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(UplinkError::Configuration(format!(
                "mapping '{}' is invalid: {}",
                self.name,
                problems.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping_is_valid() {
        assert!(FieldMapping::default_mapping().validate().is_empty());
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let mut mapping = FieldMapping::default_mapping();
        mapping.fields.retain(|pair| pair.api != "barcode");
        let problems = mapping.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("barcode"));
    }

    #[test]
    fn test_extra_optional_fields_accepted() {
        let mut mapping = FieldMapping::default_mapping();
        // Optional fields beyond the required set are fine; dropping one
        // must not invalidate the mapping.
        mapping.fields.retain(|pair| pair.api != "packageName");
        assert!(mapping.validate().is_empty());
    }

    #[test]
    fn test_unsafe_identifiers_rejected() {
        let mut mapping = FieldMapping::default_mapping();
        mapping.table = "retail_data; DROP TABLE users".to_string();
        mapping.fields[0].source = "social_credit_code--".to_string();
        let problems = mapping.validate();
        assert!(problems.iter().any(|p| p.contains("unsafe table name")));
        assert!(problems.iter().any(|p| p.contains("unsafe source column")));
    }

    #[test]
    fn test_unknown_api_field_rejected() {
        let mut mapping = FieldMapping::default_mapping();
        mapping.fields.push(FieldPair::new("extra", "notAField"));
        assert!(mapping
            .validate()
            .iter()
            .any(|p| p.contains("'notAField' is not an API field")));
    }

    #[test]
    fn test_duplicate_pairs_rejected() {
        let mut mapping = FieldMapping::default_mapping();
        mapping.fields.push(FieldPair::new("unit", "unit"));
        let problems = mapping.validate();
        assert!(problems.iter().any(|p| p.contains("mapped twice")));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mapping = FieldMapping {
            name: "empty".to_string(),
            table: DEFAULT_TABLE.to_string(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            fields: Vec::new(),
        };
        assert!(mapping.ensure_valid().is_err());
    }

    #[test]
    fn test_is_safe_identifier() {
        assert!(is_safe_identifier("retail_data"));
        assert!(is_safe_identifier("Table01"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("retail data"));
        assert!(!is_safe_identifier("retail-data"));
        assert!(!is_safe_identifier("retail\u{636e}"));
    }
}
