//! Spreadsheet (CSV) data source.
//!
//! Operators fill in the distribution template and export it as CSV.
//! Header cells may be the template's labels, carry a parenthetical API
//! field hint ("商品编码 (selfCommondityCode)"), or be API field names
//! directly; a saved custom mapping can rename anything else. Dates are
//! normalized (including Excel serial day numbers) and a record id is
//! generated per row before records leave this module.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use uplink_core::mapping::FieldMapping;
use uplink_core::schema::{self, ITEM_ID_FIELD, REPORT_DATE_FIELD, REQUIRED_FIELDS};
use uplink_core::{
    make_item_id, normalize_report_date, FieldValue, RawRecord, RunSource, SchemaIssue,
    UplinkError,
};

use crate::source::DataSource;

/// Template labels understood without any custom mapping.
const DEFAULT_HEADERS: [(&str, &str); 19] = [
    ("统一社会信用代码", "socialCreditCode"),
    ("企业名称", "compName"),
    ("零售点编码", "retailStoreCode"),
    ("零售点名称", "retailStoreName"),
    ("上报日期", "reportDate"),
    ("商品编码", "selfCommondityCode"),
    ("商品名称", "selfCommondityName"),
    ("单位", "unit"),
    ("规格", "spec"),
    ("条码", "barcode"),
    ("数据类型", "dataType"),
    ("数据值", "dataValue"),
    ("转换标志", "dataConvertFlag"),
    ("供应商编码", "supplierCode"),
    ("供应商名称", "supplierName"),
    ("生产商名称", "manufatureName"),
    ("产地编码", "originCode"),
    ("产地名称", "originName"),
    ("场景标志", "sceneflag"),
];

fn strip_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\n' | '\r'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// API field named inside `(...)` or `（...）`, if present and valid.
fn parenthetical_hint(header: &str) -> Option<String> {
    let open = header.find(['(', '（'])?;
    let open_char = header[open..].chars().next()?;
    let rest = &header[open + open_char.len_utf8()..];
    let close = rest.find([')', '）'])?;
    let inner = rest[..close].trim();
    schema::is_api_field(inner).then(|| inner.to_string())
}

/// Map one header cell to an API field name, or `None` for columns the
/// pipeline does not consume.
fn resolve_header(raw: &str, custom: Option<&FieldMapping>) -> Option<String> {
    let header = strip_header(raw);
    if header.is_empty() {
        return None;
    }
    if let Some(hint) = parenthetical_hint(&header) {
        return Some(hint);
    }

    let label = header
        .split(['(', '（'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    if let Some(custom) = custom {
        if let Some(pair) = custom
            .fields
            .iter()
            .find(|pair| pair.source == label || pair.source == header)
        {
            return Some(pair.api.clone());
        }
    }
    if let Some((_, api)) = DEFAULT_HEADERS.iter().find(|(l, _)| *l == label) {
        return Some((*api).to_string());
    }
    if schema::is_api_field(&label) {
        return Some(label);
    }
    None
}

/// Coerce one cell for its target field. Numeric fields accept integer
/// and decimal spellings; anything unparseable stays text so validation
/// can report it per record instead of aborting the import.
fn coerce_cell(api_field: &str, cell: &str) -> FieldValue {
    let cell = cell.trim();
    if cell.is_empty() {
        return FieldValue::Null;
    }
    match api_field {
        "dataType" | "dataConvertFlag" | "sceneflag" => {
            if let Ok(value) = cell.parse::<i64>() {
                FieldValue::Int(value)
            } else if let Ok(value) = cell.parse::<f64>() {
                if value.fract() == 0.0 {
                    FieldValue::Int(value as i64)
                } else {
                    FieldValue::Text(cell.to_string())
                }
            } else {
                FieldValue::Text(cell.to_string())
            }
        }
        "dataValue" => cell
            .parse::<f64>()
            .map(FieldValue::Float)
            .unwrap_or_else(|_| FieldValue::Text(cell.to_string())),
        _ => FieldValue::Text(cell.to_string()),
    }
}

/// Read and normalize the whole file. Rows with every cell empty are
/// skipped; the record id is derived from the normalized report date
/// and the row position, unique within the file.
pub fn read_records(
    path: &Path,
    custom: Option<&FieldMapping>,
) -> Result<Vec<RawRecord>, UplinkError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        UplinkError::Configuration(format!("cannot read spreadsheet {}: {}", path.display(), e))
    })?;

    let headers = reader
        .headers()
        .map_err(|e| {
            UplinkError::Configuration(format!(
                "cannot read spreadsheet headers {}: {}",
                path.display(),
                e
            ))
        })?
        .clone();
    let resolved: Vec<Option<String>> = headers
        .iter()
        .map(|header| resolve_header(header, custom))
        .collect();

    let present: HashSet<&str> = resolved
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|(field, _)| !present.contains(field))
        .map(|(field, _)| (*field).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(UplinkError::Schema(SchemaIssue::MissingFields(missing)));
    }

    let mut records = Vec::new();
    for (row_index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| {
            UplinkError::Configuration(format!(
                "malformed spreadsheet row {}: {}",
                row_index + 2,
                e
            ))
        })?;

        let mut record = RawRecord::new();
        for (column, api_field) in resolved.iter().enumerate() {
            if let Some(api_field) = api_field {
                let cell = row.get(column).unwrap_or_default();
                record.insert(api_field.clone(), coerce_cell(api_field, cell));
            }
        }
        if record.iter().all(|(_, value)| value.is_empty()) {
            continue;
        }

        if let Some(value) = record.get(REPORT_DATE_FIELD) {
            if let Some(normalized) = normalize_report_date(value) {
                record.insert(
                    ITEM_ID_FIELD,
                    FieldValue::Text(make_item_id(&normalized, row_index as u64)),
                );
                record.insert(REPORT_DATE_FIELD, FieldValue::Text(normalized));
            }
            // An unnormalizable date stays as-is for validation to report.
        }

        records.push(record);
    }
    Ok(records)
}

/// Records imported from a spreadsheet export of the template.
pub struct SpreadsheetSource {
    path: PathBuf,
    mapping: Option<FieldMapping>,
}

impl SpreadsheetSource {
    pub fn new(path: impl Into<PathBuf>, mapping: Option<FieldMapping>) -> Self {
        Self {
            path: path.into(),
            mapping,
        }
    }
}

#[async_trait]
impl DataSource for SpreadsheetSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>, UplinkError> {
        read_records(&self.path, self.mapping.as_ref())
    }

    fn source(&self) -> RunSource {
        RunSource::SpreadsheetImport
    }
}
