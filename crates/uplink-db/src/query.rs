//! Dialect-aware query construction from a validated field mapping.
//!
//! Identifiers are interpolated only after passing the same whitelist the
//! mapping store applies at save time; the check is repeated here because
//! mappings can be loaded from disk without re-validation. The report
//! date is always a bound parameter, never interpolated.

use chrono::NaiveDate;

use uplink_core::mapping::FieldMapping;
use uplink_core::schema::{ITEM_ID_FIELD, ITEM_ID_PREFIX, ITEM_ID_SEQ_WIDTH, REPORT_DATE_FIELD};
use uplink_core::{Dialect, UplinkError};

/// A ready-to-execute extraction query. `report_date` is the single bound
/// parameter (`?` for MySQL, `@P1` for SQL Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub sql: String,
    pub report_date: String,
}

fn date_projection(dialect: Dialect, source: &str) -> String {
    match dialect {
        Dialect::MySql => format!(
            "DATE_FORMAT({}, '%Y-%m-%d') AS {}",
            source, REPORT_DATE_FIELD
        ),
        Dialect::SqlServer => format!(
            "CONVERT(VARCHAR(10), {}, 23) AS {}",
            source, REPORT_DATE_FIELD
        ),
    }
}

/// Record id: prefix + compacted report date + zero-padded id column.
/// Functionally identical across dialects, syntactically not.
fn item_id_projection(dialect: Dialect, date_source: &str, id_column: &str) -> String {
    match dialect {
        Dialect::MySql => format!(
            "CONCAT('{prefix}', DATE_FORMAT({date}, '%Y%m%d'), LPAD({id}, {width}, '0')) AS {alias}",
            prefix = ITEM_ID_PREFIX,
            date = date_source,
            id = id_column,
            width = ITEM_ID_SEQ_WIDTH,
            alias = ITEM_ID_FIELD,
        ),
        Dialect::SqlServer => format!(
            "'{prefix}' + CONVERT(CHAR(8), {date}, 112) + RIGHT(REPLICATE('0', {width}) + CAST({id} AS VARCHAR(20)), {width}) AS {alias}",
            prefix = ITEM_ID_PREFIX,
            date = date_source,
            id = id_column,
            width = ITEM_ID_SEQ_WIDTH,
            alias = ITEM_ID_FIELD,
        ),
    }
}

/// Build the extraction query for one mapping, restricted to
/// `report_date`. Fails with a configuration error if the mapping does
/// not pass validation.
pub fn build_query(
    mapping: &FieldMapping,
    dialect: Dialect,
    report_date: NaiveDate,
) -> Result<SelectQuery, UplinkError> {
    mapping.ensure_valid()?;

    // ensure_valid guarantees a reportDate pair exists.
    let date_source = mapping.report_date_source().ok_or_else(|| {
        UplinkError::Configuration(format!(
            "mapping '{}' does not map {}",
            mapping.name, REPORT_DATE_FIELD
        ))
    })?;

    let mut projections = Vec::with_capacity(mapping.fields.len() + 1);
    projections.push(item_id_projection(dialect, date_source, &mapping.id_column));
    for pair in &mapping.fields {
        if pair.api == REPORT_DATE_FIELD {
            projections.push(date_projection(dialect, &pair.source));
        } else {
            projections.push(format!("{} AS {}", pair.source, pair.api));
        }
    }

    let placeholder = match dialect {
        Dialect::MySql => "?",
        Dialect::SqlServer => "@P1",
    };
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        projections.join(", "),
        mapping.table,
        date_source,
        placeholder
    );

    Ok(SelectQuery {
        sql,
        report_date: report_date.format("%Y-%m-%d").to_string(),
    })
}
