//! Database extraction for the uplink pipeline.
//!
//! [`query`] renders a dialect-correct projection query from a validated
//! field mapping; [`mysql`] and [`mssql`] execute it and decode rows into
//! the pipeline's raw record shape. Today's report date is always passed
//! as a bound parameter.

pub mod mssql;
pub mod mysql;
pub mod query;

pub use query::{build_query, SelectQuery};

use chrono::NaiveDate;

use uplink_core::mapping::FieldMapping;
use uplink_core::{DatabaseConfig, Dialect, RawRecord, UplinkError};

/// Extract today's records for `mapping` from the configured database.
pub async fn fetch_records(
    config: &DatabaseConfig,
    mapping: &FieldMapping,
    report_date: NaiveDate,
) -> Result<Vec<RawRecord>, UplinkError> {
    let query = build_query(mapping, config.dialect, report_date)?;
    match config.dialect {
        Dialect::MySql => mysql::fetch(config, &mapping.table, &query).await,
        Dialect::SqlServer => mssql::fetch(config, &mapping.table, &query).await,
    }
}

/// Connectivity check against the configured database.
pub async fn probe(config: &DatabaseConfig) -> Result<(), UplinkError> {
    match config.dialect {
        Dialect::MySql => mysql::probe(config).await,
        Dialect::SqlServer => mssql::probe(config).await,
    }
}
