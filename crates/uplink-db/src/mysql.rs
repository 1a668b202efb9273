//! MySQL-family data source.
//!
//! Converts driver-native temporal and decimal values into the plain
//! text/float shapes the pipeline uses, and maps the driver's native
//! error codes onto the pipeline's failure kinds so a bad password, a
//! missing database, and a missing table stay distinguishable.

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row};
use tracing::{debug, warn};

use uplink_core::schema::REPORT_DATE_FORMAT;
use uplink_core::{DatabaseConfig, FieldValue, RawRecord, SchemaIssue, Service, UplinkError};

use crate::query::SelectQuery;

// MySQL native error codes, per the server error reference.
const ER_ACCESS_DENIED: u16 = 1045;
const ER_BAD_DB: u16 = 1049;
const ER_NO_SUCH_TABLE: u16 = 1146;

fn classify(config: &DatabaseConfig, table: &str, error: sqlx::Error) -> UplinkError {
    let connection = |detail: String, timed_out: bool| UplinkError::Connection {
        service: Service::Database,
        host: config.host.clone(),
        port: config.resolved_port(),
        detail,
        timed_out,
    };

    match &error {
        sqlx::Error::Database(db) => {
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            match number {
                Some(ER_ACCESS_DENIED) => UplinkError::Auth(format!(
                    "database rejected user '{}': {}",
                    config.username,
                    db.message()
                )),
                Some(ER_BAD_DB) => {
                    UplinkError::Schema(SchemaIssue::MissingDatabase(config.database.clone()))
                }
                Some(ER_NO_SUCH_TABLE) => {
                    UplinkError::Schema(SchemaIssue::MissingTable(table.to_string()))
                }
                _ => UplinkError::Configuration(format!("database error: {}", db.message())),
            }
        }
        sqlx::Error::PoolTimedOut => connection("connect timed out".to_string(), true),
        sqlx::Error::Io(e) => connection(e.to_string(), false),
        sqlx::Error::Tls(e) => connection(e.to_string(), false),
        other => UplinkError::Configuration(format!("database error: {}", other)),
    }
}

fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.resolved_port())
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
}

async fn connect(config: &DatabaseConfig, table: &str) -> Result<MySqlPool, UplinkError> {
    MySqlPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(connect_options(config))
        .await
        .map_err(|e| classify(config, table, e))
}

/// Decode one cell without knowing the column type up front. The query
/// projects dates and ids to strings already; everything else is tried
/// from the most common shapes down.
fn decode_value(row: &MySqlRow, index: usize) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Some(value.map(FieldValue::Text).unwrap_or(FieldValue::Null));
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Some(value.map(FieldValue::Int).unwrap_or(FieldValue::Null));
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Int(v.into()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<Option<u64>, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Int(v as i64))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return Some(value.map(FieldValue::Float).unwrap_or(FieldValue::Null));
    }
    if let Ok(value) = row.try_get::<Option<f32>, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Float(v.into()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<Option<Decimal>, _>(index) {
        return Some(
            value
                .and_then(|v| v.to_f64())
                .map(FieldValue::Float)
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Text(v.format(REPORT_DATE_FORMAT).to_string()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Text(v.date().format(REPORT_DATE_FORMAT).to_string()))
                .unwrap_or(FieldValue::Null),
        );
    }
    None
}

fn decode_row(row: &MySqlRow) -> RawRecord {
    let mut record = RawRecord::new();
    for (index, column) in row.columns().iter().enumerate() {
        match decode_value(row, index) {
            Some(value) => record.insert(column.name(), value),
            None => {
                warn!(column = column.name(), "undecodable column value, treating as null");
                record.insert(column.name(), FieldValue::Null);
            }
        }
    }
    record
}

/// Execute the extraction query and decode every row.
pub async fn fetch(
    config: &DatabaseConfig,
    table: &str,
    query: &SelectQuery,
) -> Result<Vec<RawRecord>, UplinkError> {
    let pool = connect(config, table).await?;
    debug!(sql = %query.sql, date = %query.report_date, "executing extraction query");

    let rows = sqlx::query(&query.sql)
        .bind(&query.report_date)
        .fetch_all(&pool)
        .await
        .map_err(|e| classify(config, table, e))?;

    let records = rows.iter().map(decode_row).collect::<Vec<_>>();
    pool.close().await;
    Ok(records)
}

/// Connectivity check: connect to the configured database and run a
/// trivial statement. Distinguishes bad credentials, a missing
/// database, and an unreachable host without touching any table.
pub async fn probe(config: &DatabaseConfig) -> Result<(), UplinkError> {
    let pool = connect(config, "").await?;
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await
        .map_err(|e| classify(config, "", e))?;
    pool.close().await;
    Ok(())
}
