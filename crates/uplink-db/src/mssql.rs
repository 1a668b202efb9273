//! SQL-Server-family data source, via tiberius.
//!
//! Same contract as the MySQL source: rows come back keyed by API field
//! name with dates already ISO-formatted, and server error codes map to
//! the same distinguishable failure kinds.

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config as TdsConfig, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use uplink_core::schema::REPORT_DATE_FORMAT;
use uplink_core::{DatabaseConfig, FieldValue, RawRecord, SchemaIssue, Service, UplinkError};

use crate::query::SelectQuery;

// SQL Server error numbers, per sys.messages.
const LOGIN_FAILED: u32 = 18456;
const CANNOT_OPEN_DATABASE: u32 = 4060;
const INVALID_OBJECT_NAME: u32 = 208;

fn connection_error(config: &DatabaseConfig, detail: String, timed_out: bool) -> UplinkError {
    UplinkError::Connection {
        service: Service::Database,
        host: config.host.clone(),
        port: config.resolved_port(),
        detail,
        timed_out,
    }
}

fn classify(config: &DatabaseConfig, table: &str, error: tiberius::error::Error) -> UplinkError {
    use tiberius::error::Error;

    match &error {
        Error::Server(token) => match token.code() {
            LOGIN_FAILED => UplinkError::Auth(format!(
                "database rejected user '{}': {}",
                config.username,
                token.message()
            )),
            CANNOT_OPEN_DATABASE => {
                UplinkError::Schema(SchemaIssue::MissingDatabase(config.database.clone()))
            }
            INVALID_OBJECT_NAME => {
                UplinkError::Schema(SchemaIssue::MissingTable(table.to_string()))
            }
            _ => UplinkError::Configuration(format!("database error: {}", token.message())),
        },
        Error::Io { message, .. } => connection_error(config, message.clone(), false),
        Error::Tls(message) => connection_error(config, message.clone(), false),
        other => UplinkError::Configuration(format!("database error: {}", other)),
    }
}

async fn connect(
    config: &DatabaseConfig,
    table: &str,
) -> Result<Client<Compat<TcpStream>>, UplinkError> {
    let mut tds = TdsConfig::new();
    tds.host(&config.host);
    tds.port(config.resolved_port());
    tds.database(&config.database);
    tds.authentication(AuthMethod::sql_server(&config.username, &config.password));
    // Same operational trust decision as the API client: certificate
    // validation is handled by network-level controls.
    tds.trust_cert();

    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(tds.get_addr()))
        .await
        .map_err(|_| connection_error(config, "connect timed out".to_string(), true))?
        .map_err(|e| connection_error(config, e.to_string(), false))?;
    tcp.set_nodelay(true)
        .map_err(|e| connection_error(config, e.to_string(), false))?;

    Client::connect(tds, tcp.compat_write())
        .await
        .map_err(|e| classify(config, table, e))
}

fn decode_value(row: &Row, index: usize) -> Option<FieldValue> {
    if let Ok(value) = row.try_get::<&str, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Text(v.to_string()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Some(value.map(FieldValue::Int).unwrap_or(FieldValue::Null));
    }
    if let Ok(value) = row.try_get::<i32, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Int(v.into()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<u8, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Int(v.into()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Some(value.map(FieldValue::Float).unwrap_or(FieldValue::Null));
    }
    if let Ok(value) = row.try_get::<f32, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Float(v.into()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<Decimal, _>(index) {
        return Some(
            value
                .and_then(|v| v.to_f64())
                .map(FieldValue::Float)
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<chrono::NaiveDate, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Text(v.format(REPORT_DATE_FORMAT).to_string()))
                .unwrap_or(FieldValue::Null),
        );
    }
    if let Ok(value) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return Some(
            value
                .map(|v| FieldValue::Text(v.date().format(REPORT_DATE_FORMAT).to_string()))
                .unwrap_or(FieldValue::Null),
        );
    }
    None
}

fn decode_row(row: &Row) -> RawRecord {
    let names: Vec<String> = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    let mut record = RawRecord::new();
    for (index, name) in names.into_iter().enumerate() {
        match decode_value(row, index) {
            Some(value) => record.insert(name, value),
            None => {
                warn!(column = %name, "undecodable column value, treating as null");
                record.insert(name, FieldValue::Null);
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
    let mut client = connect(config, table).await?;
    debug!(sql = %query.sql, date = %query.report_date, "executing extraction query");

    let rows = client
        .query(query.sql.as_str(), &[&query.report_date])
        .await
        .map_err(|e| classify(config, table, e))?
        .into_first_result()
        .await
        .map_err(|e| classify(config, table, e))?;

    Ok(rows.iter().map(decode_row).collect())
}

/// Connectivity check. Login already opens the configured database, so
/// missing databases and bad credentials surface here distinctly.
pub async fn probe(config: &DatabaseConfig) -> Result<(), UplinkError> {
    let mut client = connect(config, "").await?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| classify(config, "", e))?
        .into_first_result()
        .await
        .map_err(|e| classify(config, "", e))?;
    Ok(())
}
