//! MySQL client and operations for table-replicator.

use crate::config::{DatabaseConfig, SslMode};
use crate::database::{Catalog, DestinationDatabase, RowStream, SourceDatabase};
use crate::error::{Error, Result};
use crate::schema::{ColumnDescriptor, KeyRole, TableName};
use crate::value::{RawValue, Value};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::mysql::{
    MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column, Executor, MySql, Row, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, info, instrument};

const TABLE_EXISTS_QUERY: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR(255)) AS table_name
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
"#;

/// MySQL client wrapper.
///
/// The pool is capped at one connection: the replicator never overlaps
/// operations on a handle, and prepared statements stay on that connection.
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    /// Connect to MySQL.
    #[instrument(skip(config), fields(url = %mask_url(&config.url)))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to MySQL...");

        let options = MySqlConnectOptions::from_str(&config.url)
            .map_err(|e| Error::connection("Invalid connection URL", e))?
            .ssl_mode(ssl_mode(config.ssl_mode));

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(|e| Error::connection("Failed to connect", e))?;

        info!("Connected to MySQL");
        Ok(Self { pool })
    }

    /// Test connectivity.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::connection("Ping failed", e))?;
        Ok(())
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Catalog for MySqlClient {
    #[instrument(skip(self), fields(table = %table))]
    async fn describe_table(&self, table: &TableName) -> Result<Vec<ColumnDescriptor>> {
        // SHOW COLUMNS reports defaults unquoted on both MySQL and MariaDB
        let sql = format!("SHOW COLUMNS FROM {}", table.as_quoted_identifier());
        let rows: Vec<MySqlRow> = sqlx::raw_sql(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::schema_introspection(table, "Describe query failed", Some(Box::new(e)))
            })?;

        if rows.is_empty() {
            return Err(Error::schema_introspection(
                table,
                "Table has no columns or doesn't exist",
                None,
            ));
        }

        let columns = rows
            .iter()
            .map(row_to_descriptor)
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| {
                Error::schema_introspection(
                    table,
                    "Failed to read column metadata",
                    Some(Box::new(e)),
                )
            })?;

        debug!("Described {} columns of {}", columns.len(), table);
        Ok(columns)
    }
}

#[async_trait]
impl SourceDatabase for MySqlClient {
    #[instrument(skip(self, sql), fields(table = %table))]
    async fn scan<'a>(&'a self, table: &'a TableName, sql: &'a str) -> Result<RowStream<'a>> {
        debug!("Executing query: {}", sql);

        let statement = (&self.pool).prepare(sql).await.map_err(|e| {
            Error::source_query(table, "Failed to open table scan", Some(Box::new(e)))
        })?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        if columns.is_empty() {
            return Err(Error::column_discovery(table, "Scan returned no column metadata"));
        }

        let rows = sqlx::query(sql)
            .fetch(&self.pool)
            .enumerate()
            .map(move |(idx, fetched)| {
                let row_number = idx as u64 + 1;
                fetched
                    .and_then(|row| decode_row(&row))
                    .map_err(|e| {
                        Error::row_scan(table, row_number, e.to_string(), Some(Box::new(e)))
                    })
            })
            .boxed();

        Ok(RowStream::new(table.clone(), columns, rows))
    }
}

#[async_trait]
impl DestinationDatabase for MySqlClient {
    #[instrument(skip(self), fields(table = %table))]
    async fn table_exists(&self, table: &TableName) -> Result<bool> {
        let found: Option<MySqlRow> = sqlx::query(TABLE_EXISTS_QUERY)
            .bind(table.schema.as_deref())
            .bind(&table.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::schema_check(table, "Error checking table existence", Some(Box::new(e)))
            })?;

        Ok(found.is_some())
    }

    #[instrument(skip(self, ddl), fields(table = %table))]
    async fn create_table(&self, table: &TableName, ddl: &str) -> Result<()> {
        debug!("Creating table with DDL: {}", ddl);

        sqlx::raw_sql(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::schema_creation(table, "Create table failed", Some(Box::new(e))))?;
        Ok(())
    }

    async fn prepare_insert(&self, table: &TableName, sql: &str) -> Result<()> {
        (&self.pool).prepare(sql).await.map_err(|e| {
            Error::insert_preparation(table, "Error preparing insert statement", Some(Box::new(e)))
        })?;
        Ok(())
    }

    async fn insert_row(
        &self,
        table: &TableName,
        sql: &str,
        row_number: u64,
        row: &[Value],
    ) -> Result<u64> {
        let query = row.iter().fold(sqlx::query(sql), bind_value);

        let done = query
            .execute(&self.pool)
            .await
            .map_err(|e| Error::insert(table, row_number, e.to_string(), Some(Box::new(e))))?;

        Ok(done.rows_affected())
    }
}

fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disable => MySqlSslMode::Disabled,
        SslMode::Prefer => MySqlSslMode::Preferred,
        SslMode::Require => MySqlSslMode::Required,
    }
}

/// Map one `SHOW COLUMNS` row (Field, Type, Null, Key, Default, Extra).
fn row_to_descriptor(row: &MySqlRow) -> std::result::Result<ColumnDescriptor, sqlx::Error> {
    let text = |idx: usize| -> std::result::Result<Option<String>, sqlx::Error> {
        let raw: Option<Vec<u8>> = row.try_get_unchecked(idx)?;
        Ok(raw.map(|b| String::from_utf8_lossy(&b).into_owned()))
    };

    Ok(column_from_catalog(
        text(0)?.unwrap_or_default(),
        text(1)?.unwrap_or_default(),
        text(2)?.as_deref().unwrap_or_default(),
        text(3)?.as_deref().unwrap_or_default(),
        text(4)?,
        text(5)?.unwrap_or_default(),
    ))
}

fn column_from_catalog(
    field: String,
    column_type: String,
    null: &str,
    key: &str,
    default: Option<String>,
    extra: String,
) -> ColumnDescriptor {
    ColumnDescriptor {
        name: field,
        declared_type: column_type,
        nullable: null.eq_ignore_ascii_case("YES"),
        key_role: KeyRole::from_catalog(key),
        default_value: default,
        extra,
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(v) => query.bind(*v),
        Value::Unsigned(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(s) => query.bind(s.as_str()),
    }
}

/// Decode every column of a row without knowing its shape in advance.
fn decode_row(row: &MySqlRow) -> std::result::Result<Vec<RawValue>, sqlx::Error> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

/// How a column's reported type is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Signed,
    Unsigned,
    Float,
    Double,
    Date,
    DateTime,
    Time,
    Bytes,
}

impl ValueKind {
    /// Classify a type name as reported by the driver (`INT`, `BIGINT UNSIGNED`, ...).
    ///
    /// Strings, decimals, JSON, blobs, bits and enums are read as raw bytes
    /// and normalized to text downstream.
    fn from_type_name(name: &str) -> Self {
        let name = name.to_ascii_uppercase();
        match name.as_str() {
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                ValueKind::Signed
            }
            t if t.ends_with(" UNSIGNED") => ValueKind::Unsigned,
            "FLOAT" => ValueKind::Float,
            "DOUBLE" => ValueKind::Double,
            "DATE" => ValueKind::Date,
            "DATETIME" | "TIMESTAMP" => ValueKind::DateTime,
            "TIME" => ValueKind::Time,
            _ => ValueKind::Bytes,
        }
    }
}

/// Decode one column by its reported type.
///
/// Temporal values are rendered from their wire payload, so zero dates and
/// TIME values outside a single day survive as MySQL prints them.
fn decode_value(row: &MySqlRow, idx: usize) -> std::result::Result<RawValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(RawValue::Null);
    }

    let value = match ValueKind::from_type_name(raw.type_info().name()) {
        ValueKind::Signed => RawValue::Integer(row.try_get_unchecked::<i64, _>(idx)?),
        ValueKind::Unsigned => RawValue::Unsigned(row.try_get_unchecked::<u64, _>(idx)?),
        ValueKind::Float => RawValue::Float(row.try_get_unchecked::<f32, _>(idx)? as f64),
        ValueKind::Double => RawValue::Float(row.try_get_unchecked::<f64, _>(idx)?),
        ValueKind::Date => RawValue::Text(
            format_binary_date(&row.try_get_unchecked::<Vec<u8>, _>(idx)?, false)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
        ),
        ValueKind::DateTime => RawValue::Text(
            format_binary_date(&row.try_get_unchecked::<Vec<u8>, _>(idx)?, true)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
        ),
        ValueKind::Time => RawValue::Text(
            format_binary_time(&row.try_get_unchecked::<Vec<u8>, _>(idx)?)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
        ),
        ValueKind::Bytes => RawValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
    };

    Ok(value)
}

/// Render a binary-protocol DATE/DATETIME/TIMESTAMP payload as MySQL text.
///
/// The payload starts with its length byte: 0 (all zero), 4 (date), 7 (date
/// and time) or 11 (with microseconds). Zero dates and zero month/day parts
/// are kept as-is.
fn format_binary_date(payload: &[u8], with_time: bool) -> std::result::Result<String, String> {
    let (&len, body) = payload
        .split_first()
        .ok_or_else(|| "empty temporal payload".to_string())?;
    if body.len() != len as usize || !matches!(len, 0 | 4 | 7 | 11) {
        return Err(format!("unexpected {}-byte DATETIME payload", payload.len()));
    }

    let mut parts = [0u32; 6];
    let mut micros = 0u32;
    if len >= 4 {
        parts[0] = u16::from_le_bytes([body[0], body[1]]) as u32;
        parts[1] = body[2] as u32;
        parts[2] = body[3] as u32;
    }
    if len >= 7 {
        parts[3] = body[4] as u32;
        parts[4] = body[5] as u32;
        parts[5] = body[6] as u32;
    }
    if len == 11 {
        micros = u32::from_le_bytes([body[7], body[8], body[9], body[10]]);
    }

    let mut text = format!("{:04}-{:02}-{:02}", parts[0], parts[1], parts[2]);
    if with_time {
        text.push_str(&format!(" {:02}:{:02}:{:02}", parts[3], parts[4], parts[5]));
        if micros > 0 {
            text.push_str(&format!(".{:06}", micros));
        }
    }
    Ok(text)
}

/// Render a binary-protocol TIME payload as MySQL text (`-838:59:59`).
///
/// Layout after the length byte: sign, days (u32 LE), hours, minutes,
/// seconds and, for length 12, microseconds (u32 LE).
fn format_binary_time(payload: &[u8]) -> std::result::Result<String, String> {
    let (&len, body) = payload
        .split_first()
        .ok_or_else(|| "empty temporal payload".to_string())?;
    if len == 0 {
        return Ok("00:00:00".to_string());
    }
    if body.len() != len as usize || !matches!(len, 8 | 12) {
        return Err(format!("unexpected {}-byte TIME payload", payload.len()));
    }

    let negative = body[0] == 1;
    let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
    let hours = days as u64 * 24 + body[5] as u64;
    let micros = if len == 12 {
        u32::from_le_bytes([body[8], body[9], body[10], body[11]])
    } else {
        0
    };

    let mut text = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        hours,
        body[6],
        body[7]
    );
    if micros > 0 {
        text.push_str(&format!(".{:06}", micros));
    }
    Ok(text)
}

/// Mask sensitive parts of URL for logging.
pub fn mask_url(url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }
        parsed.to_string()
    } else {
        "[invalid url]".to_string()
    }
}
