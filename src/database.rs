//! Database handle abstractions used by the replicator.
//!
//! - [`Catalog`]: reads a table's column metadata
//! - [`SourceDatabase`]: opens a full-table forward scan
//! - [`DestinationDatabase`]: existence checks, DDL and positional inserts
//!
//! [`MySqlClient`](crate::mysql::MySqlClient) implements all three. Tests use
//! in-memory implementations.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashSet;
use tracing::warn;

use crate::error::{Error, Result};
use crate::schema::{ColumnDescriptor, TableName};
use crate::value::{RawValue, Row, Utf8Policy, Value, normalize_row};

/// Read access to a database's column catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Describe a table's columns in catalog order.
    ///
    /// Fails with `SchemaIntrospection` if the table does not exist or the
    /// catalog query fails.
    async fn describe_table(&self, table: &TableName) -> Result<Vec<ColumnDescriptor>>;
}

/// A database rows are copied from.
#[async_trait]
pub trait SourceDatabase: Catalog {
    /// Open a forward-only scan running `sql` against `table`.
    ///
    /// Fails with `SourceQuery` if the statement cannot be opened and with
    /// `ColumnDiscovery` if it exposes no columns.
    async fn scan<'a>(&'a self, table: &'a TableName, sql: &'a str) -> Result<RowStream<'a>>;
}

/// A database rows are copied into.
#[async_trait]
pub trait DestinationDatabase: Catalog {
    /// Whether the table exists. Fails with `SchemaCheck`.
    async fn table_exists(&self, table: &TableName) -> Result<bool>;

    /// Execute a CREATE TABLE statement. Fails with `SchemaCreation`.
    async fn create_table(&self, table: &TableName, ddl: &str) -> Result<()>;

    /// Prepare an insert statement for reuse. Fails with `InsertPreparation`.
    async fn prepare_insert(&self, table: &TableName, sql: &str) -> Result<()>;

    /// Execute a prepared insert with `row` bound positionally.
    ///
    /// Fails with `Insert`; `row_number` is the 1-based index used in the error.
    async fn insert_row(
        &self,
        table: &TableName,
        sql: &str,
        row_number: u64,
        row: &[Value],
    ) -> Result<u64>;
}

/// Scan of a source table: discovered columns plus a lazy row sequence.
///
/// Rows are normalized as they are pulled, so every [`Row`] yielded is free
/// of raw byte values and exactly as wide as [`RowStream::columns`].
/// Bytes that are not valid UTF-8 fail the row unless the stream was built
/// with [`Utf8Policy::Replace`].
pub struct RowStream<'a> {
    table: TableName,
    columns: Vec<String>,
    rows: BoxStream<'a, Result<Vec<RawValue>>>,
    fetched: u64,
    utf8_policy: Utf8Policy,
    lossy_columns: HashSet<usize>,
}

impl<'a> RowStream<'a> {
    /// Wrap a raw row stream. `columns` is the discovered column list.
    pub fn new(
        table: TableName,
        columns: Vec<String>,
        rows: BoxStream<'a, Result<Vec<RawValue>>>,
    ) -> Self {
        Self {
            table,
            columns,
            rows,
            fetched: 0,
            utf8_policy: Utf8Policy::default(),
            lossy_columns: HashSet::new(),
        }
    }

    /// Set how byte values that are not valid UTF-8 are handled.
    pub fn with_utf8_policy(mut self, policy: Utf8Policy) -> Self {
        self.utf8_policy = policy;
        self
    }

    /// Discovered column names, in scan order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns every row has.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Rows pulled so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Pull the next row; `None` once the cursor is exhausted.
    pub async fn next_row(&mut self) -> Option<Result<Row>> {
        let raw = self.rows.next().await?;
        self.fetched += 1;

        let values = match raw {
            Ok(values) => values,
            Err(e) => return Some(Err(e)),
        };
        if values.len() != self.columns.len() {
            return Some(Err(Error::row_scan(
                &self.table,
                self.fetched,
                format!(
                    "expected {} values, got {}",
                    self.columns.len(),
                    values.len()
                ),
                None,
            )));
        }

        Some(match normalize_row(values, self.utf8_policy) {
            Ok(row) => {
                for idx in row.replaced {
                    if self.lossy_columns.insert(idx) {
                        warn!(
                            table = %self.table,
                            column = %self.columns[idx],
                            "Invalid UTF-8 replaced with U+FFFD, first seen in row {}",
                            self.fetched
                        );
                    }
                }
                Ok(row.values)
            }
            Err(idx) => Err(Error::row_scan(
                &self.table,
                self.fetched,
                format!("column '{}' holds bytes that are not valid UTF-8", self.columns[idx]),
                None,
            )),
        })
    }

    /// Columns that had invalid UTF-8 replaced so far.
    pub fn lossy_columns(&self) -> Vec<&str> {
        let mut idx: Vec<usize> = self.lossy_columns.iter().copied().collect();
        idx.sort_unstable();
        idx.into_iter().map(|i| self.columns[i].as_str()).collect()
    }
}

impl std::fmt::Debug for RowStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("fetched", &self.fetched)
            .finish()
    }
}
