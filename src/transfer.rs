//! Row insertion with per-row fault isolation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::DestinationDatabase;
use crate::error::Result;
use crate::metrics::TransferStats;
use crate::schema::TableName;
use crate::value::Value;

/// Full unordered scan of a table.
pub fn scan_sql(table: &TableName) -> String {
    format!("SELECT * FROM {}", table.as_quoted_identifier())
}

/// Positional insert with one placeholder per column.
///
/// There is no column list; values land in destination catalog order.
pub fn insert_sql(table: &TableName, width: usize) -> String {
    let placeholders = vec!["?"; width].join(", ");
    format!(
        "INSERT INTO {} VALUES ({})",
        table.as_quoted_identifier(),
        placeholders
    )
}

/// A row the destination rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// 1-based source row index
    pub row: u64,
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

/// Final counters and rejected rows of a transfer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Row counters
    pub stats: TransferStats,
    /// Rows the destination rejected, in source order
    pub failures: Vec<RowFailure>,
}

/// Inserts rows one at a time through a single prepared statement.
///
/// A failed insert is recorded and logged; it never stops the transfer.
pub struct BulkInserter<'a, D: ?Sized> {
    destination: &'a D,
    table: &'a TableName,
    sql: String,
    width: usize,
    outcome: TransferOutcome,
}

impl<'a, D> BulkInserter<'a, D>
where
    D: DestinationDatabase + ?Sized,
{
    /// Build and prepare the insert for `width` columns.
    pub async fn prepare(destination: &'a D, table: &'a TableName, width: usize) -> Result<Self> {
        let sql = insert_sql(table, width);
        debug!("Insert statement: {}", sql);

        destination.prepare_insert(table, &sql).await?;
        debug!("Insert statement prepared");

        Ok(Self {
            destination,
            table,
            sql,
            width,
            outcome: TransferOutcome::default(),
        })
    }

    /// Statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Counters so far.
    pub fn stats(&self) -> TransferStats {
        self.outcome.stats
    }

    /// Insert one row. Returns whether the destination accepted it.
    pub async fn insert(&mut self, row: &[Value]) -> bool {
        debug_assert_eq!(row.len(), self.width, "row width differs from scan width");

        self.outcome.stats.record_attempt();
        let row_number = self.outcome.stats.rows_attempted;

        match self
            .destination
            .insert_row(self.table, &self.sql, row_number, row)
            .await
        {
            Ok(_) => {
                self.outcome.stats.record_insert();
                debug!("Successfully inserted row {}", row_number);
                true
            }
            Err(e) => {
                warn!(
                    row = row_number,
                    code = e.code(),
                    "Error inserting row {}: {}",
                    row_number,
                    e
                );
                self.outcome.failures.push(RowFailure {
                    row: row_number,
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
                false
            }
        }
    }

    /// Finish and hand back the outcome.
    pub fn finish(self) -> TransferOutcome {
        self.outcome
    }
}
