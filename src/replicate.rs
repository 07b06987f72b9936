//! Core replication logic for table-replicator.

use crate::config::{ReplicateConfig, TransferConfig};
use crate::database::{DestinationDatabase, SourceDatabase};
use crate::error::{Error, Result};
use crate::metrics::{Timer, TransferStats};
use crate::mysql::MySqlClient;
use crate::schema::TableDefinition;
use crate::transfer::{BulkInserter, RowFailure, TransferOutcome, scan_sql};
use crate::value::describe_row;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// What schema synchronization did to the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum SchemaOutcome {
    /// The table was already there; nothing changed
    Existed,
    /// The table was created with this statement
    Created {
        /// Executed CREATE TABLE statement
        ddl: String,
    },
}

impl SchemaOutcome {
    /// Whether the table was created by this run.
    pub fn created(&self) -> bool {
        matches!(self, SchemaOutcome::Created { .. })
    }
}

/// Result of a completed replication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    /// Run identifier
    pub run_id: Uuid,
    /// Source table
    pub source_table: String,
    /// Destination table
    pub destination_table: String,
    /// Schema synchronization result
    pub schema: SchemaOutcome,
    /// Columns discovered by the scan, in order
    pub columns: Vec<String>,
    /// Row counters
    pub stats: TransferStats,
    /// Rows the destination rejected
    pub failures: Vec<RowFailure>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp when the run completed
    pub completed_at: String,
}

impl TransferReport {
    /// Rows inserted into the destination.
    pub fn rows_inserted(&self) -> u64 {
        self.stats.rows_inserted
    }

    /// Rows read from the source.
    pub fn rows_attempted(&self) -> u64 {
        self.stats.rows_attempted
    }

    /// Whether every source row made it into the destination.
    pub fn all_rows_inserted(&self) -> bool {
        self.failures.is_empty() && self.stats.is_complete()
    }
}

/// Progress callback.
pub type ProgressCallback = Box<dyn Fn(ReplicateProgress) + Send + Sync>;

/// Progress update.
#[derive(Debug, Clone)]
pub struct ReplicateProgress {
    /// Destination table
    pub table: String,
    /// Current phase
    pub phase: ReplicatePhase,
    /// Rows handed to the inserter so far
    pub rows_attempted: u64,
    /// Rows inserted so far
    pub rows_inserted: u64,
}

/// Replication phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatePhase {
    /// Checking the destination catalog
    CheckingSchema,
    /// Creating the destination table
    CreatingTable,
    /// Opening the source scan
    Scanning,
    /// Copying rows
    Inserting,
    /// Completed
    Completed,
    /// Failed
    Failed,
}

impl std::fmt::Display for ReplicatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicatePhase::CheckingSchema => write!(f, "checking schema"),
            ReplicatePhase::CreatingTable => write!(f, "creating table"),
            ReplicatePhase::Scanning => write!(f, "scanning"),
            ReplicatePhase::Inserting => write!(f, "inserting"),
            ReplicatePhase::Completed => write!(f, "completed"),
            ReplicatePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Copies one table from a source database into a destination database.
pub struct Replicator<S, D> {
    config: TransferConfig,
    source: S,
    destination: D,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl Replicator<MySqlClient, MySqlClient> {
    /// Connect to both databases.
    #[instrument(skip(config))]
    pub async fn connect(config: &ReplicateConfig) -> Result<Self> {
        info!("Initializing replicator...");

        let source = MySqlClient::connect(&config.source).await?;
        let destination = MySqlClient::connect(&config.destination).await?;

        Ok(Self::new(config.transfer.clone(), source, destination))
    }

    /// Test connectivity to both databases.
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity...");

        self.source.ping().await?;
        info!("Source: OK");

        self.destination.ping().await?;
        info!("Destination: OK");

        Ok(())
    }

    /// Close both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.destination.close().await;
    }
}

impl<S, D> Replicator<S, D>
where
    S: SourceDatabase,
    D: DestinationDatabase,
{
    /// Create a replicator over already-connected handles.
    pub fn new(config: TransferConfig, source: S, destination: D) -> Self {
        Self {
            config,
            source,
            destination,
            progress_callback: None,
        }
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ReplicateProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Transfer settings.
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Source handle.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Destination handle.
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Synchronize the destination schema, then copy every row.
    ///
    /// Row-level insert failures are collected in the report; any other
    /// failure aborts the run and is returned.
    #[instrument(skip(self), fields(
        source = %self.config.source_table,
        destination = %self.config.destination_table()
    ))]
    pub async fn run(&self) -> Result<TransferReport> {
        let timer = Timer::start("replication");
        let run_id = Uuid::new_v4();

        info!(%run_id, "Starting replication");

        let schema = self.ensure_destination_table().await.inspect_err(|e| {
            self.report_failure(TransferStats::default());
            error!(code = e.code(), "Schema synchronization failed: {}", e);
        })?;

        let (columns, outcome) = self.copy_rows().await?;
        let duration_ms = timer.stop();

        let report = TransferReport {
            run_id,
            source_table: self.config.source_table.to_string(),
            destination_table: self.config.destination_table().to_string(),
            schema,
            columns,
            stats: outcome.stats,
            failures: outcome.failures,
            duration_ms,
            completed_at: chrono::Utc::now().to_rfc3339(),
        };

        if report.all_rows_inserted() {
            info!(
                "Replication completed in {}ms. Total rows migrated: {}",
                duration_ms,
                report.rows_inserted()
            );
        } else {
            warn!(
                "Replication completed with errors in {}ms. \
                 Inserted: {}, Attempted: {}, Failed: {}",
                duration_ms,
                report.rows_inserted(),
                report.rows_attempted(),
                report.stats.rows_failed()
            );
        }

        Ok(report)
    }

    /// Describe the source table and synthesize its column definitions.
    pub async fn synthesize_definition(&self) -> Result<TableDefinition> {
        let columns = self
            .source
            .describe_table(&self.config.source_table)
            .await?;

        debug!(
            "Introspected {} columns from {}",
            columns.len(),
            self.config.source_table
        );
        Ok(TableDefinition::synthesize(
            &columns,
            self.config.default_quoting,
        ))
    }

    /// Ensure the destination table exists, creating it from the source
    /// definition when it does not. Running it again is a no-op.
    #[instrument(skip(self), fields(target = %self.config.destination_table()))]
    pub async fn ensure_destination_table(&self) -> Result<SchemaOutcome> {
        let target = self.config.destination_table();
        self.report_progress(ReplicatePhase::CheckingSchema, TransferStats::default());

        if self.destination.table_exists(target).await? {
            info!("Table '{}' already exists", target);
            return Ok(SchemaOutcome::Existed);
        }

        if !self.config.create_missing_table {
            return Err(Error::schema_check(
                target,
                "Destination table does not exist and table creation is disabled",
                None,
            ));
        }

        self.report_progress(ReplicatePhase::CreatingTable, TransferStats::default());
        info!("Introspecting schema for {}", self.config.source_table);

        let definition = self.synthesize_definition().await?;
        let ddl = definition.create_table_sql(target);
        self.destination.create_table(target, &ddl).await?;

        info!("Table '{}' created successfully", target);
        Ok(SchemaOutcome::Created { ddl })
    }

    /// Stream every source row into the destination.
    ///
    /// Returns the discovered columns and the final outcome. A scan error
    /// aborts the copy; rows already inserted stay in the destination.
    #[instrument(skip(self), fields(
        source = %self.config.source_table,
        destination = %self.config.destination_table()
    ))]
    pub async fn copy_rows(&self) -> Result<(Vec<String>, TransferOutcome)> {
        let source_table = &self.config.source_table;
        let target = self.config.destination_table();

        info!(
            "Starting data migration from '{}' to '{}'",
            source_table, target
        );
        self.report_progress(ReplicatePhase::Scanning, TransferStats::default());

        let sql = scan_sql(source_table);
        let mut stream = self
            .source
            .scan(source_table, &sql)
            .await
            .inspect_err(|_| self.report_failure(TransferStats::default()))?
            .with_utf8_policy(self.config.invalid_utf8);
        let columns = stream.columns().to_vec();
        info!("Columns in source table: {:?}", columns);

        if self.config.verify_column_order {
            self.verify_column_order(&columns)
                .await
                .inspect_err(|_| self.report_failure(TransferStats::default()))?;
        }

        let mut inserter = BulkInserter::prepare(&self.destination, target, stream.width())
            .await
            .inspect_err(|_| self.report_failure(TransferStats::default()))?;

        while let Some(next) = stream.next_row().await {
            let row = match next {
                Ok(row) => row,
                Err(e) => {
                    let stats = inserter.stats();
                    error!(
                        rows_inserted = stats.rows_inserted,
                        "Error iterating over rows: {}", e
                    );
                    self.report_failure(stats);
                    return Err(e);
                }
            };

            if self.config.echo_rows {
                info!("Row {}: {}", stream.fetched(), describe_row(&columns, &row));
            } else {
                debug!("Row {}: {}", stream.fetched(), describe_row(&columns, &row));
            }

            inserter.insert(&row).await;
            self.report_progress(ReplicatePhase::Inserting, inserter.stats());
        }

        let outcome = inserter.finish();
        self.report_progress(ReplicatePhase::Completed, outcome.stats);

        info!(
            "Copied {} of {} rows to {} ({} failed)",
            outcome.stats.rows_inserted,
            outcome.stats.rows_attempted,
            target,
            outcome.stats.rows_failed()
        );

        Ok((columns, outcome))
    }

    /// Check that the destination's columns match the scan's columns by
    /// position. Inserts carry no column list, so a mismatch would shift
    /// values into the wrong columns.
    async fn verify_column_order(&self, columns: &[String]) -> Result<()> {
        let target = self.config.destination_table();
        let found: Vec<String> = self
            .destination
            .describe_table(target)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();

        if found != columns {
            return Err(Error::ColumnOrder {
                table: target.to_string(),
                expected: columns.to_vec(),
                found,
            });
        }

        debug!("Destination column order matches source");
        Ok(())
    }

    fn report_progress(&self, phase: ReplicatePhase, stats: TransferStats) {
        if let Some(ref callback) = self.progress_callback {
            callback(ReplicateProgress {
                table: self.config.destination_table().to_string(),
                phase,
                rows_attempted: stats.rows_attempted,
                rows_inserted: stats.rows_inserted,
            });
        }
    }

    fn report_failure(&self, stats: TransferStats) {
        self.report_progress(ReplicatePhase::Failed, stats);
    }
}
