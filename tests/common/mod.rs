//! In-memory database doubles for replicator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::HashMap;
use std::sync::Mutex;
use table_replicator::{
    Catalog, ColumnDescriptor, DestinationDatabase, Error, RawValue, Result, RowStream,
    SourceDatabase, TableName, Value,
};

/// Source table held in memory.
pub struct MemorySource {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<RawValue>>,
    /// 1-based row at which the cursor fails
    pub fail_at: Option<u64>,
    /// Opening the scan fails
    pub fail_open: bool,
    pub scans: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<RawValue>>) -> Self {
        Self {
            columns,
            rows,
            fail_at: None,
            fail_open: false,
            scans: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, row: u64) -> Self {
        self.fail_at = Some(row);
        self
    }

    /// Source whose scan statement cannot be opened.
    pub fn failing_scan(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

#[async_trait]
impl Catalog for MemorySource {
    async fn describe_table(&self, table: &TableName) -> Result<Vec<ColumnDescriptor>> {
        if self.columns.is_empty() {
            return Err(Error::schema_introspection(
                table,
                "Table has no columns or doesn't exist",
                None,
            ));
        }
        Ok(self.columns.clone())
    }
}

#[async_trait]
impl SourceDatabase for MemorySource {
    async fn scan<'a>(&'a self, table: &'a TableName, sql: &'a str) -> Result<RowStream<'a>> {
        self.scans.lock().unwrap().push(sql.to_string());
        if self.fail_open {
            return Err(Error::source_query(
                table,
                "Failed to open table scan",
                Some("SELECT command denied to user".into()),
            ));
        }
        if self.columns.is_empty() {
            return Err(Error::column_discovery(table, "no columns"));
        }

        let fail_at = self.fail_at;
        let rows = stream::iter(self.rows.iter().cloned().enumerate())
            .map(move |(idx, row)| {
                let n = idx as u64 + 1;
                if Some(n) == fail_at {
                    Err(Error::row_scan(table, n, "connection lost", None))
                } else {
                    Ok(row)
                }
            })
            .boxed();

        let names = self.columns.iter().map(|c| c.name.clone()).collect();
        Ok(RowStream::new(table.clone(), names, rows))
    }
}

#[derive(Debug, Default)]
pub struct StoredTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
pub struct DestinationState {
    pub tables: HashMap<TableName, StoredTable>,
    pub executed_ddl: Vec<String>,
    pub prepared: Vec<String>,
    pub exists_checks: usize,
    pub create_attempts: usize,
}

/// Destination calls that can be made to fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct DestinationFaults {
    pub table_exists: bool,
    pub create_table: bool,
    pub prepare_insert: bool,
}

/// Destination database held in memory.
///
/// `create_table` materializes `layout` as the new table's columns. Rows whose
/// primary key already exists are rejected like a duplicate-key error.
pub struct MemoryDestination {
    pub layout: Vec<ColumnDescriptor>,
    pub faults: DestinationFaults,
    pub state: Mutex<DestinationState>,
}

impl MemoryDestination {
    pub fn new(layout: Vec<ColumnDescriptor>) -> Self {
        Self {
            layout,
            faults: DestinationFaults::default(),
            state: Mutex::new(DestinationState::default()),
        }
    }

    pub fn failing_exists_check(mut self) -> Self {
        self.faults.table_exists = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.faults.create_table = true;
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.faults.prepare_insert = true;
        self
    }

    pub fn create_attempts(&self) -> usize {
        self.state.lock().unwrap().create_attempts
    }

    /// Destination that already has `table` with `columns`.
    pub fn with_table(self, table: TableName, columns: Vec<ColumnDescriptor>) -> Self {
        self.state.lock().unwrap().tables.insert(
            table,
            StoredTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn rows(&self, table: &TableName) -> Vec<Vec<Value>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn executed_ddl(&self) -> Vec<String> {
        self.state.lock().unwrap().executed_ddl.clone()
    }
}

#[async_trait]
impl Catalog for MemoryDestination {
    async fn describe_table(&self, table: &TableName) -> Result<Vec<ColumnDescriptor>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| Error::schema_introspection(table, "Table doesn't exist", None))
    }
}

#[async_trait]
impl DestinationDatabase for MemoryDestination {
    async fn table_exists(&self, table: &TableName) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.exists_checks += 1;
        if self.faults.table_exists {
            return Err(Error::schema_check(
                table,
                "Failed to check table existence",
                Some("Lost connection to MySQL server during query".into()),
            ));
        }
        Ok(state.tables.contains_key(table))
    }

    async fn create_table(&self, table: &TableName, ddl: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.create_attempts += 1;
        if self.faults.create_table {
            return Err(Error::schema_creation(
                table,
                "Failed to create table",
                Some("CREATE command denied to user".into()),
            ));
        }
        if state.tables.contains_key(table) {
            return Err(Error::schema_creation(table, "Table already exists", None));
        }
        state.executed_ddl.push(ddl.to_string());
        state.tables.insert(
            table.clone(),
            StoredTable {
                columns: self.layout.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn prepare_insert(&self, table: &TableName, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if self.faults.prepare_insert {
            return Err(Error::insert_preparation(
                table,
                "Failed to prepare insert",
                Some("Prepared statement needs to be re-prepared".into()),
            ));
        }
        if !state.tables.contains_key(table) {
            return Err(Error::insert_preparation(table, "Table doesn't exist", None));
        }
        state.prepared.push(sql.to_string());
        Ok(())
    }

    async fn insert_row(
        &self,
        table: &TableName,
        sql: &str,
        row_number: u64,
        row: &[Value],
    ) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if !state.prepared.iter().any(|p| p == sql) {
            return Err(Error::insert(table, row_number, "statement not prepared", None));
        }
        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::insert(table, row_number, "Table doesn't exist", None))?;

        if row.len() != stored.columns.len() {
            return Err(Error::insert(
                table,
                row_number,
                "Column count doesn't match value count",
                None,
            ));
        }

        let key: Vec<usize> = stored
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary())
            .map(|(i, _)| i)
            .collect();
        if !key.is_empty() {
            let duplicate = stored
                .rows
                .iter()
                .any(|existing| key.iter().all(|&i| existing[i] == row[i]));
            if duplicate {
                return Err(Error::insert(
                    table,
                    row_number,
                    format!("Duplicate entry '{}' for key 'PRIMARY'", row[key[0]]),
                    None,
                ));
            }
        }

        stored.rows.push(row.to_vec());
        Ok(1)
    }
}

/// `users (id int PK auto_increment, name varchar(50) NOT NULL, created_at, updated_at)`.
pub fn users_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id", "int")
            .nullable(false)
            .primary()
            .extra("auto_increment"),
        ColumnDescriptor::new("name", "varchar(50)").nullable(false),
        ColumnDescriptor::new("created_at", "timestamp").default("CURRENT_TIMESTAMP"),
        ColumnDescriptor::new("updated_at", "timestamp").default("CURRENT_TIMESTAMP"),
    ]
}

pub fn user(id: i64, name: &[u8], day: u32) -> Vec<RawValue> {
    let stamp = format!("2024-01-{:02} 00:00:00", day);
    vec![
        RawValue::Integer(id),
        RawValue::Bytes(name.to_vec()),
        RawValue::Text(stamp.clone()),
        RawValue::Text(stamp),
    ]
}

/// Three rows, the third repeating the first id.
pub fn users_rows() -> Vec<Vec<RawValue>> {
    vec![user(1, b"ann", 1), user(2, b"bob", 2), user(1, b"dup", 3)]
}
