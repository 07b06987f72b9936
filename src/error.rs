//! Error types for table-replicator.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used as the source of driver-level failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for table-replicator operations.
///
/// Every variant except [`Error::Insert`] aborts a replication run. Insert
/// failures are caught per row by the bulk inserter and reported without
/// stopping the transfer.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
        /// Source error if any
        #[source]
        source: Option<BoxError>,
    },

    /// Database connection error
    #[error("MySQL connection error: {message}")]
    Connection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Reading a table's column catalog failed, or the table does not exist
    #[error("Schema introspection failed for table '{table}': {message}")]
    SchemaIntrospection {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Checking whether the destination table exists failed
    #[error("Schema check failed for table '{table}': {message}")]
    SchemaCheck {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Executing the synthesized CREATE TABLE failed
    #[error("Failed to create table '{table}': {message}")]
    SchemaCreation {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Destination columns do not line up positionally with the source scan
    #[error(
        "Column order mismatch on table '{table}': source has [{}], destination has [{}]",
        expected.join(", "),
        found.join(", ")
    )]
    ColumnOrder {
        /// Destination table name
        table: String,
        /// Columns discovered by the source scan
        expected: Vec<String>,
        /// Columns reported by the destination catalog
        found: Vec<String>,
    },

    /// Opening the source table scan failed
    #[error("Source query failed on table '{table}': {message}")]
    SourceQuery {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// The source scan exposed no usable column metadata
    #[error("Column discovery failed on table '{table}': {message}")]
    ColumnDiscovery {
        /// Table name
        table: String,
        /// Error message
        message: String,
    },

    /// A source row could not be fetched or decoded
    #[error("Failed to scan row {row} of table '{table}': {message}")]
    RowScan {
        /// Table name
        table: String,
        /// 1-based row index
        row: u64,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Preparing the destination insert statement failed
    #[error("Failed to prepare insert on table '{table}': {message}")]
    InsertPreparation {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Inserting a single row failed (recoverable)
    #[error("Failed to insert row {row} into '{table}': {message}")]
    Insert {
        /// Table name
        table: String,
        /// 1-based row index
        row: u64,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<BoxError>,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a schema introspection error.
    pub fn schema_introspection(
        table: impl ToString,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::SchemaIntrospection {
            table: table.to_string(),
            message: message.into(),
            source,
        }
    }

    /// Create a schema check error.
    pub fn schema_check(
        table: impl ToString,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::SchemaCheck {
            table: table.to_string(),
            message: message.into(),
            source,
        }
    }

    /// Create a schema creation error.
    pub fn schema_creation(
        table: impl ToString,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::SchemaCreation {
            table: table.to_string(),
            message: message.into(),
            source,
        }
    }

    /// Create a source query error.
    pub fn source_query(
        table: impl ToString,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::SourceQuery {
            table: table.to_string(),
            message: message.into(),
            source,
        }
    }

    /// Create a column discovery error.
    pub fn column_discovery(table: impl ToString, message: impl Into<String>) -> Self {
        Self::ColumnDiscovery {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Create a row scan error.
    pub fn row_scan(
        table: impl ToString,
        row: u64,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::RowScan {
            table: table.to_string(),
            row,
            message: message.into(),
            source,
        }
    }

    /// Create an insert preparation error.
    pub fn insert_preparation(
        table: impl ToString,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::InsertPreparation {
            table: table.to_string(),
            message: message.into(),
            source,
        }
    }

    /// Create a row insert error.
    pub fn insert(
        table: impl ToString,
        row: u64,
        message: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self::Insert {
            table: table.to_string(),
            row,
            message: message.into(),
            source,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error must stop the replication run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Insert { .. })
    }

    /// Get the error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::Connection { .. } => "CONNECTION_ERROR",
            Error::SchemaIntrospection { .. } => "SCHEMA_INTROSPECTION_ERROR",
            Error::SchemaCheck { .. } => "SCHEMA_CHECK_ERROR",
            Error::SchemaCreation { .. } => "SCHEMA_CREATION_ERROR",
            Error::ColumnOrder { .. } => "COLUMN_ORDER_ERROR",
            Error::SourceQuery { .. } => "SOURCE_QUERY_ERROR",
            Error::ColumnDiscovery { .. } => "COLUMN_DISCOVERY_ERROR",
            Error::RowScan { .. } => "ROW_SCAN_ERROR",
            Error::InsertPreparation { .. } => "INSERT_PREPARATION_ERROR",
            Error::Insert { .. } => "INSERT_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

/// Error context extension trait.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ErrorContext<T>
    for std::result::Result<T, E>
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::config_with_source(message, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::config_with_source(f(), e))
    }
}
