//! Column descriptors and CREATE TABLE synthesis.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Column whose default is always the row creation time.
pub const CREATED_AT: &str = "created_at";
/// Column whose default is the creation time, refreshed on every update.
pub const UPDATED_AT: &str = "updated_at";

/// Quote a MySQL identifier with back-ticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// A MySQL table name, optionally qualified by its schema (database).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName {
    /// Schema (database) name; `None` means the connection's current database
    pub schema: Option<String>,
    /// Table name
    pub name: String,
}

impl TableName {
    /// Create an unqualified table name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Create a schema-qualified table name.
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Render as back-tick quoted identifier(s).
    pub fn as_quoted_identifier(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut parts = s.split('.');
        let table = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => TableName::new(name),
            (Some(schema), Some(name), None) if !schema.is_empty() => {
                TableName::qualified(schema, name)
            }
            _ => {
                return Err(Error::validation(format!(
                    "Invalid table name '{}': expected `table` or `schema.table`",
                    s
                )));
            }
        };

        if table.name.is_empty() {
            return Err(Error::validation("Table name must not be empty"));
        }
        Ok(table)
    }
}

impl TryFrom<String> for TableName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.to_string()
    }
}

/// Role a column plays in the table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    /// Not part of the primary key
    #[default]
    None,
    /// Part of the primary key
    Primary,
}

impl KeyRole {
    /// Parse the catalog's `COLUMN_KEY` / DESCRIBE `Key` value.
    pub fn from_catalog(key: &str) -> Self {
        if key.eq_ignore_ascii_case("PRI") {
            KeyRole::Primary
        } else {
            KeyRole::None
        }
    }
}

/// One source column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// Declared type, e.g. `varchar(50)` or `int unsigned`
    pub declared_type: String,
    /// Is nullable
    pub nullable: bool,
    /// Key role
    pub key_role: KeyRole,
    /// Catalog default, if any
    pub default_value: Option<String>,
    /// Extra attributes such as `auto_increment`
    pub extra: String,
}

impl ColumnDescriptor {
    /// Create a nullable, non-key column with no default.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            key_role: KeyRole::None,
            default_value: None,
            extra: String::new(),
        }
    }

    /// Set nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark as part of the primary key.
    pub fn primary(mut self) -> Self {
        self.key_role = KeyRole::Primary;
        self
    }

    /// Set default value.
    pub fn default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// Set extra attributes.
    pub fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    /// Is this column part of the primary key.
    pub fn is_primary(&self) -> bool {
        self.key_role == KeyRole::Primary
    }

    fn to_ddl(&self, quoting: DefaultQuoting) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.declared_type);

        match self.name.as_str() {
            CREATED_AT => def.push_str(" DEFAULT CURRENT_TIMESTAMP"),
            UPDATED_AT => {
                def.push_str(" DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")
            }
            _ => {
                if self.nullable {
                    def.push_str(" NULL");
                } else {
                    def.push_str(" NOT NULL");
                }

                if let Some(ref default) = self.default_value {
                    def.push_str(&format!(" DEFAULT {}", quoting.literal(default)));
                }

                if !self.extra.is_empty() {
                    def.push(' ');
                    def.push_str(&self.extra);
                }
            }
        }

        def
    }
}

/// How catalog default values are embedded in the synthesized DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultQuoting {
    /// Wrap the value in single quotes as-is. A default containing a quote
    /// character produces invalid SQL.
    #[default]
    Verbatim,
    /// Wrap in single quotes, doubling embedded quotes and backslashes.
    Escaped,
}

impl DefaultQuoting {
    /// Render a default value as a SQL string literal.
    pub fn literal(self, value: &str) -> String {
        match self {
            DefaultQuoting::Verbatim => format!("'{}'", value),
            DefaultQuoting::Escaped => {
                format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
            }
        }
    }
}

/// Column-definition clause list for a CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    /// Rendered column definitions, in source order
    pub columns: Vec<String>,
    /// Quoted primary key columns, in first-occurrence order
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    /// Synthesize a definition from catalog descriptors.
    pub fn synthesize(descriptors: &[ColumnDescriptor], quoting: DefaultQuoting) -> Self {
        let columns = descriptors.iter().map(|c| c.to_ddl(quoting)).collect();
        let primary_key = descriptors
            .iter()
            .filter(|c| c.is_primary())
            .map(|c| quote_ident(&c.name))
            .collect();

        Self {
            columns,
            primary_key,
        }
    }

    /// The clause list that goes between the parentheses of CREATE TABLE.
    pub fn to_sql(&self) -> String {
        let mut def = self.columns.join(", ");
        if !self.primary_key.is_empty() {
            def.push_str(&format!(", PRIMARY KEY ({})", self.primary_key.join(", ")));
        }
        def
    }

    /// Full CREATE TABLE statement for the given table.
    pub fn create_table_sql(&self, table: &TableName) -> String {
        format!("CREATE TABLE {} ({})", table.as_quoted_identifier(), self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", "int")
                .nullable(false)
                .primary()
                .extra("auto_increment"),
            ColumnDescriptor::new("name", "varchar(50)").nullable(false),
            ColumnDescriptor::new("created_at", "timestamp"),
            ColumnDescriptor::new("updated_at", "timestamp"),
        ]
    }

    #[test]
    fn test_users_create_table() {
        let def = TableDefinition::synthesize(&users(), DefaultQuoting::Verbatim);
        assert_eq!(
            def.create_table_sql(&TableName::new("users_copy")),
            "CREATE TABLE `users_copy` (`id` int NOT NULL auto_increment, \
             `name` varchar(50) NOT NULL, \
             `created_at` timestamp DEFAULT CURRENT_TIMESTAMP, \
             `updated_at` timestamp DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP, \
             PRIMARY KEY (`id`))"
        );
    }

    #[test]
    fn test_no_primary_key_no_clause() {
        let cols = vec![
            ColumnDescriptor::new("a", "int"),
            ColumnDescriptor::new("b", "text"),
        ];
        let def = TableDefinition::synthesize(&cols, DefaultQuoting::Verbatim);
        assert!(def.primary_key.is_empty());
        assert_eq!(def.to_sql(), "`a` int NULL, `b` text NULL");
    }

    #[test]
    fn test_composite_key_first_occurrence_order() {
        let cols = vec![
            ColumnDescriptor::new("tenant", "int").nullable(false).primary(),
            ColumnDescriptor::new("payload", "json"),
            ColumnDescriptor::new("seq", "bigint").nullable(false).primary(),
        ];
        let def = TableDefinition::synthesize(&cols, DefaultQuoting::Verbatim);
        assert!(def.to_sql().ends_with(", PRIMARY KEY (`tenant`, `seq`)"));
    }

    #[test]
    fn test_timestamp_columns_ignore_catalog_attributes() {
        let cols = vec![
            ColumnDescriptor::new("created_at", "datetime")
                .nullable(false)
                .default("2020-01-01 00:00:00")
                .extra("DEFAULT_GENERATED")
                .primary(),
            ColumnDescriptor::new("updated_at", "datetime").nullable(false),
        ];
        let def = TableDefinition::synthesize(&cols, DefaultQuoting::Verbatim);
        assert_eq!(def.columns[0], "`created_at` datetime DEFAULT CURRENT_TIMESTAMP");
        assert_eq!(
            def.columns[1],
            "`updated_at` datetime DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP"
        );
        // Special-casing does not affect key eligibility.
        assert_eq!(def.primary_key, vec!["`created_at`"]);
    }

    #[test]
    fn test_default_and_extra() {
        let col = ColumnDescriptor::new("status", "varchar(10)")
            .nullable(false)
            .default("active")
            .extra("COMMENT 'x'");
        let def = TableDefinition::synthesize(&[col], DefaultQuoting::Verbatim);
        assert_eq!(
            def.columns[0],
            "`status` varchar(10) NOT NULL DEFAULT 'active' COMMENT 'x'"
        );
    }

    #[test]
    fn test_default_quoting_policies() {
        assert_eq!(DefaultQuoting::Verbatim.literal("it's"), "'it's'");
        assert_eq!(DefaultQuoting::Escaped.literal("it's"), "'it''s'");
        assert_eq!(DefaultQuoting::Escaped.literal(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_quote_ident_escapes_backticks() {
        assert_eq!(quote_ident("name"), "`name`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_table_name_parsing() {
        let t: TableName = "users".parse().unwrap();
        assert_eq!(t, TableName::new("users"));
        assert_eq!(t.as_quoted_identifier(), "`users`");

        let t: TableName = "shop.orders".parse().unwrap();
        assert_eq!(t, TableName::qualified("shop", "orders"));
        assert_eq!(t.as_quoted_identifier(), "`shop`.`orders`");
        assert_eq!(t.to_string(), "shop.orders");

        assert!("".parse::<TableName>().is_err());
        assert!("a.b.c".parse::<TableName>().is_err());
        assert!(".orders".parse::<TableName>().is_err());
    }

    #[test]
    fn test_key_role_from_catalog() {
        assert_eq!(KeyRole::from_catalog("PRI"), KeyRole::Primary);
        assert_eq!(KeyRole::from_catalog("UNI"), KeyRole::None);
        assert_eq!(KeyRole::from_catalog("MUL"), KeyRole::None);
        assert_eq!(KeyRole::from_catalog(""), KeyRole::None);
    }
}
