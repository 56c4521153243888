//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::schema::TableName;
use crate::core::traits::BulkOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination server.
    pub connection: ConnectionConfig,

    /// Bulk transfer options.
    #[serde(default)]
    pub bulk: BulkConfig,

    /// Entity mappings for the tables records can be loaded into.
    #[serde(default)]
    pub tables: Vec<TableMapping>,
}

impl Config {
    /// Look up a table mapping by name, optionally schema-qualified
    /// (`schema.table`). Names compare case-insensitively.
    pub fn table(&self, name: &str) -> Option<&TableMapping> {
        let (schema, table) = match name.split_once('.') {
            Some((s, t)) => (Some(s), t),
            None => (None, name),
        };
        self.tables.iter().find(|m| {
            m.table.eq_ignore_ascii_case(table)
                && match (schema, m.schema.as_deref()) {
                    (Some(wanted), Some(declared)) => wanted.eq_ignore_ascii_case(declared),
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        })
    }
}

/// SQL Server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: "disable" or "require" (default).
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Bulk transfer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Rows per bulk load request (default: whole buffer).
    #[serde(default)]
    pub batch_size: Option<u32>,

    /// Transfer timeout in seconds (default: none).
    #[serde(default)]
    pub bulk_copy_timeout: Option<u64>,

    /// Keep identity values from the input (default: false).
    #[serde(default)]
    pub keep_identity: bool,
}

impl From<&BulkConfig> for BulkOptions {
    fn from(config: &BulkConfig) -> Self {
        BulkOptions {
            batch_size: config.batch_size,
            timeout_secs: config.bulk_copy_timeout,
            keep_identity: config.keep_identity,
        }
    }
}

/// Entity mapping for one destination table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMapping {
    /// Table name.
    pub table: String,

    /// Schema name (default: the login's default schema).
    #[serde(default)]
    pub schema: Option<String>,

    /// Mapped properties, in declaration order.
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
}

impl TableMapping {
    pub fn table_name(&self) -> TableName {
        match &self.schema {
            Some(schema) => TableName::with_schema(schema.clone(), self.table.clone()),
            None => TableName::new(self.table.clone()),
        }
    }
}

/// One mapped property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyMapping {
    /// Destination column name.
    pub column: String,

    /// Input field name (default: the column name).
    #[serde(default)]
    pub field: Option<String>,

    /// Declared property type.
    #[serde(rename = "type")]
    pub property_type: PropertyType,

    /// Whether the property may be absent.
    #[serde(default)]
    pub nullable: bool,

    /// Enumeration names and their integer codes.
    #[serde(default)]
    pub values: BTreeMap<String, i32>,
}

impl PropertyMapping {
    /// Input field the property reads.
    pub fn field_name(&self) -> &str {
        self.field.as_deref().unwrap_or(&self.column)
    }
}

/// Declared property type.
///
/// Accepts both the short names (`i32`) and the SQL Server names (`int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[serde(alias = "bit")]
    Bool,
    #[serde(alias = "tinyint")]
    U8,
    #[serde(alias = "smallint")]
    I16,
    #[serde(alias = "int")]
    I32,
    #[serde(alias = "bigint")]
    I64,
    #[serde(alias = "real")]
    F32,
    #[serde(alias = "float")]
    F64,
    #[serde(alias = "numeric", alias = "money")]
    Decimal,
    #[serde(alias = "text", alias = "nvarchar", alias = "varchar")]
    String,
    #[serde(alias = "binary", alias = "varbinary")]
    Bytes,
    #[serde(alias = "uniqueidentifier")]
    Uuid,
    #[serde(alias = "datetime2")]
    DateTime,
    DateTimeOffset,
    Date,
    Time,
    Enum,
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_require() -> String {
    "require".to_string()
}
