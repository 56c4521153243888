//! Physical table metadata as reported by the database catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// Schema name, if the entity mapping declares one.
    pub schema: Option<String>,

    /// Table name.
    pub name: String,
}

impl TableName {
    /// A table without an explicit schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// A schema-qualified table.
    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        let schema = schema.into();
        Self {
            schema: if schema.is_empty() { None } else { Some(schema) },
            name: name.into(),
        }
    }

    /// Bracket-quoted identifier used by every generated statement and by the
    /// bulk load request itself.
    pub fn quoted(&self) -> String {
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
            None => f.write_str(&self.name),
        }
    }
}

/// Quote an MSSQL identifier with brackets.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// A column as it exists in the table's current schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalColumn {
    /// Column name.
    pub name: String,

    /// Ordinal position (column id), 1-based.
    pub ordinal: i32,

    /// Whether the column accepts NULL.
    pub is_nullable: bool,

    /// Declared type name as reported by the catalog (e.g. "nvarchar", "sysname").
    pub type_name: String,

    /// Identity (auto-generated key) column.
    #[serde(default)]
    pub is_identity: bool,

    /// Computed column; never written.
    #[serde(default)]
    pub is_computed: bool,

    /// Column has a default constraint.
    #[serde(default)]
    pub has_default: bool,

    /// Base-type definition with length/precision, e.g. "nvarchar(50)".
    #[serde(default)]
    pub definition: String,
}

impl PhysicalColumn {
    /// Create a plain column with no identity, computed or default traits.
    pub fn new(
        name: impl Into<String>,
        ordinal: i32,
        is_nullable: bool,
        type_name: impl Into<String>,
    ) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            ordinal,
            is_nullable,
            definition: type_name.clone(),
            type_name,
            is_identity: false,
            is_computed: false,
            has_default: false,
        }
    }

    /// Mark the column as an identity column.
    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    /// Mark the column as computed.
    pub fn computed(mut self) -> Self {
        self.is_computed = true;
        self
    }

    /// Mark the column as having a default constraint.
    pub fn defaulted(mut self) -> Self {
        self.has_default = true;
        self
    }

    /// Set the column definition used for staging tables.
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = definition.into();
        self
    }

    /// Row version columns are generated by the server on every write.
    pub fn is_rowversion(&self) -> bool {
        self.type_name.eq_ignore_ascii_case("timestamp")
            || self.type_name.eq_ignore_ascii_case("rowversion")
    }

    /// Whether an INSERT may name this column.
    ///
    /// Identity columns are writable only when the caller keeps identity values.
    pub fn is_writable(&self, keep_identity: bool) -> bool {
        if self.is_computed || self.is_rowversion() {
            return false;
        }
        !self.is_identity || keep_identity
    }
}
