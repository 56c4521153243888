//! Error types for the bulk insert library.

use thiserror::Error;

/// Main error type for bulk insert operations.
#[derive(Error, Debug)]
pub enum BulkError {
    /// A required argument was absent or out of range. Raised before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A physical column type has no entry in the type registry.
    #[error("Unsupported column type '{type_name}' for column {column}")]
    UnsupportedType { column: String, type_name: String },

    /// Reading the physical column list from the catalog failed.
    #[error("Catalog query failed for table {table}: {source}")]
    Catalog {
        table: String,
        #[source]
        source: tiberius::error::Error,
    },

    /// The catalog returned no columns for the destination table.
    #[error("Table {0} not found or has no columns")]
    TableNotFound(String),

    /// Opening or talking to the server outside of a catalog query or transfer.
    #[error("Connection error: {0}")]
    Connection(#[from] tiberius::error::Error),

    /// The session's connection was abandoned mid-request and cannot carry
    /// further statements.
    #[error("Connection is unusable: {0}")]
    ConnectionUnusable(String),

    /// The bulk load protocol failed mid-transfer.
    #[error("Transfer failed for table {table}: {source}")]
    Transfer {
        table: String,
        #[source]
        source: tiberius::error::Error,
    },

    /// The transfer did not complete within the configured timeout.
    #[error("Transfer to {table} timed out after {seconds}s")]
    Timeout { table: String, seconds: u64 },

    /// A buffer value cannot be represented in its physical column.
    #[error("Cannot convert value for column {column}: {message}")]
    Conversion { column: String, message: String },

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An input record could not be decoded against its table mapping.
    #[error("Record {index}: {message}")]
    Record { index: usize, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BulkError {
    /// Create an UnsupportedType error.
    pub fn unsupported_type(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        BulkError::UnsupportedType {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a Transfer error.
    pub fn transfer(table: impl Into<String>, source: tiberius::error::Error) -> Self {
        BulkError::Transfer {
            table: table.into(),
            source,
        }
    }

    /// Create a Conversion error.
    pub fn conversion(column: impl Into<String>, message: impl Into<String>) -> Self {
        BulkError::Conversion {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a Record error.
    pub fn record(index: usize, message: impl Into<String>) -> Self {
        BulkError::Record {
            index,
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            BulkError::Config(_) | BulkError::Yaml(_) | BulkError::Json(_) => 1,
            BulkError::Connection(_) | BulkError::ConnectionUnusable(_) => 2,
            BulkError::Catalog { .. } | BulkError::TableNotFound(_) => 3,
            BulkError::UnsupportedType { .. } => 4,
            BulkError::Transfer { .. } => 5,
            BulkError::Timeout { .. } => 6,
            BulkError::Io(_) => 7,
            BulkError::InvalidArgument(_)
            | BulkError::Record { .. }
            | BulkError::Conversion { .. } => 8,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for bulk insert operations.
pub type Result<T> = std::result::Result<T, BulkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BulkError::Config("x".into()).exit_code(), 1);
        assert_eq!(BulkError::unsupported_type("c", "geography").exit_code(), 4);
        assert_eq!(BulkError::TableNotFound("T".into()).exit_code(), 3);
        assert_eq!(
            BulkError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).exit_code(),
            7
        );
        assert_eq!(BulkError::InvalidArgument("entities".into()).exit_code(), 8);
        assert_eq!(BulkError::ConnectionUnusable("timed out".into()).exit_code(), 2);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = BulkError::Io(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing file"));
    }

    #[test]
    fn test_unsupported_type_message() {
        let err = BulkError::unsupported_type("Shape", "geometry");
        assert_eq!(
            err.to_string(),
            "Unsupported column type 'geometry' for column Shape"
        );
    }
}
