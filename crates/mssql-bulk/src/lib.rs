//! # mssql-bulk
//!
//! Schema-reconciling bulk insert of typed entities into SQL Server.
//!
//! The library reads the destination table's physical columns from the
//! catalog, lines them up with the properties an entity mapping declares, and
//! streams the result through the TDS bulk load protocol:
//!
//! - **Schema reconciliation**: every physical column gets a value; unmapped
//!   columns are filled with NULL or their type's zero value
//! - **Type registry** covering the SQL Server scalar types
//! - **Ambient transactions**: joins a session's open transaction, otherwise
//!   opens and closes a private connection
//! - **Staged loads** for identity, computed and defaulted columns
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_bulk::{
//!     BulkInserter, Config, EntityMapping, HostType, HostValue, MssqlConnection,
//!     MssqlConnector, PropertyDescriptor, Session, SqlType, SqlValue, TableName,
//! };
//!
//! struct User {
//!     id: i32,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> mssql_bulk::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let connector = MssqlConnector::new(config.connection.clone());
//!     let inserter = BulkInserter::new(connector, (&config.bulk).into());
//!
//!     let mapping = EntityMapping::new(TableName::with_schema("dbo", "Users"))
//!         .property(PropertyDescriptor::new(
//!             "Id",
//!             HostType::Scalar(SqlType::I32),
//!             |u: &User| HostValue::Value(SqlValue::I32(u.id)),
//!         ))
//!         .property(PropertyDescriptor::new(
//!             "Name",
//!             HostType::Scalar(SqlType::String),
//!             |u: &User| HostValue::Value(SqlValue::text_owned(u.name.clone())),
//!         ));
//!
//!     let users = vec![User { id: 1, name: "ann".into() }];
//!     let mut session: Session<MssqlConnection> = Session::new();
//!     let result = inserter
//!         .bulk_insert(&mut session, &mapping, Some(users.as_slice()))
//!         .await?;
//!     println!("Wrote {} rows", result.rows_written);
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod catalog;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod mapping;
pub mod records;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use buffer::{BufferColumn, TabularBuffer};
pub use config::{BulkConfig, Config, ConnectionConfig, PropertyMapping, PropertyType, TableMapping};
pub use crate::core::{
    AmbientSession, BulkConnection, BulkOptions, Connector, Entity, EntityMapping, HostType,
    HostValue, PhysicalColumn, PropertyDescriptor, SqlType, SqlValue, TableName,
};
pub use drivers::{MssqlConnection, MssqlConnector};
pub use error::{BulkError, Result};
pub use mapping::{ColumnMapping, ColumnPlan};
pub use records::Record;
pub use transfer::{BulkInsertResult, BulkInserter, LoadStrategy, Session, TablePlan};
