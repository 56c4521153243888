//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server driver (Tiberius)
//!
//! Each driver implements [`Connector`](crate::core::Connector) and
//! [`BulkConnection`](crate::core::BulkConnection).

pub mod mssql;

pub use mssql::{MssqlClient, MssqlConnection, MssqlConnector};
