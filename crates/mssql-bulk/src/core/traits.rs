//! Core traits for database-agnostic bulk loading.
//!
//! This module defines the seams the bulk insert pipeline is written against:
//!
//! - [`BulkConnection`]: one open database connection (catalog query and bulk load)
//! - [`Connector`]: opens private connections
//! - [`AmbientSession`]: the caller's unit of work, possibly holding a transaction

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::buffer::TabularBuffer;
use crate::error::{BulkError, Result};

use super::schema::{PhysicalColumn, TableName};

/// Options for one bulk transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOptions {
    /// Rows per bulk load request. The whole buffer is sent at once when unset.
    pub batch_size: Option<u32>,

    /// Upper bound on the write, in seconds.
    pub timeout_secs: Option<u64>,

    /// Write identity values from the buffer instead of letting the server
    /// assign them.
    pub keep_identity: bool,
}

impl BulkOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Reject zero batch size or timeout.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == Some(0) {
            return Err(BulkError::InvalidArgument(
                "batch_size must be greater than 0".into(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(BulkError::InvalidArgument(
                "bulk_copy_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// An open connection able to describe tables and bulk load buffers.
///
/// Implementations must be `Send` to allow use across async tasks.
#[async_trait]
pub trait BulkConnection: Send + Sized {
    /// Ordered physical columns of a user table (by ordinal); empty when the
    /// table does not exist.
    async fn fetch_columns(&mut self, table: &TableName) -> Result<Vec<PhysicalColumn>>;

    /// Write every buffer row into `table`; returns the number of rows written.
    ///
    /// `columns` is the catalog column list the buffer was built from, in the
    /// same order as the buffer columns.
    async fn write_buffer(
        &mut self,
        table: &TableName,
        columns: &[PhysicalColumn],
        buffer: &TabularBuffer,
        options: &BulkOptions,
    ) -> Result<u64>;

    async fn begin_transaction(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(self) -> Result<()>;
}

/// Opens private connections.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: BulkConnection;

    async fn connect(&self) -> Result<Self::Connection>;
}

/// The caller's ambient unit of work.
///
/// A bulk insert joins the current connection only while a transaction is
/// active on it.
pub trait AmbientSession {
    type Connection: BulkConnection;

    fn is_in_transaction(&self) -> bool;

    /// The connection to join; `None` once it has been invalidated.
    fn current_connection(&mut self) -> Option<&mut Self::Connection>;

    /// Mark the current connection unusable.
    ///
    /// Called when a write on it was abandoned mid-request, leaving the
    /// protocol stream in an unknown state.
    fn invalidate(&mut self);
}
