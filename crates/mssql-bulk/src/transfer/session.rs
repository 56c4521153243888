//! A concrete ambient session with explicit transaction control.

use tracing::{debug, warn};

use crate::core::traits::{AmbientSession, BulkConnection, Connector};
use crate::error::{BulkError, Result};

/// Holds at most one open connection and tracks whether a transaction is
/// active on it.
///
/// A connection abandoned mid-request (a timed-out write) is marked unusable:
/// commit, rollback and further joins are refused, and `close` drops it
/// without sending anything.
pub struct Session<C> {
    connection: Option<C>,
    in_transaction: bool,
    unusable: bool,
}

impl<C> Default for Session<C> {
    fn default() -> Self {
        Self {
            connection: None,
            in_transaction: false,
            unusable: false,
        }
    }
}

impl<C: BulkConnection> Session<C> {
    /// A session with no connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session around an already open connection, no transaction.
    pub fn with_connection(connection: C) -> Self {
        Self {
            connection: Some(connection),
            in_transaction: false,
            unusable: false,
        }
    }

    /// Begin a transaction, opening a connection first if the session has none.
    pub async fn begin<K>(&mut self, connector: &K) -> Result<()>
    where
        K: Connector<Connection = C>,
    {
        if self.unusable {
            return Err(unusable());
        }
        if self.in_transaction {
            return Err(BulkError::InvalidArgument(
                "a transaction is already active".into(),
            ));
        }
        let conn = match self.connection.take() {
            Some(conn) => conn,
            None => connector.connect().await?,
        };
        let conn = self.connection.insert(conn);
        conn.begin_transaction().await?;
        self.in_transaction = true;
        debug!("Transaction started");
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        let conn = self.active()?;
        conn.commit().await?;
        self.in_transaction = false;
        debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        let conn = self.active()?;
        conn.rollback().await?;
        self.in_transaction = false;
        debug!("Transaction rolled back");
        Ok(())
    }

    /// Close the session's connection, rolling back an open transaction.
    ///
    /// An unusable connection is dropped instead; the server rolls back its
    /// open transaction when the socket goes away.
    pub async fn close(mut self) -> Result<()> {
        if self.unusable {
            if self.connection.take().is_some() {
                warn!("Discarding connection left mid-request");
            }
            return Ok(());
        }
        if self.in_transaction {
            if let Err(e) = self.rollback().await {
                warn!("Rollback on close failed: {}", e);
            }
        }
        match self.connection.take() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }

    /// The session's connection, unless it has been marked unusable.
    pub fn connection_mut(&mut self) -> Option<&mut C> {
        self.current_connection()
    }

    /// True once a write on the session's connection was abandoned.
    pub fn is_unusable(&self) -> bool {
        self.unusable
    }

    fn active(&mut self) -> Result<&mut C> {
        if self.unusable {
            return Err(unusable());
        }
        match self.connection.as_mut() {
            Some(conn) if self.in_transaction => Ok(conn),
            _ => Err(BulkError::InvalidArgument("no active transaction".into())),
        }
    }
}

impl<C: BulkConnection> AmbientSession for Session<C> {
    type Connection = C;

    fn is_in_transaction(&self) -> bool {
        self.in_transaction && self.connection.is_some()
    }

    fn current_connection(&mut self) -> Option<&mut C> {
        if self.unusable {
            return None;
        }
        self.connection.as_mut()
    }

    fn invalidate(&mut self) {
        if !self.unusable {
            warn!("Session connection marked unusable after an interrupted write");
        }
        self.unusable = true;
    }
}

fn unusable() -> BulkError {
    BulkError::ConnectionUnusable(
        "a write was interrupted mid-request; close the session".into(),
    )
}
