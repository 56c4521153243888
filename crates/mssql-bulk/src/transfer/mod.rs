//! Bulk insert pipeline.
//!
//! One call runs, in order:
//! 1. acquire a connection (join the ambient transaction or open a private one)
//! 2. fetch the table's physical columns from the catalog
//! 3. resolve column mappings against the entity's property descriptors
//! 4. materialize the entities into a tabular buffer
//! 5. bulk load the buffer, bounded by the configured timeout
//! 6. close the private connection, if one was opened
//!
//! Steps 2 and 5 are the only I/O; nothing runs concurrently.

pub mod plan;
pub mod session;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::buffer::{self, TabularBuffer};
use crate::core::entity::{Entity, EntityMapping};
use crate::core::schema::{PhysicalColumn, TableName};
use crate::core::traits::{AmbientSession, BulkConnection, BulkOptions, Connector};
use crate::error::{BulkError, Result};
use crate::mapping::{self, ColumnPlan};

pub use plan::LoadStrategy;
pub use session::Session;

/// Outcome of one bulk insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkInsertResult {
    pub table: String,
    pub rows_written: u64,
    /// Buffer columns, in catalog order.
    pub columns: Vec<String>,
    /// Columns filled with a fallback value because no property maps them.
    pub defaulted_columns: Vec<String>,
    pub strategy: LoadStrategy,
}

/// Resolved view of a table, without writing anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePlan {
    pub table: String,
    pub strategy: LoadStrategy,
    pub columns: Vec<ColumnPlan>,
}

/// Connection used for one call.
enum Lease<'s, C> {
    /// The ambient session's connection; never closed here.
    Ambient(&'s mut C),
    /// Opened for this call; closed on every exit path.
    Owned(C),
}

impl<C: BulkConnection> Lease<'_, C> {
    fn connection(&mut self) -> &mut C {
        match self {
            Lease::Ambient(conn) => conn,
            Lease::Owned(conn) => conn,
        }
    }

    /// Release the connection and settle the call's outcome.
    ///
    /// A pipeline error wins over a close error; the latter is only logged.
    async fn release<T>(self, outcome: Result<T>) -> Result<T> {
        let conn = match self {
            Lease::Ambient(_) => return outcome,
            Lease::Owned(conn) => conn,
        };

        let closed = conn.close().await;
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close connection after error: {}", close_err);
                Err(e)
            }
        }
    }
}

/// Schema-reconciling bulk inserter.
pub struct BulkInserter<K> {
    connector: K,
    options: BulkOptions,
}

impl<K: Connector> BulkInserter<K> {
    pub fn new(connector: K, options: BulkOptions) -> Self {
        Self { connector, options }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Bulk insert `entities` into the mapping's table.
    ///
    /// `None` is rejected with [`BulkError::InvalidArgument`] before any I/O.
    /// Every physical column gets a buffer slot: mapped columns read the
    /// entity, unmapped ones get NULL when nullable and the type's zero value
    /// otherwise.
    ///
    /// A timed-out write abandons the request mid-stream, so a joined ambient
    /// connection is invalidated on the session before the timeout is returned.
    pub async fn bulk_insert<S, E>(
        &self,
        session: &mut S,
        mapping: &EntityMapping<E>,
        entities: Option<&[E]>,
    ) -> Result<BulkInsertResult>
    where
        S: AmbientSession<Connection = K::Connection>,
    {
        let entities = entities
            .ok_or_else(|| BulkError::InvalidArgument("entities must not be null".into()))?;
        self.options.validate()?;

        let mut lease = self.acquire(session).await?;
        let ambient = matches!(lease, Lease::Ambient(_));
        let outcome = self.run(lease.connection(), mapping, entities).await;
        let outcome = lease.release(outcome).await;

        if ambient && matches!(outcome, Err(BulkError::Timeout { .. })) {
            session.invalidate();
        }
        outcome
    }

    /// [`bulk_insert`](Self::bulk_insert) for a statically mapped entity type.
    pub async fn bulk_insert_entities<S, E>(
        &self,
        session: &mut S,
        entities: Option<&[E]>,
    ) -> Result<BulkInsertResult>
    where
        S: AmbientSession<Connection = K::Connection>,
        E: Entity,
    {
        let mapping = E::mapping();
        self.bulk_insert(session, &mapping, entities).await
    }

    /// Resolve a table's column plan on a private connection.
    pub async fn plan<E>(&self, mapping: &EntityMapping<E>) -> Result<TablePlan> {
        let mut lease: Lease<'_, K::Connection> = Lease::Owned(self.connector.connect().await?);
        let outcome: Result<TablePlan> = async {
            let columns = self.fetch_columns(lease.connection(), &mapping.table).await?;
            let mappings = mapping::resolve(&columns, &mapping.properties)?;
            Ok(TablePlan {
                table: mapping.table.to_string(),
                strategy: LoadStrategy::choose(&columns),
                columns: mappings.iter().map(ColumnPlan::from).collect(),
            })
        }
        .await;
        lease.release(outcome).await
    }

    async fn acquire<'s, S>(&self, session: &'s mut S) -> Result<Lease<'s, K::Connection>>
    where
        S: AmbientSession<Connection = K::Connection>,
        K::Connection: 's,
    {
        if session.is_in_transaction() {
            return match session.current_connection() {
                Some(conn) => {
                    debug!("Joining ambient transaction");
                    Ok(Lease::Ambient(conn))
                }
                None => Err(BulkError::ConnectionUnusable(
                    "the ambient transaction's connection was invalidated".into(),
                )),
            };
        }
        let conn = self.connector.connect().await?;
        Ok(Lease::Owned(conn))
    }

    async fn fetch_columns(
        &self,
        conn: &mut K::Connection,
        table: &TableName,
    ) -> Result<Vec<PhysicalColumn>> {
        let columns = conn.fetch_columns(table).await?;
        if columns.is_empty() {
            return Err(BulkError::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }

    async fn run<E>(
        &self,
        conn: &mut K::Connection,
        mapping: &EntityMapping<E>,
        entities: &[E],
    ) -> Result<BulkInsertResult> {
        let table = &mapping.table;
        let columns = self.fetch_columns(conn, table).await?;
        let mappings = mapping::resolve(&columns, &mapping.properties)?;

        let defaulted_columns: Vec<String> = mappings
            .iter()
            .filter(|m| !m.is_bound())
            .map(|m| m.column.name.clone())
            .collect();
        if !defaulted_columns.is_empty() {
            debug!(
                "{}: {} unmapped columns filled with defaults: {}",
                table,
                defaulted_columns.len(),
                defaulted_columns.join(", ")
            );
        }

        let buffer = buffer::build(&mappings, entities);
        let strategy = LoadStrategy::choose(&columns);

        let rows_written = if buffer.is_empty() {
            debug!("{}: no rows to write", table);
            0
        } else {
            self.write(conn, table, &columns, &buffer).await?
        };

        info!(
            "{}: wrote {} rows ({} strategy)",
            table, rows_written, strategy
        );

        Ok(BulkInsertResult {
            table: table.to_string(),
            rows_written,
            columns: buffer.columns.iter().map(|c| c.name.clone()).collect(),
            defaulted_columns,
            strategy,
        })
    }

    async fn write(
        &self,
        conn: &mut K::Connection,
        table: &TableName,
        columns: &[PhysicalColumn],
        buffer: &TabularBuffer,
    ) -> Result<u64> {
        let write = conn.write_buffer(table, columns, buffer, &self.options);
        match self.options.timeout() {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| BulkError::Timeout {
                    table: table.to_string(),
                    seconds: limit.as_secs(),
                })?,
            None => write.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{HostType, PropertyDescriptor};
    use crate::core::value::{HostValue, SqlType, SqlValue};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records what the pipeline does to its connections.
    #[derive(Default)]
    struct Probe {
        connects: AtomicUsize,
        catalog_calls: AtomicUsize,
        closes: AtomicUsize,
        fail_catalog: AtomicBool,
        fail_write: AtomicBool,
        writes: Mutex<Vec<RecordedWrite>>,
    }

    struct RecordedWrite {
        connection_id: usize,
        table: String,
        rows: Vec<Vec<SqlValue<'static>>>,
        columns: Vec<String>,
    }

    struct MockConnector {
        probe: Arc<Probe>,
        columns: Vec<PhysicalColumn>,
        write_delay: Option<Duration>,
    }

    impl MockConnector {
        fn new(columns: Vec<PhysicalColumn>) -> Self {
            Self {
                probe: Arc::new(Probe::default()),
                columns,
                write_delay: None,
            }
        }
    }

    struct MockConnection {
        id: usize,
        probe: Arc<Probe>,
        columns: Vec<PhysicalColumn>,
        write_delay: Option<Duration>,
        in_transaction: bool,
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Connection = MockConnection;

        async fn connect(&self) -> Result<MockConnection> {
            let id = self.probe.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(MockConnection {
                id,
                probe: Arc::clone(&self.probe),
                columns: self.columns.clone(),
                write_delay: self.write_delay,
                in_transaction: false,
            })
        }
    }

    #[async_trait]
    impl BulkConnection for MockConnection {
        async fn fetch_columns(&mut self, table: &TableName) -> Result<Vec<PhysicalColumn>> {
            self.probe.catalog_calls.fetch_add(1, Ordering::SeqCst);
            if self.probe.fail_catalog.load(Ordering::SeqCst) {
                return Err(BulkError::Catalog {
                    table: table.to_string(),
                    source: tiberius::error::Error::Protocol("permission denied".into()),
                });
            }
            Ok(self.columns.clone())
        }

        async fn write_buffer(
            &mut self,
            table: &TableName,
            _columns: &[PhysicalColumn],
            buffer: &TabularBuffer,
            _options: &BulkOptions,
        ) -> Result<u64> {
            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }
            if self.probe.fail_write.load(Ordering::SeqCst) {
                return Err(BulkError::transfer(
                    table.to_string(),
                    tiberius::error::Error::Protocol("constraint violation".into()),
                ));
            }
            self.probe.writes.lock().unwrap().push(RecordedWrite {
                connection_id: self.id,
                table: table.quoted(),
                rows: buffer.rows.clone(),
                columns: buffer.columns.iter().map(|c| c.name.clone()).collect(),
            });
            Ok(buffer.row_count() as u64)
        }

        async fn begin_transaction(&mut self) -> Result<()> {
            self.in_transaction = true;
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            self.in_transaction = false;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            self.in_transaction = false;
            Ok(())
        }

        async fn close(self) -> Result<()> {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    enum Kind {
        Basic = 1,
        Premium = 2,
    }

    struct Person {
        id: i32,
        name: Option<String>,
        kind: Kind,
    }

    fn table_columns() -> Vec<PhysicalColumn> {
        vec![
            PhysicalColumn::new("Id", 1, false, "int"),
            PhysicalColumn::new("Name", 2, true, "nvarchar"),
            PhysicalColumn::new("Flag", 3, false, "bit"),
        ]
    }

    fn person_mapping() -> EntityMapping<Person> {
        EntityMapping::new(TableName::new("T"))
            .property(PropertyDescriptor::new(
                "Id",
                HostType::Scalar(SqlType::I32),
                |p: &Person| HostValue::Value(SqlValue::I32(p.id)),
            ))
            .property(PropertyDescriptor::new(
                "Name",
                HostType::Nullable(SqlType::String),
                |p: &Person| HostValue::Nullable(p.name.clone().map(SqlValue::text_owned)),
            ))
    }

    fn people() -> Vec<Person> {
        vec![
            Person { id: 1, name: Some("a".to_string()), kind: Kind::Basic },
            Person { id: 2, name: None, kind: Kind::Premium },
        ]
    }

    #[tokio::test]
    async fn test_bulk_insert_reconciles_schema() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());
        let mut session = Session::new();

        let result = inserter
            .bulk_insert(&mut session, &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap();

        assert_eq!(result.rows_written, 2);
        assert_eq!(result.columns, vec!["Id", "Name", "Flag"]);
        assert_eq!(result.defaulted_columns, vec!["Flag"]);
        assert_eq!(result.strategy, LoadStrategy::Direct);

        let writes = probe.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].table, "[T]");
        assert_eq!(writes[0].columns, vec!["Id", "Name", "Flag"]);
        assert_eq!(
            writes[0].rows,
            vec![
                vec![
                    SqlValue::I32(1),
                    SqlValue::text_owned("a".to_string()),
                    SqlValue::Bool(false)
                ],
                vec![
                    SqlValue::I32(2),
                    SqlValue::Null(SqlType::String),
                    SqlValue::Bool(false)
                ],
            ]
        );
        assert_eq!(probe.catalog_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enum_written_as_code() {
        let connector = MockConnector::new(vec![
            PhysicalColumn::new("Id", 1, false, "int"),
            PhysicalColumn::new("Kind", 2, false, "int"),
        ]);
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());
        let mapping = EntityMapping::new(TableName::with_schema("dbo", "People"))
            .property(PropertyDescriptor::new("Kind", HostType::Enum, |p: &Person| {
                HostValue::Enum(p.kind as i32)
            }))
            .property(PropertyDescriptor::new(
                "Id",
                HostType::Scalar(SqlType::I32),
                |p: &Person| HostValue::Value(SqlValue::I32(p.id)),
            ));

        inserter
            .bulk_insert(&mut Session::new(), &mapping, Some(people().as_slice()))
            .await
            .unwrap();

        let writes = probe.writes.lock().unwrap();
        assert_eq!(writes[0].table, "[dbo].[People]");
        assert_eq!(writes[0].rows[0], vec![SqlValue::I32(1), SqlValue::I32(1)]);
        assert_eq!(writes[0].rows[1], vec![SqlValue::I32(2), SqlValue::I32(2)]);
    }

    #[tokio::test]
    async fn test_absent_entities_fail_before_io() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let err = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::InvalidArgument(_)));
        assert_eq!(probe.connects.load(Ordering::SeqCst), 0);
        assert_eq!(probe.catalog_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_private_connection_closed_on_success() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap();

        assert_eq!(probe.connects.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_private_connection_closed_on_transfer_failure() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        probe.fail_write.store(true, Ordering::SeqCst);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let err = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::Transfer { .. }));
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ambient_transaction_is_joined_and_left_open() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let mut session = Session::new();
        session.begin(inserter.connector()).await.unwrap();
        let ambient_id = session.connection_mut().unwrap().id;

        inserter
            .bulk_insert(&mut session, &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap();

        assert_eq!(probe.connects.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 0);
        assert_eq!(probe.writes.lock().unwrap()[0].connection_id, ambient_id);
        assert!(session.is_in_transaction());
        assert!(session.connection_mut().unwrap().in_transaction);

        session.commit().await.unwrap();
        assert!(!session.is_in_transaction());
        session.close().await.unwrap();
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ambient_connection_kept_after_transfer_failure() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let mut session = Session::new();
        session.begin(inserter.connector()).await.unwrap();
        probe.fail_write.store(true, Ordering::SeqCst);

        let err = inserter
            .bulk_insert(&mut session, &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::Transfer { .. }));
        assert_eq!(probe.closes.load(Ordering::SeqCst), 0);
        assert!(session.connection_mut().is_some());
        assert!(!session.is_unusable());
        session.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_session_connection_is_not_reused() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let idle = connector.connect().await.unwrap();
        let idle_id = idle.id;
        let inserter = BulkInserter::new(connector, BulkOptions::default());
        let mut session = Session::with_connection(idle);

        inserter
            .bulk_insert(&mut session, &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap();

        assert_ne!(probe.writes.lock().unwrap()[0].connection_id, idle_id);
        assert_eq!(probe.connects.load(Ordering::SeqCst), 2);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
        assert!(session.connection_mut().is_some());
    }

    #[tokio::test]
    async fn test_unsupported_type_aborts_before_write() {
        let mut columns = table_columns();
        columns.push(PhysicalColumn::new("Shape", 4, true, "geography"));
        let connector = MockConnector::new(columns);
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let err = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::UnsupportedType { .. }));
        assert!(probe.writes.lock().unwrap().is_empty());
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_table_reported() {
        let connector = MockConnector::new(Vec::new());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let err = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::TableNotFound(ref t) if t == "T"));
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_collection_writes_nothing() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let result = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(&[] as &[Person]))
            .await
            .unwrap();

        assert_eq!(result.rows_written, 0);
        assert!(probe.writes.lock().unwrap().is_empty());
        assert_eq!(probe.catalog_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_timeout() {
        let mut connector = MockConnector::new(table_columns());
        connector.write_delay = Some(Duration::from_secs(30));
        let probe = Arc::clone(&connector.probe);
        let options = BulkOptions {
            timeout_secs: Some(1),
            ..Default::default()
        };
        let inserter = BulkInserter::new(connector, options);

        let err = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::Timeout { seconds: 1, .. }));
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ambient_write_timeout_invalidates_session() {
        let mut connector = MockConnector::new(table_columns());
        connector.write_delay = Some(Duration::from_secs(30));
        let probe = Arc::clone(&connector.probe);
        let options = BulkOptions {
            timeout_secs: Some(1),
            ..Default::default()
        };
        let inserter = BulkInserter::new(connector, options);

        let mut session = Session::new();
        session.begin(inserter.connector()).await.unwrap();

        let err = inserter
            .bulk_insert(&mut session, &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::Timeout { seconds: 1, .. }));
        assert!(session.is_unusable());
        assert!(session.connection_mut().is_none());
        assert_eq!(probe.closes.load(Ordering::SeqCst), 0);

        // No private connection is opened behind the broken transaction.
        let err = inserter
            .bulk_insert(&mut session, &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::ConnectionUnusable(_)));
        assert_eq!(probe.connects.load(Ordering::SeqCst), 1);

        assert!(matches!(
            session.commit().await,
            Err(BulkError::ConnectionUnusable(_))
        ));
        assert!(matches!(
            session.rollback().await,
            Err(BulkError::ConnectionUnusable(_))
        ));

        session.close().await.unwrap();
        assert_eq!(probe.closes.load(Ordering::SeqCst), 0);
        assert!(probe.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_failure_propagated_on_private_connection() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        probe.fail_catalog.store(true, Ordering::SeqCst);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let err = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        match err {
            BulkError::Catalog { table, source } => {
                assert_eq!(table, "T");
                assert!(source.to_string().contains("permission denied"));
            }
            other => panic!("expected Catalog, got {:?}", other),
        }
        assert!(probe.writes.lock().unwrap().is_empty());
        assert_eq!(probe.connects.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_catalog_failure_leaves_ambient_connection_open() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let mut session = Session::new();
        session.begin(inserter.connector()).await.unwrap();
        probe.fail_catalog.store(true, Ordering::SeqCst);

        let err = inserter
            .bulk_insert(&mut session, &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::Catalog { .. }));
        assert!(probe.writes.lock().unwrap().is_empty());
        assert_eq!(probe.closes.load(Ordering::SeqCst), 0);
        assert!(session.is_in_transaction());
        assert!(!session.is_unusable());
        session.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_io() {
        let connector = MockConnector::new(table_columns());
        let probe = Arc::clone(&connector.probe);
        let options = BulkOptions {
            batch_size: Some(0),
            ..Default::default()
        };
        let inserter = BulkInserter::new(connector, options);

        let err = inserter
            .bulk_insert(&mut Session::new(), &person_mapping(), Some(people().as_slice()))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::InvalidArgument(_)));
        assert_eq!(probe.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plan_reports_bindings() {
        let mut columns = table_columns();
        columns[0] = PhysicalColumn::new("Id", 1, false, "int").identity();
        let connector = MockConnector::new(columns);
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let plan = inserter.plan(&person_mapping()).await.unwrap();

        assert_eq!(plan.strategy, LoadStrategy::Staged);
        let bound: Vec<bool> = plan.columns.iter().map(|c| c.bound).collect();
        assert_eq!(bound, vec![true, true, false]);
        assert!(plan.columns[0].is_identity);
        assert!(probe.writes.lock().unwrap().is_empty());
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    struct Tag {
        id: i32,
    }

    impl Entity for Tag {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::new(TableName::new("Tags")).property(PropertyDescriptor::new(
                "Id",
                HostType::Scalar(SqlType::I32),
                |t: &Tag| HostValue::Value(SqlValue::I32(t.id)),
            ))
        }
    }

    #[tokio::test]
    async fn test_bulk_insert_static_entity() {
        let connector = MockConnector::new(vec![PhysicalColumn::new("Id", 1, false, "int")]);
        let probe = Arc::clone(&connector.probe);
        let inserter = BulkInserter::new(connector, BulkOptions::default());

        let tags = vec![Tag { id: 7 }];
        let result = inserter
            .bulk_insert_entities(&mut Session::new(), Some(tags.as_slice()))
            .await
            .unwrap();

        assert_eq!(result.table, "Tags");
        assert_eq!(probe.writes.lock().unwrap()[0].rows, vec![vec![SqlValue::I32(7)]]);
    }
}
