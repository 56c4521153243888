//! SQL Server connections over Tiberius.
//!
//! [`MssqlConnector`] opens one TCP connection per call with keepalives
//! enabled; [`MssqlConnection`] implements the catalog query and both load
//! strategies on top of the TDS bulk load request.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::{debug, info, warn};

use super::encode::{encode_row, ColumnEncoder};
use super::MssqlClient;
use crate::buffer::TabularBuffer;
use crate::catalog;
use crate::config::ConnectionConfig;
use crate::core::schema::{PhysicalColumn, TableName};
use crate::core::traits::{BulkConnection, BulkOptions, Connector};
use crate::error::{BulkError, Result};
use crate::transfer::plan::{self, LoadStrategy};

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_APP_NAME: &str = "mssql-bulk";

/// Opens SQL Server connections from configuration.
#[derive(Debug, Clone)]
pub struct MssqlConnector {
    config: ConnectionConfig,
}

impl MssqlConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.application_name(self.config.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME));
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        match self.config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                config.encryption(EncryptionLevel::NotSupported);
            }
            _ => {
                config.trust_cert();
                config.encryption(EncryptionLevel::Required);
            }
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }

    async fn open_tcp(config: &Config) -> tiberius::Result<TcpStream> {
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();

        let std_tcp = match tcp.into_std() {
            Ok(std_tcp) => std_tcp,
            Err(e) => {
                warn!("Failed to configure TCP keepalives on MSSQL connection: {}", e);
                let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
                    tiberius::error::Error::Io {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                })?;
                tcp.set_nodelay(true).ok();
                return Ok(tcp);
            }
        };

        let socket = socket2::Socket::from(std_tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        let std_tcp: std::net::TcpStream = socket.into();
        std_tcp.set_nonblocking(true).ok();
        TcpStream::from_std(std_tcp).map_err(|e| tiberius::error::Error::Io {
            kind: e.kind(),
            message: format!("Failed to convert socket: {}", e),
        })
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    type Connection = MssqlConnection;

    async fn connect(&self) -> Result<MssqlConnection> {
        let config = self.build_config();
        let tcp = Self::open_tcp(&config).await?;
        let client = Client::connect(config, tcp.compat_write()).await?;
        info!(
            "Connected to MSSQL: {}:{}/{}",
            self.config.host, self.config.port, self.config.database
        );
        Ok(MssqlConnection { client })
    }
}

/// One open SQL Server connection.
pub struct MssqlConnection {
    client: MssqlClient,
}

impl MssqlConnection {
    /// Round-trip a trivial query; returns the latency.
    pub async fn ping(&mut self) -> Result<Duration> {
        let started = Instant::now();
        self.client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(started.elapsed())
    }

    /// Run a statement batch outside of RPC so temp tables stay session scoped.
    async fn batch(&mut self, sql: &str) -> tiberius::Result<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    /// Send the buffer to `target` in `batch_size` chunks.
    ///
    /// Each chunk is encoded before its request opens, so conversion errors
    /// never leave a half-written request behind.
    async fn load(
        &mut self,
        target: &str,
        label: &TableName,
        columns: &[PhysicalColumn],
        buffer: &TabularBuffer,
        batch_size: Option<u32>,
    ) -> Result<u64> {
        let encoders: Vec<ColumnEncoder> = columns.iter().map(ColumnEncoder::new).collect();
        let mut written = 0u64;

        for (batch_no, chunk) in buffer.batches(batch_size).enumerate() {
            let rows = chunk
                .iter()
                .map(|row| encode_row(&encoders, row))
                .collect::<Result<Vec<_>>>()?;

            let mut bulk_load = self
                .client
                .bulk_insert(target)
                .await
                .map_err(|e| BulkError::transfer(label.to_string(), e))?;
            for row in rows {
                bulk_load
                    .send(row)
                    .await
                    .map_err(|e| BulkError::transfer(label.to_string(), e))?;
            }
            bulk_load
                .finalize()
                .await
                .map_err(|e| BulkError::transfer(label.to_string(), e))?;

            written += chunk.len() as u64;
            debug!(
                "{}: batch {} sent {} rows ({} total)",
                label,
                batch_no + 1,
                chunk.len(),
                written
            );
        }

        Ok(written)
    }

    async fn load_staged(
        &mut self,
        table: &TableName,
        columns: &[PhysicalColumn],
        buffer: &TabularBuffer,
        options: &BulkOptions,
    ) -> Result<u64> {
        let staging = plan::staging_table_name();
        self.batch(&plan::create_staging_sql(&staging, columns))
            .await
            .map_err(|e| BulkError::transfer(table.to_string(), e))?;
        debug!("{}: staging rows in {}", table, staging);

        let outcome = self
            .copy_through(&staging, table, columns, buffer, options)
            .await;

        if let Err(e) = self.batch(&plan::drop_staging_sql(&staging)).await {
            warn!("Failed to drop staging table {}: {}", staging, e);
        }
        outcome
    }

    async fn copy_through(
        &mut self,
        staging: &str,
        table: &TableName,
        columns: &[PhysicalColumn],
        buffer: &TabularBuffer,
        options: &BulkOptions,
    ) -> Result<u64> {
        let rows = self
            .load(staging, table, columns, buffer, options.batch_size)
            .await?;

        match plan::insert_select_sql(table, staging, columns, options.keep_identity) {
            Some(sql) => {
                self.batch(&sql)
                    .await
                    .map_err(|e| BulkError::transfer(table.to_string(), e))?;
            }
            None => warn!("{}: no writable columns; nothing copied", table),
        }
        Ok(rows)
    }
}

#[async_trait]
impl BulkConnection for MssqlConnection {
    async fn fetch_columns(&mut self, table: &TableName) -> Result<Vec<PhysicalColumn>> {
        catalog::fetch_columns(&mut self.client, table).await
    }

    async fn write_buffer(
        &mut self,
        table: &TableName,
        columns: &[PhysicalColumn],
        buffer: &TabularBuffer,
        options: &BulkOptions,
    ) -> Result<u64> {
        match LoadStrategy::choose(columns) {
            LoadStrategy::Direct => {
                let target = table.quoted();
                self.load(&target, table, columns, buffer, options.batch_size)
                    .await
            }
            LoadStrategy::Staged => self.load_staged(table, columns, buffer, options).await,
        }
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.batch("BEGIN TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT TRANSACTION").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}
