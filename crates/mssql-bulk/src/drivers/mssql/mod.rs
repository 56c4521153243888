//! Microsoft SQL Server driver.
//!
//! - [`MssqlConnector`] / [`MssqlConnection`]: connection handling, catalog
//!   query and bulk load
//! - [`encode`]: buffer values to TDS column data

mod connection;
pub mod encode;

use tiberius::Client;
use tokio::net::TcpStream;
use tokio_util::compat::Compat;

pub use connection::{MssqlConnection, MssqlConnector};

/// Tiberius client over a tokio TCP stream.
pub type MssqlClient = Client<Compat<TcpStream>>;
