//! Core types and traits shared by every stage of the bulk insert pipeline.
//!
//! - [`schema`]: destination table identifiers and physical column metadata
//! - [`value`]: buffer cell values, representation types and coercion
//! - [`entity`]: property descriptors supplied by the entity mapping layer
//! - [`traits`]: connection, connector and ambient session abstractions

pub mod entity;
pub mod schema;
pub mod traits;
pub mod value;

pub use entity::{Entity, EntityMapping, HostType, PropertyDescriptor};
pub use schema::{quote_ident, PhysicalColumn, TableName};
pub use traits::{AmbientSession, BulkConnection, BulkOptions, Connector};
pub use value::{coerce, HostValue, SqlType, SqlValue};
