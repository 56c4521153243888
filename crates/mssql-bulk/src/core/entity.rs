//! Entity mapping descriptors consumed by the bulk insert pipeline.
//!
//! These are read-only inputs: an [`EntityMapping`] names the destination table
//! and lists, in declaration order, how each mapped property reaches a column.

use std::fmt;
use std::sync::Arc;

use super::schema::TableName;
use super::value::{HostValue, SqlType};

/// Declared host type of a mapped property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    /// Plain value of the given representation.
    Scalar(SqlType),
    /// Nullable wrapper around a plain value.
    Nullable(SqlType),
    /// Enumeration, stored as its integer code.
    Enum,
    /// Nullable enumeration.
    NullableEnum,
}

impl HostType {
    /// The type with any nullable wrapper stripped.
    pub fn underlying(&self) -> HostType {
        match self {
            HostType::Nullable(t) => HostType::Scalar(*t),
            HostType::NullableEnum => HostType::Enum,
            other => *other,
        }
    }

    /// Whether the underlying type is an enumeration.
    pub fn is_enum(&self) -> bool {
        matches!(self.underlying(), HostType::Enum)
    }

    /// Buffer column representation for a property of this type.
    pub fn representation(&self) -> SqlType {
        match self.underlying() {
            HostType::Scalar(t) => t,
            _ => SqlType::I32,
        }
    }
}

type Accessor<E> = Arc<dyn Fn(&E) -> HostValue + Send + Sync>;

/// Links one entity property to a physical column name.
pub struct PropertyDescriptor<E> {
    column: String,
    host_type: HostType,
    accessor: Accessor<E>,
}

impl<E> PropertyDescriptor<E> {
    /// Describe a property by column name, declared type and accessor.
    pub fn new<F>(column: impl Into<String>, host_type: HostType, accessor: F) -> Self
    where
        F: Fn(&E) -> HostValue + Send + Sync + 'static,
    {
        Self {
            column: column.into(),
            host_type,
            accessor: Arc::new(accessor),
        }
    }

    /// Declared column name.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Declared host type.
    pub fn host_type(&self) -> HostType {
        self.host_type
    }

    /// Read the property from an entity.
    pub fn read(&self, entity: &E) -> HostValue {
        (self.accessor)(entity)
    }
}

impl<E> Clone for PropertyDescriptor<E> {
    fn clone(&self) -> Self {
        Self {
            column: self.column.clone(),
            host_type: self.host_type,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<E> fmt::Debug for PropertyDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("column", &self.column)
            .field("host_type", &self.host_type)
            .finish_non_exhaustive()
    }
}

/// Destination table and property descriptors of one entity type.
#[derive(Debug, Clone)]
pub struct EntityMapping<E> {
    pub table: TableName,
    pub properties: Vec<PropertyDescriptor<E>>,
}

impl<E> EntityMapping<E> {
    /// Start a mapping for the given destination table.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            properties: Vec::new(),
        }
    }

    /// Append a property descriptor.
    pub fn property(mut self, descriptor: PropertyDescriptor<E>) -> Self {
        self.properties.push(descriptor);
        self
    }
}

/// Types with a static entity mapping.
pub trait Entity: Sized {
    fn mapping() -> EntityMapping<Self>;
}
