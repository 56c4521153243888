//! Column mapping resolution.
//!
//! Pairs every physical column, in catalog order, with either a mapped entity
//! property or a fallback value. Unmapped columns still get a buffer slot so
//! that the buffer always mirrors the full table.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::entity::PropertyDescriptor;
use crate::core::schema::PhysicalColumn;
use crate::core::value::{SqlType, SqlValue};
use crate::error::Result;
use crate::typemap;

/// How a buffer column gets its values.
pub enum Binding<'a, E> {
    /// Read from the entity through the property accessor.
    Bound(&'a PropertyDescriptor<E>),
    /// Constant fallback for an unmapped column: the missing marker when the
    /// column is nullable, otherwise the registry zero value.
    Default(SqlValue<'static>),
}

impl<E> Clone for Binding<'_, E> {
    fn clone(&self) -> Self {
        match self {
            Binding::Bound(prop) => Binding::Bound(*prop),
            Binding::Default(value) => Binding::Default(value.clone()),
        }
    }
}

impl<E> fmt::Debug for Binding<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Bound(prop) => f.debug_tuple("Bound").field(prop).finish(),
            Binding::Default(value) => f.debug_tuple("Default").field(value).finish(),
        }
    }
}

/// A physical column paired with its value source.
pub struct ColumnMapping<'a, E> {
    pub column: PhysicalColumn,
    pub binding: Binding<'a, E>,
    pub sql_type: SqlType,
}

impl<E> Clone for ColumnMapping<'_, E> {
    fn clone(&self) -> Self {
        Self {
            column: self.column.clone(),
            binding: self.binding.clone(),
            sql_type: self.sql_type,
        }
    }
}

impl<E> fmt::Debug for ColumnMapping<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMapping")
            .field("column", &self.column.name)
            .field("binding", &self.binding)
            .field("sql_type", &self.sql_type)
            .finish()
    }
}

impl<E> ColumnMapping<'_, E> {
    pub fn is_bound(&self) -> bool {
        matches!(self.binding, Binding::Bound(_))
    }
}

/// Resolve the ordered column mappings for a table.
///
/// The result has exactly one entry per physical column, in the order given.
/// When several properties declare the same column the first one wins and the
/// rest are ignored with a warning. Fails with
/// [`BulkError::UnsupportedType`](crate::BulkError::UnsupportedType) if an
/// unmapped column has a type outside the registry.
pub fn resolve<'a, E>(
    columns: &[PhysicalColumn],
    properties: &'a [PropertyDescriptor<E>],
) -> Result<Vec<ColumnMapping<'a, E>>> {
    warn_duplicates(properties);

    let mut mappings = Vec::with_capacity(columns.len());
    for column in columns {
        let mapping = match properties.iter().find(|p| p.column() == column.name) {
            Some(prop) => ColumnMapping {
                column: column.clone(),
                binding: Binding::Bound(prop),
                sql_type: prop.host_type().representation(),
            },
            None => {
                let entry = typemap::lookup_column(&column.name, &column.type_name)?;
                let fallback = if column.is_nullable {
                    SqlValue::Null(entry.representation)
                } else {
                    entry.zero_value.clone()
                };
                debug!(
                    "Column {} is not mapped; filling with {:?}",
                    column.name, fallback
                );
                ColumnMapping {
                    column: column.clone(),
                    binding: Binding::Default(fallback),
                    sql_type: entry.representation,
                }
            }
        };
        mappings.push(mapping);
    }

    Ok(mappings)
}

fn warn_duplicates<E>(properties: &[PropertyDescriptor<E>]) {
    let mut seen = HashSet::new();
    for prop in properties {
        if !seen.insert(prop.column()) {
            warn!(
                "Column {} is mapped more than once; using the first declared property",
                prop.column()
            );
        }
    }
}

/// Serializable summary of one resolved column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnPlan {
    pub name: String,
    pub ordinal: i32,
    pub type_name: String,
    pub nullable: bool,
    pub representation: SqlType,
    pub bound: bool,
    pub is_identity: bool,
    pub is_computed: bool,
}

impl<E> From<&ColumnMapping<'_, E>> for ColumnPlan {
    fn from(mapping: &ColumnMapping<'_, E>) -> Self {
        Self {
            name: mapping.column.name.clone(),
            ordinal: mapping.column.ordinal,
            type_name: mapping.column.type_name.clone(),
            nullable: mapping.column.is_nullable,
            representation: mapping.sql_type,
            bound: mapping.is_bound(),
            is_identity: mapping.column.is_identity,
            is_computed: mapping.column.is_computed,
        }
    }
}
