//! In-memory tabular buffer handed to the bulk transfer.

use serde::Serialize;

use crate::core::value::{coerce, SqlType, SqlValue};
use crate::mapping::{Binding, ColumnMapping};

/// Buffer column schema entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferColumn {
    /// Physical column name.
    pub name: String,
    /// Representation type of the column's cells.
    pub sql_type: SqlType,
    /// Physical type name, used to pick the wire encoding.
    pub type_name: String,
}

/// Fully materialized rows, one cell per column in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularBuffer {
    pub columns: Vec<BufferColumn>,
    pub rows: Vec<Vec<SqlValue<'static>>>,
}

impl TabularBuffer {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows in chunks of at most `batch_size`; one chunk when unset.
    pub fn batches(&self, batch_size: Option<u32>) -> impl Iterator<Item = &[Vec<SqlValue<'static>>]> {
        let size = match batch_size {
            Some(n) if n > 0 => n as usize,
            _ => self.rows.len().max(1),
        };
        self.rows.chunks(size)
    }
}

/// Materialize entities into a buffer shaped by the resolved mappings.
pub fn build<E>(mappings: &[ColumnMapping<'_, E>], entities: &[E]) -> TabularBuffer {
    let columns = mappings
        .iter()
        .map(|m| BufferColumn {
            name: m.column.name.clone(),
            sql_type: m.sql_type,
            type_name: m.column.type_name.clone(),
        })
        .collect();

    let rows = entities
        .iter()
        .map(|entity| {
            mappings
                .iter()
                .map(|m| match &m.binding {
                    Binding::Bound(prop) => coerce(prop.read(entity), m.sql_type),
                    Binding::Default(value) => value.clone(),
                })
                .collect()
        })
        .collect();

    TabularBuffer { columns, rows }
}
