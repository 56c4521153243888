//! Load strategy selection and the statements used by the staged path.
//!
//! A TDS bulk load request writes every column it names and has no way to ask
//! for identity values to be kept or for NULLs to override defaults. Tables
//! that need either go through a session temp table and a single
//! `INSERT ... SELECT` instead.

use std::fmt;

use serde::Serialize;

use crate::core::schema::{quote_ident, PhysicalColumn, TableName};

/// How a buffer reaches its destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Bulk load straight into the destination.
    Direct,
    /// Bulk load into a temp table, then copy the writable columns.
    Staged,
}

impl LoadStrategy {
    /// Pick the strategy for a table's physical columns.
    pub fn choose(columns: &[PhysicalColumn]) -> Self {
        let needs_staging = columns.iter().any(|c| {
            c.is_identity
                || c.is_computed
                || c.has_default
                || c.is_rowversion()
                || load_definition(c) != c.definition
        });
        if needs_staging {
            LoadStrategy::Staged
        } else {
            LoadStrategy::Direct
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::Direct => f.write_str("direct"),
            LoadStrategy::Staged => f.write_str("staged"),
        }
    }
}

/// Column type used in the bulk load request.
///
/// Types the bulk protocol cannot encode are loaded as a compatible type and
/// converted by the server during the copy.
pub fn load_definition(column: &PhysicalColumn) -> String {
    match column.type_name.to_ascii_lowercase().as_str() {
        "timestamp" | "rowversion" => "varbinary(8)".to_string(),
        "money" => "decimal(19,4)".to_string(),
        "smallmoney" => "decimal(10,4)".to_string(),
        "xml" | "ntext" => "nvarchar(max)".to_string(),
        "text" => "varchar(max)".to_string(),
        "image" => "varbinary(max)".to_string(),
        _ if column.definition.is_empty() => column.type_name.clone(),
        _ => column.definition.clone(),
    }
}

/// Base type name of a definition, e.g. `decimal` for `decimal(18,2)`.
pub fn base_type(definition: &str) -> &str {
    definition.split('(').next().unwrap_or(definition).trim()
}

/// Scale of a `decimal(p,s)`, `datetime2(s)`, `time(s)` or
/// `datetimeoffset(s)` definition.
pub fn definition_scale(definition: &str) -> Option<u8> {
    let open = definition.find('(')?;
    let close = definition.rfind(')')?;
    let args = definition.get(open + 1..close)?;
    let scale = match base_type(definition).to_ascii_lowercase().as_str() {
        "decimal" | "numeric" => args.split(',').nth(1)?,
        "datetime2" | "time" | "datetimeoffset" => args,
        _ => return None,
    };
    scale.trim().parse().ok()
}

/// Columns an `INSERT` may name.
pub fn writable_columns(columns: &[PhysicalColumn], keep_identity: bool) -> Vec<&PhysicalColumn> {
    columns
        .iter()
        .filter(|c| c.is_writable(keep_identity))
        .collect()
}

/// Name of a fresh session temp table.
pub fn staging_table_name() -> String {
    format!("#bulk_{}", uuid::Uuid::new_v4().simple())
}

/// `CREATE TABLE` for the staging table: every column nullable, in buffer order.
pub fn create_staging_sql(staging: &str, columns: &[PhysicalColumn]) -> String {
    let col_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {} NULL", quote_ident(&c.name), load_definition(c)))
        .collect();
    format!("CREATE TABLE {} ({})", staging, col_defs.join(", "))
}

/// Copy from the staging table into the destination.
///
/// Returns `None` when no column is writable.
pub fn insert_select_sql(
    table: &TableName,
    staging: &str,
    columns: &[PhysicalColumn],
    keep_identity: bool,
) -> Option<String> {
    let writable = writable_columns(columns, keep_identity);
    if writable.is_empty() {
        return None;
    }

    let col_list = writable
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let target = table.quoted();
    let insert = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {};",
        target, col_list, col_list, staging
    );

    let identity_written = keep_identity && writable.iter().any(|c| c.is_identity);
    if identity_written {
        Some(format!(
            "SET IDENTITY_INSERT {} ON; {} SET IDENTITY_INSERT {} OFF;",
            target, insert, target
        ))
    } else {
        Some(insert)
    }
}

pub fn drop_staging_sql(staging: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", staging)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_columns() -> Vec<PhysicalColumn> {
        vec![
            PhysicalColumn::new("Id", 1, false, "int"),
            PhysicalColumn::new("Name", 2, true, "nvarchar").with_definition("nvarchar(50)"),
        ]
    }

    #[test]
    fn test_plain_table_loads_directly() {
        assert_eq!(LoadStrategy::choose(&plain_columns()), LoadStrategy::Direct);
    }

    #[test]
    fn test_special_columns_force_staging() {
        let cases = vec![
            PhysicalColumn::new("Id", 1, false, "int").identity(),
            PhysicalColumn::new("Total", 1, true, "int").computed(),
            PhysicalColumn::new("Created", 1, false, "datetime2").defaulted(),
            PhysicalColumn::new("Version", 1, false, "timestamp").with_definition("varbinary(8)"),
            PhysicalColumn::new("Price", 1, false, "money"),
            PhysicalColumn::new("Doc", 1, true, "xml"),
        ];
        for col in cases {
            let name = col.name.clone();
            assert_eq!(
                LoadStrategy::choose(&[col]),
                LoadStrategy::Staged,
                "column {}",
                name
            );
        }
    }

    #[test]
    fn test_definition_scale() {
        assert_eq!(definition_scale("decimal(18,2)"), Some(2));
        assert_eq!(definition_scale("numeric(10, 4)"), Some(4));
        assert_eq!(definition_scale("datetime2(3)"), Some(3));
        assert_eq!(definition_scale("time(7)"), Some(7));
        assert_eq!(definition_scale("nvarchar(50)"), None);
        assert_eq!(definition_scale("int"), None);
        assert_eq!(base_type("decimal(18,2)"), "decimal");
    }

    #[test]
    fn test_create_staging_sql() {
        let mut cols = plain_columns();
        cols.push(PhysicalColumn::new("Version", 3, false, "timestamp"));
        let sql = create_staging_sql("#bulk_x", &cols);
        assert_eq!(
            sql,
            "CREATE TABLE #bulk_x ([Id] int NULL, [Name] nvarchar(50) NULL, [Version] varbinary(8) NULL)"
        );
    }

    #[test]
    fn test_insert_select_skips_generated_columns() {
        let cols = vec![
            PhysicalColumn::new("Id", 1, false, "int").identity(),
            PhysicalColumn::new("Name", 2, true, "nvarchar"),
            PhysicalColumn::new("Total", 3, true, "int").computed(),
            PhysicalColumn::new("Version", 4, false, "timestamp"),
        ];
        let table = TableName::with_schema("dbo", "Orders");

        let sql = insert_select_sql(&table, "#bulk_x", &cols, false).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO [dbo].[Orders] ([Name]) SELECT [Name] FROM #bulk_x;"
        );

        let sql = insert_select_sql(&table, "#bulk_x", &cols, true).unwrap();
        assert!(sql.starts_with("SET IDENTITY_INSERT [dbo].[Orders] ON;"));
        assert!(sql.contains("([Id], [Name]) SELECT [Id], [Name] FROM #bulk_x;"));
        assert!(sql.ends_with("SET IDENTITY_INSERT [dbo].[Orders] OFF;"));
    }

    #[test]
    fn test_insert_select_without_writable_columns() {
        let cols = vec![PhysicalColumn::new("Version", 1, false, "timestamp")];
        assert!(insert_select_sql(&TableName::new("T"), "#s", &cols, false).is_none());
    }

    #[test]
    fn test_staging_table_name_is_temp() {
        let a = staging_table_name();
        let b = staging_table_name();
        assert!(a.starts_with("#bulk_"));
        assert_ne!(a, b);
        assert_eq!(drop_staging_sql(&a), format!("DROP TABLE IF EXISTS {}", a));
    }
}
