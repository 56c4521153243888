//! Physical column discovery through the SQL Server system catalog.
//!
//! The catalog is the authority on which columns a table has and in which
//! order; the entity mapping only decides how each of them gets filled.

use tiberius::{Query, Row};
use tracing::debug;

use crate::core::schema::{PhysicalColumn, TableName};
use crate::drivers::mssql::MssqlClient;
use crate::error::{BulkError, Result};

/// Column list query over `sys.columns`, `sys.types` and `sys.objects`.
///
/// `@P1` is the table name; `@P2` the schema name when `with_schema` is set.
/// The last column is the base-type definition used to declare staging
/// columns (alias types resolved to their system type, rowversion as
/// `varbinary(8)`).
pub fn column_query(with_schema: bool) -> String {
    let schema_filter = if with_schema {
        "\n              AND SCHEMA_NAME(o.schema_id) = @P2"
    } else {
        ""
    };

    format!(
        r#"SELECT c.name,
                   c.column_id,
                   c.is_nullable,
                   t.name AS type_name,
                   c.is_identity,
                   c.is_computed,
                   CAST(CASE WHEN c.default_object_id <> 0 THEN 1 ELSE 0 END AS BIT) AS has_default,
                   CASE
                       WHEN COALESCE(bt.name, t.name) = 'timestamp' THEN 'varbinary(8)'
                       WHEN COALESCE(bt.name, t.name) IN ('nvarchar', 'nchar') AND c.max_length = -1 THEN COALESCE(bt.name, t.name) + '(max)'
                       WHEN COALESCE(bt.name, t.name) IN ('nvarchar', 'nchar') THEN COALESCE(bt.name, t.name) + '(' + CAST(c.max_length / 2 AS VARCHAR(10)) + ')'
                       WHEN COALESCE(bt.name, t.name) IN ('varchar', 'char', 'varbinary', 'binary') AND c.max_length = -1 THEN COALESCE(bt.name, t.name) + '(max)'
                       WHEN COALESCE(bt.name, t.name) IN ('varchar', 'char', 'varbinary', 'binary') THEN COALESCE(bt.name, t.name) + '(' + CAST(c.max_length AS VARCHAR(10)) + ')'
                       WHEN COALESCE(bt.name, t.name) IN ('decimal', 'numeric') THEN COALESCE(bt.name, t.name) + '(' + CAST(c.precision AS VARCHAR(10)) + ',' + CAST(c.scale AS VARCHAR(10)) + ')'
                       WHEN COALESCE(bt.name, t.name) IN ('datetime2', 'time', 'datetimeoffset') THEN COALESCE(bt.name, t.name) + '(' + CAST(c.scale AS VARCHAR(10)) + ')'
                       ELSE COALESCE(bt.name, t.name)
                   END AS definition
            FROM sys.columns c
            JOIN sys.types t ON c.user_type_id = t.user_type_id
            LEFT JOIN sys.types bt ON bt.user_type_id = t.system_type_id
            JOIN sys.objects o ON c.object_id = o.object_id
            WHERE o.type = 'U'
              AND o.name = @P1{}
            ORDER BY c.column_id ASC"#,
        schema_filter
    )
}

/// Fetch the ordered physical column list of a user table.
///
/// Query failures surface as [`BulkError::Catalog`]. A missing table yields
/// an empty list; the pipeline reports it as [`BulkError::TableNotFound`].
pub async fn fetch_columns(client: &mut MssqlClient, table: &TableName) -> Result<Vec<PhysicalColumn>> {
    let catalog_err = |source: tiberius::error::Error| BulkError::Catalog {
        table: table.to_string(),
        source,
    };

    let sql = column_query(table.schema.is_some());
    let mut query = Query::new(sql);
    query.bind(table.name.as_str());
    if let Some(schema) = &table.schema {
        query.bind(schema.as_str());
    }

    let stream = query.query(client).await.map_err(catalog_err)?;
    let rows = stream.into_first_result().await.map_err(catalog_err)?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        columns.push(parse_column(row).map_err(catalog_err)?);
    }

    debug!("Loaded {} physical columns for {}", columns.len(), table);
    Ok(columns)
}

fn parse_column(row: &Row) -> tiberius::Result<PhysicalColumn> {
    let name: &str = row.try_get(0)?.unwrap_or_default();
    let ordinal: i32 = row.try_get(1)?.unwrap_or(0);
    let is_nullable: bool = row.try_get(2)?.unwrap_or(true);
    let type_name: &str = row.try_get(3)?.unwrap_or_default();
    let is_identity: bool = row.try_get(4)?.unwrap_or(false);
    let is_computed: bool = row.try_get(5)?.unwrap_or(false);
    let has_default: bool = row.try_get(6)?.unwrap_or(false);
    let definition: &str = row.try_get(7)?.unwrap_or(type_name);

    Ok(PhysicalColumn {
        name: name.to_string(),
        ordinal,
        is_nullable,
        type_name: type_name.to_string(),
        is_identity,
        is_computed,
        has_default,
        definition: definition.to_string(),
    })
}
