//! SQL Server system catalog queries.
//!
//! System-versioned history tables (`temporal_type = 1`) and shipped objects
//! are excluded; only rowstore unique indexes that are not primary keys count
//! as unique constructs.

use errors::RetrofitError;
use space_core::{ReferentialAction, Table};
use tiberius::Row;

use super::SqlServerClient;
use crate::catalog::{ForeignKeyColumnRow, UniqueColumnRow};

const BACKEND: &str = "sqlserver";

pub const TABLES_QUERY: &str = "
SELECT s.name AS schema_name, t.name AS table_name
FROM sys.tables t
JOIN sys.schemas s ON s.schema_id = t.schema_id
WHERE t.is_ms_shipped = 0
  AND t.temporal_type <> 1
ORDER BY s.name, t.name";

pub const UNIQUE_COLUMNS_QUERY: &str = "
SELECT s.name AS schema_name,
       t.name AS table_name,
       i.name AS index_name,
       kc.name AS constraint_name,
       i.filter_definition AS filter,
       c.name AS column_name,
       CAST(CASE WHEN ic.is_included_column = 1 THEN 1000 + ic.index_column_id
                 ELSE ic.key_ordinal END AS INT) AS ordinal,
       ic.is_descending_key AS descending,
       ic.is_included_column AS included
FROM sys.indexes i
JOIN sys.tables t ON t.object_id = i.object_id
JOIN sys.schemas s ON s.schema_id = t.schema_id
JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
LEFT JOIN sys.key_constraints kc
       ON kc.parent_object_id = i.object_id AND kc.unique_index_id = i.index_id AND kc.type = 'UQ'
WHERE i.is_unique = 1
  AND i.is_primary_key = 0
  AND i.type IN (1, 2)
  AND t.is_ms_shipped = 0
  AND t.temporal_type <> 1
ORDER BY s.name, t.name, i.name, ordinal";

pub const FOREIGN_KEY_COLUMNS_QUERY: &str = "
SELECT fk.name AS constraint_name,
       ps.name AS owning_schema,
       pt.name AS owning_table,
       pc.name AS owning_column,
       rs.name AS referenced_schema,
       rt.name AS referenced_table,
       rc.name AS referenced_column,
       fkc.constraint_column_id AS ordinal,
       fk.delete_referential_action_desc AS on_delete,
       fk.update_referential_action_desc AS on_update
FROM sys.foreign_keys fk
JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
JOIN sys.tables pt ON pt.object_id = fk.parent_object_id
JOIN sys.schemas ps ON ps.schema_id = pt.schema_id
JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id
JOIN sys.schemas rs ON rs.schema_id = rt.schema_id
JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
WHERE fk.is_ms_shipped = 0
ORDER BY ps.name, pt.name, fk.name, fkc.constraint_column_id";

async fn fetch(
    client: &mut SqlServerClient,
    operation: &str,
    query: &str,
) -> Result<Vec<Row>, RetrofitError> {
    let stream = client
        .simple_query(query)
        .await
        .map_err(|e| RetrofitError::catalog(BACKEND, operation, e))?;
    stream
        .into_first_result()
        .await
        .map_err(|e| RetrofitError::catalog(BACKEND, operation, e))
}

fn text(row: &Row, column: &str) -> Result<String, tiberius::error::Error> {
    optional_text(row, column)?.ok_or_else(|| {
        tiberius::error::Error::Conversion(format!("column {column} is NULL").into())
    })
}

fn optional_text(row: &Row, column: &str) -> Result<Option<String>, tiberius::error::Error> {
    Ok(row.try_get::<&str, _>(column)?.map(str::to_string))
}

fn flag(row: &Row, column: &str) -> Result<bool, tiberius::error::Error> {
    Ok(row.try_get::<bool, _>(column)?.unwrap_or(false))
}

fn ordinal(row: &Row) -> Result<i32, tiberius::error::Error> {
    Ok(row.try_get::<i32, _>("ordinal")?.unwrap_or_default())
}

#[tracing::instrument(skip(client))]
pub async fn read_tables(client: &mut SqlServerClient) -> Result<Vec<Table>, RetrofitError> {
    let rows = fetch(client, "read_tables", TABLES_QUERY).await?;
    rows.iter()
        .map(|row| {
            Ok(Table::new(text(row, "schema_name")?, text(row, "table_name")?))
        })
        .collect::<Result<Vec<_>, tiberius::error::Error>>()
        .map_err(|e| RetrofitError::catalog(BACKEND, "read_tables", e))
}

#[tracing::instrument(skip(client))]
pub async fn read_unique_columns(
    client: &mut SqlServerClient,
) -> Result<Vec<UniqueColumnRow>, RetrofitError> {
    let rows = fetch(client, "read_unique_columns", UNIQUE_COLUMNS_QUERY).await?;
    rows.iter()
        .map(|row| {
            Ok(UniqueColumnRow {
                schema: text(row, "schema_name")?,
                table: text(row, "table_name")?,
                index_name: text(row, "index_name")?,
                constraint_name: optional_text(row, "constraint_name")?,
                filter: optional_text(row, "filter")?,
                column: text(row, "column_name")?,
                ordinal: ordinal(row)?,
                descending: flag(row, "descending")?,
                included: flag(row, "included")?,
            })
        })
        .collect::<Result<Vec<_>, tiberius::error::Error>>()
        .map_err(|e| RetrofitError::catalog(BACKEND, "read_unique_columns", e))
}

#[tracing::instrument(skip(client))]
pub async fn read_foreign_key_columns(
    client: &mut SqlServerClient,
) -> Result<Vec<ForeignKeyColumnRow>, RetrofitError> {
    let rows = fetch(client, "read_foreign_key_columns", FOREIGN_KEY_COLUMNS_QUERY).await?;
    rows.iter()
        .map(|row| {
            Ok(ForeignKeyColumnRow {
                name: text(row, "constraint_name")?,
                owning_schema: text(row, "owning_schema")?,
                owning_table: text(row, "owning_table")?,
                owning_column: text(row, "owning_column")?,
                referenced_schema: text(row, "referenced_schema")?,
                referenced_table: text(row, "referenced_table")?,
                referenced_column: text(row, "referenced_column")?,
                ordinal: ordinal(row)?,
                on_delete: ReferentialAction::from_sqlserver_desc(&text(row, "on_delete")?),
                on_update: ReferentialAction::from_sqlserver_desc(&text(row, "on_update")?),
            })
        })
        .collect::<Result<Vec<_>, tiberius::error::Error>>()
        .map_err(|e| RetrofitError::catalog(BACKEND, "read_foreign_key_columns", e))
}
