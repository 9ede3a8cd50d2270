//! PostgreSQL system catalog queries.
//!
//! Partitions are skipped in favour of their partitioned parent, expression
//! indexes are skipped because their key is not a column list, and primary
//! keys never count as unique constructs.

use errors::RetrofitError;
use space_core::{ReferentialAction, Table};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use crate::catalog::{ForeignKeyColumnRow, UniqueColumnRow};

const BACKEND: &str = "postgres";

pub const TABLES_QUERY: &str = r"
SELECT n.nspname::text AS schema_name,
       c.relname::text AS table_name
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p')
  AND NOT c.relispartition
  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname NOT LIKE 'pg\_%'
ORDER BY 1, 2";

pub const UNIQUE_COLUMNS_QUERY: &str = r"
SELECT n.nspname::text AS schema_name,
       t.relname::text AS table_name,
       i.relname::text AS index_name,
       con.conname::text AS constraint_name,
       pg_get_expr(ix.indpred, ix.indrelid) AS filter,
       a.attname::text AS column_name,
       k.ord::int4 AS ordinal,
       (k.ord > ix.indnkeyatts) AS included,
       COALESCE(k.ord <= ix.indnkeyatts
                AND (ix.indoption[(k.ord - 1)::int]::int4 & 1) = 1, false) AS descending
FROM pg_catalog.pg_index ix
JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
LEFT JOIN pg_catalog.pg_constraint con ON con.conindid = ix.indexrelid AND con.contype = 'u'
WHERE ix.indisunique
  AND NOT ix.indisprimary
  AND ix.indexprs IS NULL
  AND t.relkind IN ('r', 'p')
  AND NOT t.relispartition
  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
  AND n.nspname NOT LIKE 'pg\_%'
ORDER BY 1, 2, 3, 7";

pub const FOREIGN_KEY_COLUMNS_QUERY: &str = r"
SELECT con.conname::text AS constraint_name,
       sn.nspname::text AS owning_schema,
       st.relname::text AS owning_table,
       sa.attname::text AS owning_column,
       tn.nspname::text AS referenced_schema,
       tt.relname::text AS referenced_table,
       ta.attname::text AS referenced_column,
       k.ord::int4 AS ordinal,
       con.confdeltype::text AS on_delete,
       con.confupdtype::text AS on_update
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class st ON st.oid = con.conrelid
JOIN pg_catalog.pg_namespace sn ON sn.oid = st.relnamespace
JOIN pg_catalog.pg_class tt ON tt.oid = con.confrelid
JOIN pg_catalog.pg_namespace tn ON tn.oid = tt.relnamespace
CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(owning_attnum, referenced_attnum, ord)
JOIN pg_catalog.pg_attribute sa ON sa.attrelid = con.conrelid AND sa.attnum = k.owning_attnum
JOIN pg_catalog.pg_attribute ta ON ta.attrelid = con.confrelid AND ta.attnum = k.referenced_attnum
WHERE con.contype = 'f'
  AND con.conparentid = 0
  AND sn.nspname NOT IN ('pg_catalog', 'information_schema')
  AND sn.nspname NOT LIKE 'pg\_%'
ORDER BY 2, 3, 1, 8";

fn decode<T>(operation: &str, result: Result<T, sqlx::Error>) -> Result<T, RetrofitError> {
    result.map_err(|e| RetrofitError::catalog(BACKEND, operation, e))
}

#[tracing::instrument(skip(conn))]
pub async fn read_tables(conn: &mut PgConnection) -> Result<Vec<Table>, RetrofitError> {
    let rows = decode("read_tables", sqlx::query(TABLES_QUERY).fetch_all(conn).await)?;

    rows.iter()
        .map(|row| {
            Ok(Table::new(
                decode("read_tables", row.try_get::<String, _>("schema_name"))?,
                decode("read_tables", row.try_get::<String, _>("table_name"))?,
            ))
        })
        .collect()
}

#[tracing::instrument(skip(conn))]
pub async fn read_unique_columns(
    conn: &mut PgConnection,
) -> Result<Vec<UniqueColumnRow>, RetrofitError> {
    let rows = decode(
        "read_unique_columns",
        sqlx::query(UNIQUE_COLUMNS_QUERY).fetch_all(conn).await,
    )?;

    rows.iter()
        .map(|row| decode("read_unique_columns", unique_column_row(row)))
        .collect()
}

fn unique_column_row(row: &PgRow) -> Result<UniqueColumnRow, sqlx::Error> {
    Ok(UniqueColumnRow {
        schema: row.try_get("schema_name")?,
        table: row.try_get("table_name")?,
        index_name: row.try_get("index_name")?,
        constraint_name: row.try_get("constraint_name")?,
        filter: row.try_get("filter")?,
        column: row.try_get("column_name")?,
        ordinal: row.try_get("ordinal")?,
        descending: row.try_get("descending")?,
        included: row.try_get("included")?,
    })
}

#[tracing::instrument(skip(conn))]
pub async fn read_foreign_key_columns(
    conn: &mut PgConnection,
) -> Result<Vec<ForeignKeyColumnRow>, RetrofitError> {
    let rows = decode(
        "read_foreign_key_columns",
        sqlx::query(FOREIGN_KEY_COLUMNS_QUERY).fetch_all(conn).await,
    )?;

    rows.iter()
        .map(|row| decode("read_foreign_key_columns", foreign_key_column_row(row)))
        .collect()
}

fn foreign_key_column_row(row: &PgRow) -> Result<ForeignKeyColumnRow, sqlx::Error> {
    let on_delete: String = row.try_get("on_delete")?;
    let on_update: String = row.try_get("on_update")?;
    Ok(ForeignKeyColumnRow {
        name: row.try_get("constraint_name")?,
        owning_schema: row.try_get("owning_schema")?,
        owning_table: row.try_get("owning_table")?,
        owning_column: row.try_get("owning_column")?,
        referenced_schema: row.try_get("referenced_schema")?,
        referenced_table: row.try_get("referenced_table")?,
        referenced_column: row.try_get("referenced_column")?,
        ordinal: row.try_get("ordinal")?,
        on_delete: ReferentialAction::from_pg_code(&on_delete),
        on_update: ReferentialAction::from_pg_code(&on_update),
    })
}
