//! # Metadata Catalog Reader
//!
//! Backends return flat per-column rows from their system catalogs. This
//! module groups them into [`UniqueConstruct`]s and [`ForeignKey`]s and applies
//! the caller's [`TableFilter`] client-side, after a full unfiltered read, so
//! filters only ever see a [`Table`].
//!
//! Primary keys, system schemas and history/partition tables are excluded by
//! the backend queries themselves.

use errors::RetrofitError;
use serde::Serialize;
use space_core::{Column, ForeignKey, ReferentialAction, Table, TableFilter, UniqueConstruct};

use crate::backend::SchemaBackend;
use crate::guard::StatementGuard;

/// One key or payload column of a unique index, as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueColumnRow {
    pub schema: String,
    pub table: String,
    pub index_name: String,
    pub constraint_name: Option<String>,
    pub filter: Option<String>,
    pub column: String,
    pub ordinal: i32,
    pub descending: bool,
    pub included: bool,
}

/// One column pair of a foreign key, as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyColumnRow {
    pub name: String,
    pub owning_schema: String,
    pub owning_table: String,
    pub owning_column: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub ordinal: i32,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// Groups per-column rows into unique constructs.
///
/// Columns keep catalog order by `ordinal`; constructs are returned sorted by
/// table then index name.
pub fn assemble_unique_constructs(rows: Vec<UniqueColumnRow>) -> Vec<UniqueConstruct> {
    let mut rows = rows;
    rows.sort_by(|a, b| {
        (&a.schema, &a.table, &a.index_name, a.ordinal).cmp(&(
            &b.schema,
            &b.table,
            &b.index_name,
            b.ordinal,
        ))
    });

    let mut constructs: Vec<UniqueConstruct> = Vec::new();
    for row in rows {
        let column = Column {
            name: row.column,
            descending: row.descending && !row.included,
            included: row.included,
        };

        if let Some(last) = constructs.last_mut()
            && last.table.schema == row.schema
            && last.table.name == row.table
            && last.name == row.index_name
        {
            last.columns.push(column);
            continue;
        }

        constructs.push(UniqueConstruct {
            table: Table::new(row.schema, row.table),
            name: row.index_name,
            columns: vec![column],
            backed_by_constraint: row.constraint_name.is_some(),
            constraint_name: row.constraint_name,
            filter: row.filter.filter(|f| !f.trim().is_empty()),
        });
    }

    constructs
}

/// Groups per-column rows into foreign keys, preserving column pairing.
pub fn assemble_foreign_keys(rows: Vec<ForeignKeyColumnRow>) -> Vec<ForeignKey> {
    let mut rows = rows;
    rows.sort_by(|a, b| {
        (&a.owning_schema, &a.owning_table, &a.name, a.ordinal).cmp(&(
            &b.owning_schema,
            &b.owning_table,
            &b.name,
            b.ordinal,
        ))
    });

    let mut foreign_keys: Vec<ForeignKey> = Vec::new();
    for row in rows {
        if let Some(last) = foreign_keys.last_mut()
            && last.owning_table.schema == row.owning_schema
            && last.owning_table.name == row.owning_table
            && last.name == row.name
        {
            last.owning_columns.push(row.owning_column);
            last.referenced_columns.push(row.referenced_column);
            continue;
        }

        foreign_keys.push(ForeignKey {
            name: row.name,
            owning_table: Table::new(row.owning_schema, row.owning_table),
            owning_columns: vec![row.owning_column],
            referenced_table: Table::new(row.referenced_schema, row.referenced_table),
            referenced_columns: vec![row.referenced_column],
            on_delete: row.on_delete,
            on_update: row.on_update,
        });
    }

    foreign_keys
}

/// Unfiltered, read-only view of a schema taken at one point in time.
///
/// Snapshots are never cached across runs; every `apply` and `plan` reads a
/// fresh one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogSnapshot {
    pub tables: Vec<Table>,
    pub unique_constructs: Vec<UniqueConstruct>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl CatalogSnapshot {
    pub fn tables_matching(&self, filter: &TableFilter) -> Vec<Table> {
        let mut tables: Vec<Table> = self
            .tables
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tables.sort();
        tables
    }

    pub fn unique_constructs_matching(&self, filter: &TableFilter) -> Vec<UniqueConstruct> {
        self.unique_constructs
            .iter()
            .filter(|c| filter.matches(&c.table))
            .cloned()
            .collect()
    }

    /// Foreign keys touching the filter on either side.
    ///
    /// The owning side alone is not enough: a key whose referenced table is
    /// selected but whose owning table is not must still reach the planner so
    /// it can be reported.
    pub fn foreign_keys_matching(&self, filter: &TableFilter) -> Vec<ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| filter.matches(&fk.owning_table) || filter.matches(&fk.referenced_table))
            .cloned()
            .collect()
    }
}

/// Reads the catalog of a [`SchemaBackend`] under a [`StatementGuard`].
pub struct CatalogReader<'a, B: SchemaBackend> {
    backend: &'a mut B,
    guard: &'a StatementGuard,
}

impl<'a, B: SchemaBackend> CatalogReader<'a, B> {
    pub fn new(backend: &'a mut B, guard: &'a StatementGuard) -> Self {
        Self { backend, guard }
    }

    pub async fn list_tables(&mut self, filter: &TableFilter) -> Result<Vec<Table>, RetrofitError> {
        let tables = self.read_tables().await?;
        let snapshot = CatalogSnapshot {
            tables,
            ..Default::default()
        };
        Ok(snapshot.tables_matching(filter))
    }

    pub async fn list_unique_constructs(
        &mut self,
        filter: &TableFilter,
    ) -> Result<Vec<UniqueConstruct>, RetrofitError> {
        let rows = self
            .guard
            .run("read_unique_columns", self.backend.read_unique_columns())
            .await?;
        let snapshot = CatalogSnapshot {
            unique_constructs: assemble_unique_constructs(rows),
            ..Default::default()
        };
        Ok(snapshot.unique_constructs_matching(filter))
    }

    pub async fn list_foreign_keys(
        &mut self,
        filter: &TableFilter,
    ) -> Result<Vec<ForeignKey>, RetrofitError> {
        let rows = self
            .guard
            .run("read_foreign_key_columns", self.backend.read_foreign_key_columns())
            .await?;
        let snapshot = CatalogSnapshot {
            foreign_keys: assemble_foreign_keys(rows),
            ..Default::default()
        };
        Ok(snapshot.foreign_keys_matching(filter))
    }

    /// Full, unfiltered read of all three catalogs.
    pub async fn snapshot(&mut self) -> Result<CatalogSnapshot, RetrofitError> {
        let tables = self.read_tables().await?;
        let unique_rows = self
            .guard
            .run("read_unique_columns", self.backend.read_unique_columns())
            .await?;
        let foreign_key_rows = self
            .guard
            .run("read_foreign_key_columns", self.backend.read_foreign_key_columns())
            .await?;

        let snapshot = CatalogSnapshot {
            tables,
            unique_constructs: assemble_unique_constructs(unique_rows),
            foreign_keys: assemble_foreign_keys(foreign_key_rows),
        };

        tracing::debug!(
            tables = snapshot.tables.len(),
            unique_constructs = snapshot.unique_constructs.len(),
            foreign_keys = snapshot.foreign_keys.len(),
            "Catalog snapshot read"
        );

        Ok(snapshot)
    }

    async fn read_tables(&mut self) -> Result<Vec<Table>, RetrofitError> {
        self.guard
            .run("read_tables", self.backend.read_tables())
            .await
    }
}
