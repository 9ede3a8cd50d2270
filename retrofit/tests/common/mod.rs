//! In-memory [`SchemaBackend`] that enforces the dependency rules a real
//! catalog enforces, so ordering mistakes surface as DDL failures.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use config::RetrofitOptions;
use errors::RetrofitError;
use retrofit::{DdlOperation, ForeignKeyColumnRow, SchemaBackend, UniqueColumnRow};
use space_core::{BackendKind, Column, ForeignKey, ReferentialAction, Table, UniqueConstruct};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaState {
    pub tables: Vec<Table>,
    pub columns: BTreeMap<Table, BTreeSet<String>>,
    pub defaults: BTreeSet<Table>,
    pub unique_constructs: Vec<UniqueConstruct>,
    pub foreign_keys: Vec<ForeignKey>,
    pub row_security: Vec<Table>,
    pub roles: BTreeSet<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    pub state: SchemaState,
    /// Step names of every committed primitive, in order.
    pub executed: Vec<&'static str>,
    /// Fail the first primitive of this step.
    pub fail_on: Option<&'static str>,
    /// Cancel this token once this many primitives have committed.
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeBackend {
    pub fn new(state: SchemaState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    fn reject(step: &str, target: String, reason: &str) -> RetrofitError {
        RetrofitError::ddl(step, target, reason.to_string())
    }

    fn has_column(&self, table: &Table, column: &str) -> bool {
        self.state
            .columns
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    fn apply(
        &mut self,
        operation: &DdlOperation,
        options: &RetrofitOptions,
    ) -> Result<(), RetrofitError> {
        let step = operation.step();
        let tenant = options.tenant_column.as_str();

        match operation {
            DdlOperation::EnsureApplicationRole(role) => {
                self.state.roles.insert(role.name.clone());
            }
            DdlOperation::AddTenantColumn(table) => {
                self.state
                    .columns
                    .entry(table.clone())
                    .or_default()
                    .insert(tenant.to_string());
            }
            DdlOperation::SetTenantColumnDefault(table) => {
                if !self.has_column(table, tenant) {
                    return Err(Self::reject(step, table.to_string(), "column does not exist"));
                }
                self.state.defaults.insert(table.clone());
            }
            DdlOperation::DropForeignKey(fk) => {
                self.state
                    .foreign_keys
                    .retain(|k| !(k.owning_table == fk.owning_table && k.name == fk.name));
            }
            DdlOperation::WidenUniqueConstruct(construct) => {
                if !self.has_column(&construct.table, tenant) {
                    return Err(Self::reject(step, construct.name.clone(), "column does not exist"));
                }
                let depended_on = self.state.foreign_keys.iter().any(|fk| {
                    fk.referenced_table == construct.table
                        && construct.key_matches(&fk.referenced_columns)
                });
                if depended_on {
                    return Err(Self::reject(
                        step,
                        construct.name.clone(),
                        "cannot drop index because a foreign key depends on it",
                    ));
                }

                let mut columns: Vec<Column> =
                    construct.key_columns_except(tenant).cloned().collect();
                columns.push(Column::key(tenant));
                columns.extend(construct.included_columns().cloned());

                self.state
                    .unique_constructs
                    .retain(|c| !(c.table == construct.table && c.name == construct.name));
                self.state.unique_constructs.push(UniqueConstruct {
                    columns,
                    ..construct.clone()
                });
            }
            DdlOperation::RecreateForeignKey(fk) => {
                let mut owning_columns = fk.owning_columns.clone();
                let mut referenced_columns = fk.referenced_columns.clone();
                owning_columns.push(tenant.to_string());
                referenced_columns.push(tenant.to_string());

                if !self.has_column(&fk.owning_table, tenant) {
                    return Err(Self::reject(step, fk.name.clone(), "column does not exist"));
                }
                let backed = self.state.unique_constructs.iter().any(|c| {
                    c.table == fk.referenced_table && c.key_matches(&referenced_columns)
                });
                if !backed {
                    return Err(Self::reject(
                        step,
                        fk.name.clone(),
                        "no unique constraint matching given keys for referenced table",
                    ));
                }

                self.state
                    .foreign_keys
                    .retain(|k| !(k.owning_table == fk.owning_table && k.name == fk.name));
                self.state.foreign_keys.push(ForeignKey {
                    owning_columns,
                    referenced_columns,
                    ..fk.clone()
                });
            }
            DdlOperation::InstallRowSecurity(tables) => {
                for table in tables {
                    if !self.has_column(table, tenant) {
                        return Err(Self::reject(step, table.to_string(), "column does not exist"));
                    }
                }
                self.state.row_security = tables.clone();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn read_tables(&mut self) -> Result<Vec<Table>, RetrofitError> {
        Ok(self.state.tables.clone())
    }

    async fn read_unique_columns(&mut self) -> Result<Vec<UniqueColumnRow>, RetrofitError> {
        let mut rows = Vec::new();
        for construct in &self.state.unique_constructs {
            for (ordinal, column) in construct.columns.iter().enumerate() {
                rows.push(UniqueColumnRow {
                    schema: construct.table.schema.clone(),
                    table: construct.table.name.clone(),
                    index_name: construct.name.clone(),
                    constraint_name: construct.constraint_name.clone(),
                    filter: construct.filter.clone(),
                    column: column.name.clone(),
                    ordinal: i32::try_from(ordinal).unwrap_or(i32::MAX) + 1,
                    descending: column.descending,
                    included: column.included,
                });
            }
        }
        Ok(rows)
    }

    async fn read_foreign_key_columns(&mut self) -> Result<Vec<ForeignKeyColumnRow>, RetrofitError> {
        let mut rows = Vec::new();
        for fk in &self.state.foreign_keys {
            for (ordinal, (owning, referenced)) in fk
                .owning_columns
                .iter()
                .zip(&fk.referenced_columns)
                .enumerate()
            {
                rows.push(ForeignKeyColumnRow {
                    name: fk.name.clone(),
                    owning_schema: fk.owning_table.schema.clone(),
                    owning_table: fk.owning_table.name.clone(),
                    owning_column: owning.clone(),
                    referenced_schema: fk.referenced_table.schema.clone(),
                    referenced_table: fk.referenced_table.name.clone(),
                    referenced_column: referenced.clone(),
                    ordinal: i32::try_from(ordinal).unwrap_or(i32::MAX) + 1,
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                });
            }
        }
        Ok(rows)
    }

    async fn execute_atomic(
        &mut self,
        operations: &[DdlOperation],
        options: &RetrofitOptions,
    ) -> Result<usize, RetrofitError> {
        let committed_state = self.state.clone();
        let committed_len = self.executed.len();

        for operation in operations {
            let result = if self.fail_on == Some(operation.step()) {
                self.fail_on = None;
                Err(Self::reject(operation.step(), operation.target(), "injected failure"))
            } else {
                self.apply(operation, options)
            };

            if let Err(e) = result {
                // Roll the whole unit back.
                self.state = committed_state;
                self.executed.truncate(committed_len);
                return Err(e);
            }
            self.executed.push(operation.step());
        }

        if let Some((after, token)) = &self.cancel_after
            && self.executed.len() >= *after
        {
            token.cancel();
        }
        Ok(operations.len())
    }
}

pub fn construct(schema: &str, table: &str, name: &str, columns: &[&str]) -> UniqueConstruct {
    UniqueConstruct {
        table: Table::new(schema, table),
        name: name.to_string(),
        columns: columns.iter().map(|c| Column::key(*c)).collect(),
        backed_by_constraint: false,
        constraint_name: None,
        filter: None,
    }
}

pub fn foreign_key(
    name: &str,
    owning: Table,
    owning_columns: &[&str],
    referenced: Table,
    referenced_columns: &[&str],
) -> ForeignKey {
    ForeignKey {
        name: name.to_string(),
        owning_table: owning,
        owning_columns: owning_columns.iter().map(|c| c.to_string()).collect(),
        referenced_table: referenced,
        referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        on_delete: ReferentialAction::Cascade,
        on_update: ReferentialAction::NoAction,
    }
}

/// `SchemaA.TableA` with a unique index on `AltId`, referenced by
/// `SchemaB.TableB.TableAAltId`.
pub fn two_schema_state() -> SchemaState {
    let a = Table::new("SchemaA", "TableA");
    let b = Table::new("SchemaB", "TableB");
    SchemaState {
        tables: vec![a.clone(), b.clone()],
        unique_constructs: vec![construct("SchemaA", "TableA", "IX_TableA_AltId", &["AltId"])],
        foreign_keys: vec![foreign_key(
            "FK_TableB_TableA",
            b,
            &["TableAAltId"],
            a,
            &["AltId"],
        )],
        ..Default::default()
    }
}
