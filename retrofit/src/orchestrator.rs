//! # Retrofit Orchestrator
//!
//! Runs a retrofit end to end: read the catalog, plan, then issue the
//! primitives in a fixed order:
//!
//! 1. ensure the application role (when configured)
//! 2. add the tenant column and its default on every target table
//! 3. drop every foreign key that will be rebuilt
//! 4. widen every unique construct
//! 5. recreate the dropped foreign keys with the tenant column appended
//! 6. reinstall row security over the target tables
//!
//! Steps 3 to 5 commit as one unit: a failure or cancellation inside them
//! rolls every drop, widen and recreate back, so no foreign key is ever left
//! dropped. Every other primitive commits on its own.
//!
//! The first error aborts the run. Committed steps stay applied and a full
//! re-run is the recovery path, since every primitive is idempotent.

use std::time::Instant;

use config::RetrofitOptions;
use errors::RetrofitError;
use serde::Serialize;
use space_core::{BackendKind, Table, TableFilter};
use tokio_util::sync::CancellationToken;

use crate::backend::{DdlOperation, SchemaBackend};
use crate::catalog::{CatalogReader, CatalogSnapshot};
use crate::guard::StatementGuard;
use crate::planner::{RetrofitPlan, plan_retrofit};

/// Where to run a retrofit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub backend: BackendKind,
    pub connection_string: String,
}

impl ConnectionTarget {
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Postgres,
            connection_string: url.into(),
        }
    }

    pub fn sqlserver(connection_string: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::SqlServer,
            connection_string: connection_string.into(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrofitReport {
    pub tables_retrofitted: Vec<Table>,
    pub constructs_widened: Vec<String>,
    pub constructs_already_widened: Vec<String>,
    pub foreign_keys_rebuilt: Vec<String>,
    pub statements_executed: usize,
    pub duration_ms: u64,
}

/// Primitives that commit together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub label: &'static str,
    pub operations: Vec<DdlOperation>,
}

impl Batch {
    fn single(operation: DdlOperation) -> Self {
        Self {
            label: operation.step(),
            operations: vec![operation],
        }
    }
}

/// Label of the unit that drops, widens and recreates.
pub const REBUILD_BATCH: &str = "rebuild_unique_constructs";

/// Orders the primitives for `plan` and groups them into commit units.
pub fn schedule_batches(plan: &RetrofitPlan, options: &RetrofitOptions) -> Vec<Batch> {
    let mut batches = Vec::new();

    if let Some(role) = &options.app_role {
        batches.push(Batch::single(DdlOperation::EnsureApplicationRole(role.clone())));
    }

    for table in &plan.target_tables {
        batches.push(Batch::single(DdlOperation::AddTenantColumn(table.clone())));
        batches.push(Batch::single(DdlOperation::SetTenantColumnDefault(table.clone())));
    }

    let mut rebuild: Vec<DdlOperation> = plan
        .foreign_keys_to_rebuild
        .iter()
        .cloned()
        .map(DdlOperation::DropForeignKey)
        .collect();
    rebuild.extend(
        plan.constructs_to_widen
            .iter()
            .cloned()
            .map(DdlOperation::WidenUniqueConstruct),
    );
    rebuild.extend(
        plan.foreign_keys_to_rebuild
            .iter()
            .cloned()
            .map(DdlOperation::RecreateForeignKey),
    );
    if !rebuild.is_empty() {
        batches.push(Batch {
            label: REBUILD_BATCH,
            operations: rebuild,
        });
    }

    batches.push(Batch::single(DdlOperation::InstallRowSecurity(
        plan.target_tables.clone(),
    )));
    batches
}

/// Orders the primitives for `plan`.
pub fn schedule(plan: &RetrofitPlan, options: &RetrofitOptions) -> Vec<DdlOperation> {
    schedule_batches(plan, options)
        .into_iter()
        .flat_map(|batch| batch.operations)
        .collect()
}

/// Retrofit engine over a connection the caller already owns.
pub struct Retrofit<B: SchemaBackend> {
    backend: B,
    options: RetrofitOptions,
    guard: StatementGuard,
}

impl<B: SchemaBackend> Retrofit<B> {
    pub fn new(backend: B, options: RetrofitOptions) -> Result<Self, RetrofitError> {
        options
            .check()
            .map_err(|e| RetrofitError::configuration(e.to_string()))?;
        if options.backend != backend.kind() {
            return Err(RetrofitError::configuration(format!(
                "options are for {} but the connection is {}",
                options.backend,
                backend.kind()
            )));
        }

        let guard = StatementGuard::with_timeout(options.statement_timeout);
        Ok(Self {
            backend,
            options,
            guard,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.guard = StatementGuard::new(token, self.options.statement_timeout);
        self
    }

    pub fn options(&self) -> &RetrofitOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub async fn snapshot(&mut self) -> Result<CatalogSnapshot, RetrofitError> {
        CatalogReader::new(&mut self.backend, &self.guard)
            .snapshot()
            .await
    }

    /// Reads the catalog and plans without issuing any DDL.
    #[tracing::instrument(skip_all, fields(backend = %self.backend.kind()))]
    pub async fn plan(&mut self, filter: &TableFilter) -> Result<RetrofitPlan, RetrofitError> {
        let snapshot = self.snapshot().await?;
        plan_retrofit(&snapshot, filter, &self.options.tenant_column)
    }

    /// Runs the full retrofit.
    #[tracing::instrument(skip_all, fields(backend = %self.backend.kind()))]
    pub async fn apply(&mut self, filter: &TableFilter) -> Result<RetrofitReport, RetrofitError> {
        let started = Instant::now();
        let plan = self.plan(filter).await?;

        tracing::info!(
            tables = plan.target_tables.len(),
            constructs_to_widen = plan.constructs_to_widen.len(),
            already_widened = plan.already_widened.len(),
            foreign_keys_to_rebuild = plan.foreign_keys_to_rebuild.len(),
            "Retrofit planned"
        );

        let mut statements_executed = 0;
        let mut current_step = "";
        for batch in schedule_batches(&plan, &self.options) {
            for operation in &batch.operations {
                let step = operation.step();
                if step != current_step {
                    tracing::info!(step, "Retrofit step started");
                    current_step = step;
                }
                tracing::debug!(step, target = %operation.target(), "Scheduling primitive");
            }

            statements_executed += self
                .guard
                .run(
                    batch.label,
                    self.backend.execute_atomic(&batch.operations, &self.options),
                )
                .await?;
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics::histogram!("ownspace_apply_duration_ms").record(duration_ms as f64);

        let report = RetrofitReport {
            tables_retrofitted: plan.target_tables,
            constructs_widened: plan
                .constructs_to_widen
                .iter()
                .map(|c| format!("{}.{}", c.table, c.object_name()))
                .collect(),
            constructs_already_widened: plan
                .already_widened
                .iter()
                .map(|c| format!("{}.{}", c.table, c.object_name()))
                .collect(),
            foreign_keys_rebuilt: plan
                .foreign_keys_to_rebuild
                .iter()
                .map(|fk| format!("{}.{}", fk.owning_table, fk.name))
                .collect(),
            statements_executed,
            duration_ms,
        };

        tracing::info!(
            tables = report.tables_retrofitted.len(),
            constructs_widened = report.constructs_widened.len(),
            foreign_keys_rebuilt = report.foreign_keys_rebuilt.len(),
            statements = report.statements_executed,
            duration_ms,
            "Retrofit applied"
        );

        Ok(report)
    }
}

fn check_target(target: &ConnectionTarget, options: &RetrofitOptions) -> Result<(), RetrofitError> {
    if target.backend != options.backend {
        return Err(RetrofitError::configuration(format!(
            "connection target is {} but options are for {}",
            target.backend, options.backend
        )));
    }
    Ok(())
}

/// Connects to `target` and runs the full retrofit for `filter`.
pub async fn apply(
    target: &ConnectionTarget,
    filter: &TableFilter,
    options: &RetrofitOptions,
) -> Result<RetrofitReport, RetrofitError> {
    apply_with_cancellation(target, filter, options, CancellationToken::new()).await
}

/// [`apply`], stopping before the next catalog read or primitive once
/// `token` fires.
pub async fn apply_with_cancellation(
    target: &ConnectionTarget,
    filter: &TableFilter,
    options: &RetrofitOptions,
    token: CancellationToken,
) -> Result<RetrofitReport, RetrofitError> {
    check_target(target, options)?;
    match target.backend {
        BackendKind::Postgres => {
            let backend = crate::postgres::PostgresBackend::connect(&target.connection_string).await?;
            Retrofit::new(backend, options.clone())?
                .with_cancellation(token)
                .apply(filter)
                .await
        }
        BackendKind::SqlServer => apply_sqlserver(target, filter, options, token).await,
    }
}

/// Connects to `target` and returns the plan without changing the schema.
pub async fn plan(
    target: &ConnectionTarget,
    filter: &TableFilter,
    options: &RetrofitOptions,
) -> Result<RetrofitPlan, RetrofitError> {
    check_target(target, options)?;
    match target.backend {
        BackendKind::Postgres => {
            let backend = crate::postgres::PostgresBackend::connect(&target.connection_string).await?;
            Retrofit::new(backend, options.clone())?.plan(filter).await
        }
        BackendKind::SqlServer => plan_sqlserver(target, filter, options).await,
    }
}

#[cfg(feature = "sqlserver")]
async fn apply_sqlserver(
    target: &ConnectionTarget,
    filter: &TableFilter,
    options: &RetrofitOptions,
    token: CancellationToken,
) -> Result<RetrofitReport, RetrofitError> {
    let backend = crate::sqlserver::SqlServerBackend::connect(&target.connection_string).await?;
    Retrofit::new(backend, options.clone())?
        .with_cancellation(token)
        .apply(filter)
        .await
}

#[cfg(feature = "sqlserver")]
async fn plan_sqlserver(
    target: &ConnectionTarget,
    filter: &TableFilter,
    options: &RetrofitOptions,
) -> Result<RetrofitPlan, RetrofitError> {
    let backend = crate::sqlserver::SqlServerBackend::connect(&target.connection_string).await?;
    Retrofit::new(backend, options.clone())?.plan(filter).await
}

#[cfg(not(feature = "sqlserver"))]
async fn apply_sqlserver(
    _target: &ConnectionTarget,
    _filter: &TableFilter,
    _options: &RetrofitOptions,
    _token: CancellationToken,
) -> Result<RetrofitReport, RetrofitError> {
    Err(sqlserver_disabled())
}

#[cfg(not(feature = "sqlserver"))]
async fn plan_sqlserver(
    _target: &ConnectionTarget,
    _filter: &TableFilter,
    _options: &RetrofitOptions,
) -> Result<RetrofitPlan, RetrofitError> {
    Err(sqlserver_disabled())
}

#[cfg(not(feature = "sqlserver"))]
fn sqlserver_disabled() -> RetrofitError {
    RetrofitError::configuration("SQL Server support requires the `sqlserver` feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use space_core::{Column, ForeignKey, ReferentialAction, UniqueConstruct};

    fn sample_plan() -> RetrofitPlan {
        let a = Table::new("public", "a");
        let b = Table::new("public", "b");
        RetrofitPlan {
            target_tables: vec![a.clone(), b.clone()],
            constructs_to_widen: vec![UniqueConstruct {
                table: a.clone(),
                name: "ix_a_alt".to_string(),
                columns: vec![Column::key("alt")],
                backed_by_constraint: false,
                constraint_name: None,
                filter: None,
            }],
            already_widened: vec![],
            foreign_keys_to_rebuild: vec![ForeignKey {
                name: "fk_b_a".to_string(),
                owning_table: b,
                owning_columns: vec!["a_alt".to_string()],
                referenced_table: a,
                referenced_columns: vec!["alt".to_string()],
                on_delete: ReferentialAction::NoAction,
                on_update: ReferentialAction::NoAction,
            }],
        }
    }

    #[test]
    fn test_schedule_order() {
        let options = RetrofitOptions::postgres().with_app_role("app", "pw");
        let steps: Vec<&str> = schedule(&sample_plan(), &options)
            .iter()
            .map(DdlOperation::step)
            .collect();

        assert_eq!(
            steps,
            vec![
                "ensure_application_role",
                "add_tenant_column",
                "set_tenant_column_default",
                "add_tenant_column",
                "set_tenant_column_default",
                "drop_foreign_key",
                "widen_unique_construct",
                "recreate_foreign_key",
                "install_row_security",
            ]
        );
    }

    #[test]
    fn test_rebuild_steps_share_one_batch() {
        let batches = schedule_batches(&sample_plan(), &RetrofitOptions::postgres());
        let labels: Vec<&str> = batches.iter().map(|b| b.label).collect();
        assert_eq!(
            labels,
            vec![
                "add_tenant_column",
                "set_tenant_column_default",
                "add_tenant_column",
                "set_tenant_column_default",
                REBUILD_BATCH,
                "install_row_security",
            ]
        );

        let rebuild: Vec<&str> = batches[4].operations.iter().map(DdlOperation::step).collect();
        assert_eq!(
            rebuild,
            vec!["drop_foreign_key", "widen_unique_construct", "recreate_foreign_key"]
        );
    }

    #[test]
    fn test_schedule_without_role_or_work() {
        let plan = RetrofitPlan::default();
        let operations = schedule(&plan, &RetrofitOptions::postgres());
        assert_eq!(operations, vec![DdlOperation::InstallRowSecurity(vec![])]);
    }

    #[test]
    fn test_target_must_match_options() {
        let target = ConnectionTarget::sqlserver("server=tcp:localhost,1433");
        let err = check_target(&target, &RetrofitOptions::postgres()).unwrap_err();
        assert!(matches!(err, RetrofitError::Configuration { .. }));
    }

    #[test]
    fn test_report_serializes() {
        let report = RetrofitReport {
            tables_retrofitted: vec![Table::new("public", "a")],
            statements_executed: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["statements_executed"], 3);
        assert_eq!(json["tables_retrofitted"][0]["name"], "a");
    }
}
