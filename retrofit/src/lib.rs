//! # Tenant Retrofit Engine
//!
//! Retrofits tenant isolation onto an existing relational schema and binds
//! each pooled connection to the tenant of the unit of work using it.
//!
//! - [`catalog`]: reads tables, unique constructs and foreign keys
//! - [`planner`]: decides what to widen and which foreign keys to rebuild
//! - [`dialect`]: typed DDL per backend
//! - [`orchestrator`]: [`apply`] / [`plan`] and the ordering protocol
//! - [`hook`]: the connection-open hook and [`register_connection_hook`]
//! - [`postgres`]: `sqlx` backend and the tenant-aware pool
//! - `sqlserver` (feature `sqlserver`): `tiberius` backend

pub mod backend;
pub mod catalog;
pub mod dialect;
pub mod guard;
pub mod hook;
pub mod orchestrator;
pub mod planner;
pub mod postgres;
#[cfg(feature = "sqlserver")]
pub mod sqlserver;

pub use backend::{DdlOperation, SchemaBackend};
pub use catalog::{CatalogReader, CatalogSnapshot, ForeignKeyColumnRow, UniqueColumnRow};
pub use dialect::{DdlDialect, PostgresDialect, SqlServerDialect};
pub use guard::StatementGuard;
pub use hook::{HookRegistry, TenantSessionHook, register_connection_hook};
pub use orchestrator::{
    Batch, ConnectionTarget, REBUILD_BATCH, Retrofit, RetrofitReport, apply,
    apply_with_cancellation, plan, schedule, schedule_batches,
};
pub use planner::{RetrofitPlan, plan_retrofit};
pub use postgres::{PostgresBackend, TenantPool, UnitOfWork};
