//! # Connection-Open Hook
//!
//! Binds the tenant of a unit of work to the physical connection serving it.
//! Pools hand the same physical connection to many units of work, so the
//! hook runs on every acquisition, before the caller sees the connection.

use std::sync::Arc;

use async_trait::async_trait;
use errors::TenantError;
use parking_lot::RwLock;
use space_core::{ConnectionHook, DataAccessLayer, TenantContextAccessor};
use sqlx::PgConnection;

use crate::dialect::PostgresDialect;

/// Sets the session-scoped tenant variable on each acquired connection.
///
/// The variable name must match the one baked into the tenant column default
/// and the row-security predicate, otherwise every row is filtered out.
#[derive(Debug, Clone)]
pub struct TenantSessionHook {
    variable: String,
}

impl TenantSessionHook {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
}

fn record_outcome(result: &Result<(), TenantError>, backend: &'static str) {
    let outcome = match result {
        Ok(()) => "ok",
        Err(TenantError::ContextMissing) => "missing_context",
        Err(_) => "error",
    };
    metrics::counter!("ownspace_tenant_hook_total", "outcome" => outcome, "backend" => backend)
        .increment(1);
    if let Err(e) = result {
        tracing::warn!(backend, error = %e, "Tenant session hook failed");
    }
}

#[async_trait]
impl ConnectionHook<PgConnection> for TenantSessionHook {
    async fn on_connection_acquired(
        &self,
        connection: &mut PgConnection,
        tenant: &dyn TenantContextAccessor,
    ) -> Result<(), TenantError> {
        let result = async {
            let tenant_id = tenant.current_tenant()?;
            sqlx::query(PostgresDialect::SESSION_VARIABLE_STATEMENT)
                .bind(&self.variable)
                .bind(tenant_id.to_string())
                .execute(&mut *connection)
                .await
                .map_err(|e| TenantError::SessionVariable {
                    backend: "postgres".to_string(),
                    source: Box::new(e),
                })?;
            tracing::trace!(tenant_id = %tenant_id, variable = %self.variable, "Tenant bound to connection");
            Ok::<(), TenantError>(())
        }
        .await;

        record_outcome(&result, "postgres");
        result
    }
}

#[cfg(feature = "sqlserver")]
#[async_trait]
impl ConnectionHook<crate::sqlserver::SqlServerClient> for TenantSessionHook {
    async fn on_connection_acquired(
        &self,
        connection: &mut crate::sqlserver::SqlServerClient,
        tenant: &dyn TenantContextAccessor,
    ) -> Result<(), TenantError> {
        let result = async {
            let tenant_id = tenant.current_tenant()?;
            connection
                .execute(
                    crate::dialect::SqlServerDialect::SESSION_VARIABLE_STATEMENT,
                    &[&self.variable, tenant_id.as_uuid()],
                )
                .await
                .map_err(|e| TenantError::SessionVariable {
                    backend: "sqlserver".to_string(),
                    source: Box::new(e),
                })?;
            Ok::<(), TenantError>(())
        }
        .await;

        record_outcome(&result, "sqlserver");
        result
    }
}

/// Hooks registered with one data-access layer.
pub struct HookRegistry<C: Send> {
    hooks: RwLock<Vec<Arc<dyn ConnectionHook<C>>>>,
}

impl<C: Send> HookRegistry<C> {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, hook: Arc<dyn ConnectionHook<C>>) {
        self.hooks.write().push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Fails when nothing would bind a tenant to an acquired connection.
    pub fn ensure_registered(&self) -> Result<(), TenantError> {
        if self.is_empty() {
            return Err(TenantError::HookMissing);
        }
        Ok(())
    }

    /// Runs every hook in registration order, stopping at the first failure.
    pub async fn run_all(
        &self,
        connection: &mut C,
        tenant: &dyn TenantContextAccessor,
    ) -> Result<(), TenantError> {
        // Never hold the lock across an await.
        let hooks: Vec<Arc<dyn ConnectionHook<C>>> = self.hooks.read().clone();
        for hook in hooks {
            hook.on_connection_acquired(connection, tenant).await?;
        }
        Ok(())
    }
}

impl<C: Send> Default for HookRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wires a [`TenantSessionHook`] for `session_variable` into `dal`.
///
/// The tenant itself is not captured here: each acquisition supplies the
/// accessor of the unit of work it serves.
pub fn register_connection_hook<D>(dal: &D, session_variable: impl Into<String>)
where
    D: DataAccessLayer,
    TenantSessionHook: ConnectionHook<D::Connection>,
{
    let hook = TenantSessionHook::new(session_variable);
    tracing::info!(variable = %hook.variable(), "Registering tenant session hook");
    dal.register_connection_hook(Arc::new(hook));
}
