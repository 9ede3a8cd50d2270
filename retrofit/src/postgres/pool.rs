//! Tenant-aware PostgreSQL pool.
//!
//! [`TenantPool`] is a [`DataAccessLayer`] over `sqlx::PgPool`: every
//! [`TenantPool::acquire`] runs the registered hooks on the checked-out
//! connection before handing it back, so a connection reused from the pool
//! never carries the previous tenant's session variable into a new query.

use std::sync::Arc;
use std::time::Duration;

use errors::TenantError;
use space_core::{
    ConnectionHook, DataAccessLayer, TenantContext, TenantContextAccessor, TenantId,
};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::Instrument;

use crate::hook::HookRegistry;

#[derive(Clone)]
pub struct TenantPool {
    pool: PgPool,
    hooks: Arc<HookRegistry<PgConnection>>,
}

impl TenantPool {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, TenantError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| TenantError::Acquire {
                source: Box::new(e),
            })?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Checks a connection out and binds it to the tenant of `tenant`.
    ///
    /// A hook failure drops the connection and is returned as is, so a caller
    /// without a bound tenant gets [`TenantError::ContextMissing`] instead of
    /// a connection. A pool with no hook registered refuses with
    /// [`TenantError::HookMissing`].
    pub async fn acquire(
        &self,
        tenant: &dyn TenantContextAccessor,
    ) -> Result<PoolConnection<Postgres>, TenantError> {
        // Fail before touching the pool when nothing would bind the tenant.
        tenant.current_tenant()?;
        self.hooks.ensure_registered()?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| TenantError::Acquire {
                source: Box::new(e),
            })?;

        self.hooks.run_all(&mut *conn, tenant).await?;
        Ok(conn)
    }

    /// Starts a unit of work acting for `context`.
    pub fn unit_of_work(&self, context: TenantContext) -> UnitOfWork {
        let span = match context.tenant_id() {
            Some(tenant_id) => tracing::info_span!("unit_of_work", tenant_id = %tenant_id),
            None => tracing::info_span!("unit_of_work", tenant_id = tracing::field::Empty),
        };
        UnitOfWork {
            pool: self.clone(),
            context,
            span,
        }
    }
}

impl DataAccessLayer for TenantPool {
    type Connection = PgConnection;

    fn register_connection_hook(&self, hook: Arc<dyn ConnectionHook<PgConnection>>) {
        self.hooks.register(hook);
    }
}

/// One logical unit of work bound to a single tenant.
///
/// Connections acquired through it carry its tenant; its span tags every log
/// line emitted inside with `tenant_id`.
pub struct UnitOfWork {
    pool: TenantPool,
    context: TenantContext,
    span: tracing::Span,
}

impl UnitOfWork {
    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn tenant_id(&self) -> Result<TenantId, TenantError> {
        self.context.current()
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, TenantError> {
        self.pool
            .acquire(&self.context)
            .instrument(self.span.clone())
            .await
    }
}
