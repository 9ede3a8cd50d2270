//! Seams between the tenant context and an arbitrary data-access layer.

use std::sync::Arc;

use async_trait::async_trait;
use errors::TenantError;

use crate::tenant::TenantId;

/// Read access to the tenant bound to a unit of work.
pub trait TenantContextAccessor: Send + Sync {
    fn current_tenant(&self) -> Result<TenantId, TenantError>;
}

impl<T: TenantContextAccessor + ?Sized> TenantContextAccessor for Arc<T> {
    fn current_tenant(&self) -> Result<TenantId, TenantError> {
        (**self).current_tenant()
    }
}

impl<T: TenantContextAccessor + ?Sized> TenantContextAccessor for &T {
    fn current_tenant(&self) -> Result<TenantId, TenantError> {
        (**self).current_tenant()
    }
}

/// Callback run by a data-access layer on every physical connection
/// acquisition, before the connection serves any caller query.
///
/// Pooled connections are reused across units of work, so the hook must run
/// on each acquisition and not only when the connection is first opened.
#[async_trait]
pub trait ConnectionHook<C: Send>: Send + Sync {
    async fn on_connection_acquired(
        &self,
        connection: &mut C,
        tenant: &dyn TenantContextAccessor,
    ) -> Result<(), TenantError>;
}

/// A data-access layer exposing a "connection acquired" event.
pub trait DataAccessLayer {
    type Connection: Send;

    fn register_connection_hook(&self, hook: Arc<dyn ConnectionHook<Self::Connection>>);
}
