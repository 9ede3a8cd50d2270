//! Tenant identity and the per-unit-of-work context that carries it.
//!
//! A [`TenantContext`] is created once per logical unit of work (a request,
//! a task, a job) and passed explicitly to whatever acquires connections on
//! that unit's behalf. There is no global or thread-local "current tenant".

use errors::TenantError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::traits::TenantContextAccessor;

/// Opaque 128-bit tenant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Generates a fresh, globally unique tenant id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for TenantId {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| TenantError::InvalidTenantId {
                value: s.to_string(),
            })
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Holder of the tenant a unit of work acts for.
///
/// A context may be empty: asking an empty context for its tenant yields
/// [`TenantError::ContextMissing`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: Option<TenantId>,
}

impl TenantContext {
    /// Starts a unit of work for a brand-new tenant.
    pub fn new() -> Self {
        Self {
            tenant_id: Some(TenantId::generate()),
        }
    }

    /// Starts a unit of work acting for an existing tenant.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
        }
    }

    /// A context with no tenant bound.
    pub fn empty() -> Self {
        Self { tenant_id: None }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// The tenant bound to this unit of work.
    pub fn current(&self) -> Result<TenantId, TenantError> {
        self.tenant_id.ok_or(TenantError::ContextMissing)
    }

    pub fn is_bound(&self) -> bool {
        self.tenant_id.is_some()
    }
}

impl From<TenantId> for TenantContext {
    fn from(tenant_id: TenantId) -> Self {
        Self::for_tenant(tenant_id)
    }
}

impl TenantContextAccessor for TenantContext {
    fn current_tenant(&self) -> Result<TenantId, TenantError> {
        self.current()
    }
}
