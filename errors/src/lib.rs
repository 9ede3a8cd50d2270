//! # OwnSpace Errors
//!
//! Error taxonomy for the tenant retrofit engine and the tenant-context
//! propagation layer.
//!
//! Follows Microsoft Pragmatic Rust Guidelines:
//! - Uses `thiserror` for structured error definitions
//! - Named fields in every message
//! - Driver errors are kept as boxed sources so callers can downcast them

use thiserror::Error;

/// Boxed driver error carried as the `source` of an engine error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the schema retrofit (`apply` / `plan`).
///
/// The engine never retries and never swallows: the first error aborts the
/// remaining steps and is returned to the caller unchanged.
#[derive(Debug, Error)]
pub enum RetrofitError {
    #[error("Connection to {backend} failed: {source}")]
    Connection {
        backend: String,
        #[source]
        source: BoxError,
    },

    #[error("Catalog query {operation} on {backend} failed: {source}")]
    Catalog {
        backend: String,
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error(
        "Foreign key {foreign_key} on table {owning_table} references table {referenced_table} \
         but the owning table is outside of the provided filter"
    )]
    ScopeViolation {
        foreign_key: String,
        owning_table: String,
        referenced_table: String,
    },

    #[error("DDL step {step} failed executing `{statement}`: {source}")]
    DdlExecution {
        step: String,
        statement: String,
        #[source]
        source: BoxError,
    },

    #[error("Operation {operation} was cancelled")]
    Cancelled { operation: String },

    #[error("Operation {operation} timed out after {timeout_ms}ms")]
    TimedOut { operation: String, timeout_ms: u64 },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    TenantContext(#[from] TenantError),
}

impl RetrofitError {
    /// Wraps a driver error raised while reading the system catalog.
    pub fn catalog(
        backend: impl Into<String>,
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Catalog {
            backend: backend.into(),
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Wraps a driver error raised while executing one DDL statement.
    pub fn ddl(
        step: impl Into<String>,
        statement: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::DdlExecution {
            step: step.into(),
            statement: statement.into(),
            source: source.into(),
        }
    }

    pub fn connection(backend: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            backend: backend.into(),
            source: source.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True for errors that a full re-run of `apply` is expected to recover
    /// from once the underlying condition is fixed.
    pub fn is_recoverable_by_rerun(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::DdlExecution { .. }
                | Self::Cancelled { .. }
                | Self::TimedOut { .. }
        )
    }
}

/// Errors raised while binding a tenant to a physical connection.
#[derive(Debug, Error)]
pub enum TenantError {
    /// A connection was requested without any tenant bound in scope. This is
    /// a programming error in the caller.
    #[error("No tenant id is bound to the current unit of work")]
    ContextMissing,

    /// A connection was requested from a data-access layer with no tenant
    /// hook registered, so it would still carry its previous session.
    #[error("No connection hook is registered; call register_connection_hook first")]
    HookMissing,

    #[error("Invalid tenant id: {value}")]
    InvalidTenantId { value: String },

    #[error("Setting the tenant session variable on {backend} failed: {source}")]
    SessionVariable {
        backend: String,
        #[source]
        source: BoxError,
    },

    #[error("Acquiring a connection from the pool failed: {source}")]
    Acquire {
        #[source]
        source: BoxError,
    },
}
