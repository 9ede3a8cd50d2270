//! # OwnSpace Core
//!
//! Shared types and traits for the tenant retrofit engine.
//!
//! This crate provides:
//! - The catalog data model (tables, unique constructs, foreign keys)
//! - Composable table filters
//! - Tenant identity and the per-unit-of-work tenant context
//! - The seams a data-access layer implements to receive the tenant hook
//!
//! # Best Practices
//!
//! - Uses Rust Edition 2024
//! - Error types come from the `errors` crate (`thiserror`)

pub mod filter;
pub mod tenant;
pub mod traits;
pub mod types;

pub use filter::TableFilter;
pub use tenant::{TenantContext, TenantId};
pub use traits::{ConnectionHook, DataAccessLayer, TenantContextAccessor};
pub use types::{BackendKind, Column, ForeignKey, ReferentialAction, Table, UniqueConstruct};
