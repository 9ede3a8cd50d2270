//! # Configuration System
//!
//! Configuration management for the tenant retrofit engine.
//!
//! This crate provides:
//! - The retrofit configuration structures and their resolved form,
//!   [`RetrofitOptions`]
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (CLI > env > file > defaults)
//! - Backend-aware validation
//!
//! # Best Practices
//!
//! - Uses `validator` crate for input validation
//! - Follows 12-factor app configuration principles
//! - Provides clear error messages for invalid configuration

pub mod config;
pub mod error;
pub mod file_loader;
pub mod loader;
pub mod precedence;

pub use config::{
    AppRoleConfig, MSSQL_POLICY_NAME, MSSQL_PREDICATE_FUNCTION, MSSQL_SESSION_VARIABLE,
    MSSQL_TENANT_COLUMN, NamingConfig, PG_POLICY_NAME, PG_SESSION_VARIABLE, PG_TENANT_COLUMN,
    RetrofitConfig, RetrofitOptions, RowSecurityConfig, TableFilterConfig,
};
pub use error::ConfigError;
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use precedence::merge_configs;
pub use validator::Validate;
