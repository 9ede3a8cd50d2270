//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! Every variable is prefixed with `OWNSPACE_`. List values are
//! comma-separated.

use crate::config::{
    AppRoleConfig, NamingConfig, RetrofitConfig, RowSecurityConfig, TableFilterConfig,
};
use crate::error::ConfigError;
use std::env;

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Loads configuration from environment variables. Unset variables leave the
/// corresponding field empty so lower-precedence sources still apply.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Backend: {}", config.backend());
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// - `OWNSPACE_BACKEND`: `postgres` or `sqlserver` (alias `mssql`)
/// - `OWNSPACE_DATABASE_URL`: connection string
/// - `OWNSPACE_TENANT_COLUMN`: tenant column name
/// - `OWNSPACE_SESSION_VARIABLE`: session variable name
/// - `OWNSPACE_POLICY_NAME`: row-security policy name
/// - `OWNSPACE_PREDICATE_FUNCTION`: SQL Server predicate function
/// - `OWNSPACE_APP_ROLE` / `OWNSPACE_APP_ROLE_PASSWORD`: PostgreSQL login to
///   provision (both or neither)
/// - `OWNSPACE_INCLUDE_SCHEMAS`, `OWNSPACE_EXCLUDE_SCHEMAS`
/// - `OWNSPACE_INCLUDE_TABLES`, `OWNSPACE_EXCLUDE_TABLES`
/// - `OWNSPACE_TABLE_PREFIXES`
/// - `OWNSPACE_STATEMENT_TIMEOUT_SECONDS`: per-statement timeout
pub fn load_from_env() -> Result<RetrofitConfig, ConfigError> {
    let config = RetrofitConfig {
        backend: parse_env("OWNSPACE_BACKEND")?,
        database_url: env::var("OWNSPACE_DATABASE_URL").ok(),
        naming: load_naming_from_env(),
        row_security: load_row_security_from_env()?,
        filter: load_filter_from_env(),
        statement_timeout_seconds: parse_env("OWNSPACE_STATEMENT_TIMEOUT_SECONDS")?,
    };

    Ok(config)
}

fn load_naming_from_env() -> NamingConfig {
    NamingConfig {
        tenant_column: env::var("OWNSPACE_TENANT_COLUMN").ok(),
        session_variable: env::var("OWNSPACE_SESSION_VARIABLE").ok(),
    }
}

fn load_row_security_from_env() -> Result<RowSecurityConfig, ConfigError> {
    let app_role = match (
        env::var("OWNSPACE_APP_ROLE").ok(),
        env::var("OWNSPACE_APP_ROLE_PASSWORD").ok(),
    ) {
        (Some(name), Some(password)) => Some(AppRoleConfig { name, password }),
        (None, None) => None,
        (Some(name), None) => {
            return Err(ConfigError::Env {
                key: "OWNSPACE_APP_ROLE_PASSWORD".to_string(),
                value: String::new(),
                reason: format!("required when OWNSPACE_APP_ROLE={name} is set"),
            });
        }
        (None, Some(_)) => {
            return Err(ConfigError::Env {
                key: "OWNSPACE_APP_ROLE".to_string(),
                value: String::new(),
                reason: "required when OWNSPACE_APP_ROLE_PASSWORD is set".to_string(),
            });
        }
    };

    Ok(RowSecurityConfig {
        policy_name: env::var("OWNSPACE_POLICY_NAME").ok(),
        predicate_function: env::var("OWNSPACE_PREDICATE_FUNCTION").ok(),
        app_role,
    })
}

fn load_filter_from_env() -> TableFilterConfig {
    TableFilterConfig {
        include_schemas: list_env("OWNSPACE_INCLUDE_SCHEMAS"),
        exclude_schemas: list_env("OWNSPACE_EXCLUDE_SCHEMAS"),
        include_tables: list_env("OWNSPACE_INCLUDE_TABLES"),
        exclude_tables: list_env("OWNSPACE_EXCLUDE_TABLES"),
        table_prefixes: list_env("OWNSPACE_TABLE_PREFIXES"),
    }
}

fn list_env(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(s) => s.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Env {
            key: key.to_string(),
            value: s.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use space_core::BackendKind;

    const KEYS: &[&str] = &[
        "OWNSPACE_BACKEND",
        "OWNSPACE_DATABASE_URL",
        "OWNSPACE_TENANT_COLUMN",
        "OWNSPACE_SESSION_VARIABLE",
        "OWNSPACE_POLICY_NAME",
        "OWNSPACE_PREDICATE_FUNCTION",
        "OWNSPACE_APP_ROLE",
        "OWNSPACE_APP_ROLE_PASSWORD",
        "OWNSPACE_INCLUDE_SCHEMAS",
        "OWNSPACE_EXCLUDE_SCHEMAS",
        "OWNSPACE_INCLUDE_TABLES",
        "OWNSPACE_EXCLUDE_TABLES",
        "OWNSPACE_TABLE_PREFIXES",
        "OWNSPACE_STATEMENT_TIMEOUT_SECONDS",
    ];

    fn clear_env() {
        for key in KEYS {
            unsafe {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_load_from_env_defaults() {
        clear_env();
        let config = load_from_env().unwrap();
        assert_eq!(config, RetrofitConfig::default());
        assert_eq!(config.backend(), BackendKind::Postgres);
    }

    #[test]
    #[serial]
    fn test_load_from_env_custom() {
        clear_env();
        unsafe {
            env::set_var("OWNSPACE_BACKEND", "MSSQL");
            env::set_var("OWNSPACE_DATABASE_URL", "server=tcp:db,1433");
            env::set_var("OWNSPACE_TENANT_COLUMN", "TenantKey");
            env::set_var("OWNSPACE_INCLUDE_SCHEMAS", "dbo, sales ,");
            env::set_var("OWNSPACE_STATEMENT_TIMEOUT_SECONDS", "90");
        }

        let config = load_from_env().unwrap();
        assert_eq!(config.backend(), BackendKind::SqlServer);
        assert_eq!(config.database_url.as_deref(), Some("server=tcp:db,1433"));
        assert_eq!(config.naming.tenant_column.as_deref(), Some("TenantKey"));
        assert_eq!(config.filter.include_schemas, vec!["dbo", "sales"]);
        assert_eq!(config.statement_timeout_seconds, Some(90));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_env_invalid_number() {
        clear_env();
        unsafe {
            env::set_var("OWNSPACE_STATEMENT_TIMEOUT_SECONDS", "soon");
        }

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "OWNSPACE_STATEMENT_TIMEOUT_SECONDS"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_from_env_app_role_pair() {
        clear_env();
        unsafe {
            env::set_var("OWNSPACE_APP_ROLE", "app_user");
        }
        assert!(load_from_env().is_err());

        unsafe {
            env::set_var("OWNSPACE_APP_ROLE_PASSWORD", "secret");
        }
        let config = load_from_env().unwrap();
        let role = config.row_security.app_role.unwrap();
        assert_eq!(role.name, "app_user");
        assert_eq!(role.password, "secret");

        clear_env();
    }
}
