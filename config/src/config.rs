//! # Configuration Structures
//!
//! This module defines the configuration of a tenant retrofit run.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for input validation
//! - Keep every field optional on the wire so file, environment and CLI
//!   sources can be layered (see [`crate::merge_configs`])

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use space_core::{BackendKind, TableFilter};
use validator::Validate;

use crate::error::ConfigError;

/// PostgreSQL defaults.
pub const PG_TENANT_COLUMN: &str = "own_space_id";
pub const PG_SESSION_VARIABLE: &str = "app.own_space_id";
pub const PG_POLICY_NAME: &str = "ownspacepolicy";

/// SQL Server defaults.
pub const MSSQL_TENANT_COLUMN: &str = "OwnSpaceId";
pub const MSSQL_SESSION_VARIABLE: &str = "OwnSpaceId";
pub const MSSQL_POLICY_NAME: &str = "dbo.OwnSpacePolicy";
pub const MSSQL_PREDICATE_FUNCTION: &str = "dbo.fn_get_own_space_id";

const PG_MAX_IDENTIFIER: usize = 63;

const PG_CUSTOM_SETTING: &str = r"^[A-Za-z_][A-Za-z0-9_$]*\.[A-Za-z_][A-Za-z0-9_$]*$";

fn is_custom_setting_name(name: &str) -> bool {
    Regex::new(PG_CUSTOM_SETTING)
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Main configuration structure for a retrofit run.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Aggregates the connection target, tenant naming, row-security settings and
/// the table filter.
///
/// ## Usage
/// ```rust,no_run
/// use config::RetrofitConfig;
///
/// let config = RetrofitConfig::default();
/// let options = config.options().unwrap();
/// assert_eq!(options.tenant_column, "own_space_id");
/// ```
///
/// ## Validation
/// Nested structures validate their own fields; [`RetrofitConfig::options`]
/// additionally applies backend-specific rules to the resolved names.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct RetrofitConfig {
    /// Relational backend (default: postgres)
    #[serde(default)]
    pub backend: Option<BackendKind>,

    /// Connection string (PostgreSQL URL or SQL Server ADO string)
    #[serde(default)]
    #[validate(length(min = 1))]
    pub database_url: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub naming: NamingConfig,

    #[serde(default)]
    #[validate(nested)]
    pub row_security: RowSecurityConfig,

    #[serde(default)]
    pub filter: TableFilterConfig,

    /// Per-statement timeout applied to catalog reads and DDL
    #[serde(default)]
    #[validate(range(min = 1, max = 3600))]
    pub statement_timeout_seconds: Option<u64>,
}

impl RetrofitConfig {
    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or_default()
    }

    /// Resolves backend defaults and validates the result.
    pub fn options(&self) -> Result<RetrofitOptions, ConfigError> {
        self.validate()?;

        let mut options = RetrofitOptions::for_backend(self.backend());
        if let Some(column) = &self.naming.tenant_column {
            options.tenant_column.clone_from(column);
        }
        if let Some(variable) = &self.naming.session_variable {
            options.session_variable.clone_from(variable);
        }
        if let Some(policy) = &self.row_security.policy_name {
            options.policy_name.clone_from(policy);
        }
        if let Some(function) = &self.row_security.predicate_function {
            options.predicate_function.clone_from(function);
        }
        options.app_role = self.row_security.app_role.clone();
        options.statement_timeout = self.statement_timeout_seconds.map(Duration::from_secs);

        options.check()?;
        Ok(options)
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing {
                field: "database_url".to_string(),
            })
    }
}

/// Tenant column and session variable names.
///
/// ## Fields
/// - `tenant_column`: column added to every target table
/// - `session_variable`: connection-scoped variable read by the column
///   default, the row-security predicate and the connection hook
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct NamingConfig {
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub tenant_column: Option<String>,

    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub session_variable: Option<String>,
}

/// Row-security policy settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct RowSecurityConfig {
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub policy_name: Option<String>,

    /// SQL Server only: inline table-valued predicate function
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub predicate_function: Option<String>,

    /// PostgreSQL only: application login the policy is restricted to
    #[serde(default)]
    #[validate(nested)]
    pub app_role: Option<AppRoleConfig>,
}

/// Application login provisioned with `NOBYPASSRLS`.
#[derive(Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct AppRoleConfig {
    #[validate(length(min = 1, max = 63))]
    pub name: String,

    #[validate(length(min = 1))]
    pub password: String,
}

impl std::fmt::Debug for AppRoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRoleConfig")
            .field("name", &self.name)
            .field("password", &"***")
            .finish()
    }
}

/// Declarative table filter.
///
/// Empty include lists mean "every table". Table entries are either
/// `table` or `schema.table`. All comparisons ignore case.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TableFilterConfig {
    #[serde(default)]
    pub include_schemas: Vec<String>,

    #[serde(default)]
    pub exclude_schemas: Vec<String>,

    #[serde(default)]
    pub include_tables: Vec<String>,

    #[serde(default)]
    pub exclude_tables: Vec<String>,

    #[serde(default)]
    pub table_prefixes: Vec<String>,
}

impl TableFilterConfig {
    pub fn is_empty(&self) -> bool {
        self.include_schemas.is_empty()
            && self.exclude_schemas.is_empty()
            && self.include_tables.is_empty()
            && self.exclude_tables.is_empty()
            && self.table_prefixes.is_empty()
    }

    pub fn to_filter(&self) -> TableFilter {
        let mut parts = Vec::new();

        if !self.include_schemas.is_empty() {
            parts.push(TableFilter::any(
                self.include_schemas
                    .iter()
                    .map(TableFilter::schema_equals)
                    .collect(),
            ));
        }
        if !self.exclude_schemas.is_empty() {
            parts.push(!TableFilter::any(
                self.exclude_schemas
                    .iter()
                    .map(TableFilter::schema_equals)
                    .collect(),
            ));
        }
        if !self.include_tables.is_empty() {
            parts.push(TableFilter::any(
                self.include_tables.iter().map(|t| table_entry(t)).collect(),
            ));
        }
        if !self.exclude_tables.is_empty() {
            parts.push(!TableFilter::any(
                self.exclude_tables.iter().map(|t| table_entry(t)).collect(),
            ));
        }
        if !self.table_prefixes.is_empty() {
            parts.push(TableFilter::any(
                self.table_prefixes
                    .iter()
                    .map(TableFilter::name_starts_with)
                    .collect(),
            ));
        }

        TableFilter::all(parts)
    }
}

fn table_entry(entry: &str) -> TableFilter {
    match entry.split_once('.') {
        Some((schema, name)) => {
            TableFilter::schema_equals(schema).and(TableFilter::name_equals(name))
        }
        None => TableFilter::name_equals(entry),
    }
}

/// Resolved, validated options handed to the retrofit engine.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct RetrofitOptions {
    pub backend: BackendKind,

    #[validate(length(min = 1, max = 128))]
    pub tenant_column: String,

    #[validate(length(min = 1, max = 128))]
    pub session_variable: String,

    #[validate(length(min = 1, max = 128))]
    pub policy_name: String,

    #[validate(length(min = 1, max = 128))]
    pub predicate_function: String,

    #[validate(nested)]
    pub app_role: Option<AppRoleConfig>,

    pub statement_timeout: Option<Duration>,
}

impl RetrofitOptions {
    pub fn postgres() -> Self {
        Self {
            backend: BackendKind::Postgres,
            tenant_column: PG_TENANT_COLUMN.to_string(),
            session_variable: PG_SESSION_VARIABLE.to_string(),
            policy_name: PG_POLICY_NAME.to_string(),
            predicate_function: String::from("own_space_predicate"),
            app_role: None,
            statement_timeout: None,
        }
    }

    pub fn sqlserver() -> Self {
        Self {
            backend: BackendKind::SqlServer,
            tenant_column: MSSQL_TENANT_COLUMN.to_string(),
            session_variable: MSSQL_SESSION_VARIABLE.to_string(),
            policy_name: MSSQL_POLICY_NAME.to_string(),
            predicate_function: MSSQL_PREDICATE_FUNCTION.to_string(),
            app_role: None,
            statement_timeout: None,
        }
    }

    pub fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Postgres => Self::postgres(),
            BackendKind::SqlServer => Self::sqlserver(),
        }
    }

    pub fn with_tenant_column(mut self, column: impl Into<String>) -> Self {
        self.tenant_column = column.into();
        self
    }

    pub fn with_session_variable(mut self, variable: impl Into<String>) -> Self {
        self.session_variable = variable.into();
        self
    }

    pub fn with_app_role(mut self, name: impl Into<String>, password: impl Into<String>) -> Self {
        self.app_role = Some(AppRoleConfig {
            name: name.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Field validation plus the rules that depend on the backend.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        for (field, value) in [
            ("tenant_column", &self.tenant_column),
            ("session_variable", &self.session_variable),
            ("policy_name", &self.policy_name),
            ("predicate_function", &self.predicate_function),
        ] {
            if value.contains('\0') {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must not contain NUL characters".to_string(),
                });
            }
        }

        if self.backend == BackendKind::Postgres {
            if self.tenant_column.len() > PG_MAX_IDENTIFIER {
                return Err(ConfigError::Invalid {
                    field: "tenant_column".to_string(),
                    reason: format!("PostgreSQL identifiers are limited to {PG_MAX_IDENTIFIER} bytes"),
                });
            }
            if !is_custom_setting_name(&self.session_variable) {
                return Err(ConfigError::Invalid {
                    field: "session_variable".to_string(),
                    reason: "PostgreSQL custom settings must be named `prefix.name`".to_string(),
                });
            }
        }

        if self.backend == BackendKind::SqlServer && self.app_role.is_some() {
            return Err(ConfigError::Invalid {
                field: "row_security.app_role".to_string(),
                reason: "application role provisioning is only supported on PostgreSQL".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for RetrofitOptions {
    fn default() -> Self {
        Self::postgres()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use space_core::Table;

    #[test]
    fn test_defaults_per_backend() {
        let pg = RetrofitConfig::default().options().unwrap();
        assert_eq!(pg.backend, BackendKind::Postgres);
        assert_eq!(pg.tenant_column, "own_space_id");
        assert_eq!(pg.session_variable, "app.own_space_id");
        assert_eq!(pg.policy_name, "ownspacepolicy");

        let config = RetrofitConfig {
            backend: Some(BackendKind::SqlServer),
            ..Default::default()
        };
        let mssql = config.options().unwrap();
        assert_eq!(mssql.tenant_column, "OwnSpaceId");
        assert_eq!(mssql.session_variable, "OwnSpaceId");
        assert_eq!(mssql.policy_name, "dbo.OwnSpacePolicy");
        assert_eq!(mssql.predicate_function, "dbo.fn_get_own_space_id");
    }

    #[test]
    fn test_naming_overrides() {
        let config = RetrofitConfig {
            naming: NamingConfig {
                tenant_column: Some("tenant_id".to_string()),
                session_variable: Some("acme.tenant_id".to_string()),
            },
            statement_timeout_seconds: Some(30),
            ..Default::default()
        };
        let options = config.options().unwrap();
        assert_eq!(options.tenant_column, "tenant_id");
        assert_eq!(options.session_variable, "acme.tenant_id");
        assert_eq!(options.statement_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_postgres_session_variable_needs_prefix() {
        let options = RetrofitOptions::postgres().with_session_variable("own_space_id");
        let err = options.check().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "session_variable"));

        let mssql = RetrofitOptions::sqlserver().with_session_variable("own_space_id");
        assert!(mssql.check().is_ok());
    }

    #[test]
    fn test_postgres_identifier_length() {
        let options = RetrofitOptions::postgres().with_tenant_column("c".repeat(64));
        assert!(options.check().is_err());
        let options = RetrofitOptions::postgres().with_tenant_column("c".repeat(63));
        assert!(options.check().is_ok());
    }

    #[test]
    fn test_empty_names_rejected() {
        let options = RetrofitOptions::postgres().with_tenant_column("");
        assert!(matches!(options.check(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_timeout_range() {
        let config = RetrofitConfig {
            statement_timeout_seconds: Some(0),
            ..Default::default()
        };
        assert!(config.options().is_err());
    }

    #[test]
    fn test_app_role_rejected_on_sqlserver() {
        let options = RetrofitOptions::sqlserver().with_app_role("app", "secret");
        assert!(options.check().is_err());
    }

    #[test]
    fn test_app_role_debug_hides_password() {
        let role = AppRoleConfig {
            name: "app".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{:?}", role);
        assert!(printed.contains("app"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_filter_config_everything_when_empty() {
        let filter = TableFilterConfig::default().to_filter();
        assert!(filter.matches(&Table::new("public", "orders")));
    }

    #[test]
    fn test_filter_config_combination() {
        let config = TableFilterConfig {
            include_schemas: vec!["public".to_string(), "Sales".to_string()],
            exclude_tables: vec!["__EFMigrationsHistory".to_string(), "sales.audit".to_string()],
            ..Default::default()
        };
        let filter = config.to_filter();
        assert!(filter.matches(&Table::new("public", "orders")));
        assert!(filter.matches(&Table::new("sales", "invoices")));
        assert!(!filter.matches(&Table::new("sales", "Audit")));
        assert!(filter.matches(&Table::new("public", "audit")));
        assert!(!filter.matches(&Table::new("public", "__efmigrationshistory")));
        assert!(!filter.matches(&Table::new("hr", "people")));
    }

    #[test]
    fn test_filter_config_prefixes() {
        let config = TableFilterConfig {
            table_prefixes: vec!["app_".to_string()],
            ..Default::default()
        };
        let filter = config.to_filter();
        assert!(filter.matches(&Table::new("public", "APP_users")));
        assert!(!filter.matches(&Table::new("public", "users")));
    }

    #[test]
    fn test_database_url_required() {
        let config = RetrofitConfig::default();
        assert!(matches!(
            config.database_url(),
            Err(ConfigError::Missing { .. })
        ));
    }
}
