//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)

use crate::config::{NamingConfig, RetrofitConfig, RowSecurityConfig, TableFilterConfig};

/// Merge multiple configuration sources with precedence.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Merges configuration from multiple sources following precedence rules:
/// CLI arguments > environment variables > config file > defaults.
///
/// ## Usage
/// ```rust,no_run
/// use config::{RetrofitConfig, merge_configs, load_from_file, load_from_env};
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let from_file = load_from_file(Path::new("ownspace.toml"))?;
///     let from_env = load_from_env()?;
///
///     let _config = merge_configs(
///         RetrofitConfig::default(),
///         from_file,
///         "file",
///         from_env,
///         "env",
///         None,
///         "cli",
///     );
///     Ok(())
/// }
/// ```
///
/// ## Merge Rules
/// A set scalar in a higher source replaces the lower one. A non-empty filter
/// list replaces the lower list as a whole; lists are not concatenated.
pub fn merge_configs(
    defaults: RetrofitConfig,
    file_config: RetrofitConfig,
    file_source_name: &str,
    env_config: RetrofitConfig,
    env_source_name: &str,
    cli_config: Option<RetrofitConfig>,
    cli_source_name: &str,
) -> RetrofitConfig {
    let mut config = defaults;

    config = merge_with_logging(config, file_config, file_source_name);
    config = merge_with_logging(config, env_config, env_source_name);

    if let Some(cli) = cli_config {
        config = merge_with_logging(config, cli, cli_source_name);
    }

    config
}

fn merge_with_logging(
    mut base: RetrofitConfig,
    override_config: RetrofitConfig,
    source_name: &str,
) -> RetrofitConfig {
    let mut changes = Vec::new();

    merge_option(
        &mut base.backend,
        override_config.backend,
        "backend",
        &mut changes,
    );
    if let Some(url) = override_config.database_url
        && base.database_url.as_ref() != Some(&url)
    {
        changes.push("database_url = ***".to_string());
        base.database_url = Some(url);
    }
    merge_option(
        &mut base.statement_timeout_seconds,
        override_config.statement_timeout_seconds,
        "statement_timeout_seconds",
        &mut changes,
    );

    merge_naming(&mut base.naming, override_config.naming, &mut changes);
    merge_row_security(
        &mut base.row_security,
        override_config.row_security,
        &mut changes,
    );
    merge_filter(&mut base.filter, override_config.filter, &mut changes);

    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", source_name, changes);
    }

    base
}

fn merge_option<T>(base: &mut Option<T>, value: Option<T>, field: &str, changes: &mut Vec<String>)
where
    T: PartialEq + std::fmt::Debug,
{
    if let Some(value) = value
        && base.as_ref() != Some(&value)
    {
        changes.push(format!("{field} = {value:?}"));
        *base = Some(value);
    }
}

fn merge_naming(base: &mut NamingConfig, override_config: NamingConfig, changes: &mut Vec<String>) {
    merge_option(
        &mut base.tenant_column,
        override_config.tenant_column,
        "naming.tenant_column",
        changes,
    );
    merge_option(
        &mut base.session_variable,
        override_config.session_variable,
        "naming.session_variable",
        changes,
    );
}

fn merge_row_security(
    base: &mut RowSecurityConfig,
    override_config: RowSecurityConfig,
    changes: &mut Vec<String>,
) {
    merge_option(
        &mut base.policy_name,
        override_config.policy_name,
        "row_security.policy_name",
        changes,
    );
    merge_option(
        &mut base.predicate_function,
        override_config.predicate_function,
        "row_security.predicate_function",
        changes,
    );
    if let Some(role) = override_config.app_role
        && base.app_role.as_ref() != Some(&role)
    {
        changes.push(format!("row_security.app_role = {}", role.name));
        base.app_role = Some(role);
    }
}

fn merge_filter(
    base: &mut TableFilterConfig,
    override_config: TableFilterConfig,
    changes: &mut Vec<String>,
) {
    for (field, target, value) in [
        (
            "filter.include_schemas",
            &mut base.include_schemas,
            override_config.include_schemas,
        ),
        (
            "filter.exclude_schemas",
            &mut base.exclude_schemas,
            override_config.exclude_schemas,
        ),
        (
            "filter.include_tables",
            &mut base.include_tables,
            override_config.include_tables,
        ),
        (
            "filter.exclude_tables",
            &mut base.exclude_tables,
            override_config.exclude_tables,
        ),
        (
            "filter.table_prefixes",
            &mut base.table_prefixes,
            override_config.table_prefixes,
        ),
    ] {
        if !value.is_empty() && *target != value {
            changes.push(format!("{field} = {value:?}"));
            *target = value;
        }
    }
}
