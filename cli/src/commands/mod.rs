pub mod apply;
pub mod plan;
pub mod show_config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{AppRoleConfig, RetrofitConfig, TableFilterConfig};
use retrofit::ConnectionTarget;
use space_core::BackendKind;

#[derive(Parser)]
#[command(
    name = "ownspace",
    author,
    version,
    about = "OwnSpace - retrofit tenant isolation onto an existing schema",
    long_about = "Adds a tenant column, widens unique constraints and indexes, rebuilds the \
                  foreign keys that depend on them and installs row-level security.\n\nSettings \
                  come from --config, OWNSPACE_* environment variables and flags, in increasing \
                  order of precedence.",
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show what a retrofit would change without issuing any DDL")]
    Plan(RetrofitArgs),

    #[command(about = "Retrofit tenant isolation onto the selected tables")]
    Apply(apply::ApplyArgs),

    #[command(about = "Print the resolved configuration")]
    Config(RetrofitArgs),
}

/// Settings shared by every subcommand. Each flag overrides the same
/// setting from the environment and the configuration file.
#[derive(Args, Default)]
pub struct RetrofitArgs {
    #[arg(long, short = 'c', env = "OWNSPACE_CONFIG", help = "TOML or YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "postgres or sqlserver")]
    pub backend: Option<BackendKind>,

    #[arg(long, help = "PostgreSQL URL or SQL Server ADO connection string")]
    pub database_url: Option<String>,

    #[arg(long)]
    pub tenant_column: Option<String>,

    #[arg(long)]
    pub session_variable: Option<String>,

    #[arg(long)]
    pub policy_name: Option<String>,

    #[arg(long, help = "SQL Server predicate function")]
    pub predicate_function: Option<String>,

    #[arg(long, requires = "app_role_password", help = "PostgreSQL application login (NOBYPASSRLS)")]
    pub app_role: Option<String>,

    #[arg(long, requires = "app_role")]
    pub app_role_password: Option<String>,

    #[arg(long = "include-schema", value_delimiter = ',')]
    pub include_schemas: Vec<String>,

    #[arg(long = "exclude-schema", value_delimiter = ',')]
    pub exclude_schemas: Vec<String>,

    #[arg(long = "include-table", value_delimiter = ',', help = "table or schema.table")]
    pub include_tables: Vec<String>,

    #[arg(long = "exclude-table", value_delimiter = ',', help = "table or schema.table")]
    pub exclude_tables: Vec<String>,

    #[arg(long = "table-prefix", value_delimiter = ',')]
    pub table_prefixes: Vec<String>,

    #[arg(long, help = "Per-statement timeout in seconds")]
    pub statement_timeout: Option<u64>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

impl RetrofitArgs {
    fn cli_config(&self) -> RetrofitConfig {
        let mut config = RetrofitConfig {
            backend: self.backend,
            database_url: self.database_url.clone(),
            statement_timeout_seconds: self.statement_timeout,
            filter: TableFilterConfig {
                include_schemas: self.include_schemas.clone(),
                exclude_schemas: self.exclude_schemas.clone(),
                include_tables: self.include_tables.clone(),
                exclude_tables: self.exclude_tables.clone(),
                table_prefixes: self.table_prefixes.clone(),
            },
            ..Default::default()
        };
        config.naming.tenant_column = self.tenant_column.clone();
        config.naming.session_variable = self.session_variable.clone();
        config.row_security.policy_name = self.policy_name.clone();
        config.row_security.predicate_function = self.predicate_function.clone();
        if let (Some(name), Some(password)) = (&self.app_role, &self.app_role_password) {
            config.row_security.app_role = Some(AppRoleConfig {
                name: name.clone(),
                password: password.clone(),
            });
        }
        config
    }

    /// Merges file, environment and flags into one configuration.
    pub fn resolve(&self) -> Result<RetrofitConfig> {
        let file_config = match &self.config {
            Some(path) => config::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RetrofitConfig::default(),
        };
        let env_config = config::load_from_env().context("Invalid OWNSPACE_* environment")?;

        Ok(config::merge_configs(
            RetrofitConfig::default(),
            file_config,
            "config file",
            env_config,
            "environment",
            Some(self.cli_config()),
            "command line",
        ))
    }
}

/// Everything a `plan` or `apply` run needs, resolved and validated.
pub struct Resolved {
    pub target: ConnectionTarget,
    pub options: config::RetrofitOptions,
    pub filter: space_core::TableFilter,
    pub config: RetrofitConfig,
}

impl Resolved {
    pub fn from_args(args: &RetrofitArgs) -> Result<Self> {
        let config = args.resolve()?;
        let options = config.options().context("Invalid configuration")?;
        let target = ConnectionTarget {
            backend: config.backend(),
            connection_string: config.database_url()?.to_string(),
        };
        let filter = config.filter.to_filter();
        Ok(Self {
            target,
            options,
            filter,
            config,
        })
    }
}
