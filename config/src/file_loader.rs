//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files.
//!
//! Supports automatic format detection based on file extension.

use crate::config::RetrofitConfig;
use std::path::Path;

/// Configuration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),
}

/// Load configuration from TOML file.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Loads a retrofit configuration from a TOML format file. Every section is
/// optional; omitted values fall back to the backend defaults when the
/// configuration is resolved.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_toml;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_toml(Path::new("ownspace.toml"))?;
///     println!("Backend: {}", config.backend());
///     Ok(())
/// }
/// ```
///
/// ## Error Handling
/// Returns `ConfigFileError` for:
/// - File not found
/// - Invalid TOML syntax
/// - Unknown backend names
pub fn load_from_toml(path: &Path) -> Result<RetrofitConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    let config: RetrofitConfig =
        toml::from_str(&contents).map_err(|e| ConfigFileError::TomlParse(e.to_string()))?;

    Ok(config)
}

/// Load configuration from YAML file.
///
/// ## Error Handling
/// Returns `ConfigFileError` for:
/// - File not found
/// - Invalid YAML syntax
pub fn load_from_yaml(path: &Path) -> Result<RetrofitConfig, ConfigFileError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))?;

    let config: RetrofitConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))?;

    Ok(config)
}

/// Load configuration from file with auto-detection.
///
/// ## Supported Formats
/// - `.toml`: TOML format
/// - `.yaml`: YAML format
/// - `.yml`: YAML format
pub fn load_from_file(path: &Path) -> Result<RetrofitConfig, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    match extension.to_lowercase().as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use space_core::BackendKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ownspace.toml");

        let toml_content = r#"
backend = "postgres"
database_url = "postgres://localhost/app"
statement_timeout_seconds = 45

[naming]
tenant_column = "tenant_id"
session_variable = "acme.tenant_id"

[row_security]
policy_name = "tenant_isolation"

[row_security.app_role]
name = "app_user"
password = "secret"

[filter]
include_schemas = ["public"]
exclude_tables = ["__EFMigrationsHistory"]
"#;
        fs::write(&path, toml_content).unwrap();

        let config = load_from_toml(&path).unwrap();
        assert_eq!(config.backend(), BackendKind::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.naming.tenant_column.as_deref(), Some("tenant_id"));
        assert_eq!(config.row_security.policy_name.as_deref(), Some("tenant_isolation"));
        assert_eq!(config.row_security.app_role.as_ref().unwrap().name, "app_user");
        assert_eq!(config.filter.include_schemas, vec!["public"]);
        assert_eq!(config.statement_timeout_seconds, Some(45));
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ownspace.yaml");

        let yaml_content = r#"
backend: sqlserver
database_url: "server=tcp:localhost,1433;user=sa;password=x"
naming:
  tenant_column: TenantKey
filter:
  include_schemas: [dbo]
  table_prefixes: [App]
"#;
        fs::write(&path, yaml_content).unwrap();

        let config = load_from_yaml(&path).unwrap();
        assert_eq!(config.backend(), BackendKind::SqlServer);
        assert_eq!(config.naming.tenant_column.as_deref(), Some("TenantKey"));
        assert_eq!(config.filter.table_prefixes, vec!["App"]);

        let options = config.options().unwrap();
        assert_eq!(options.session_variable, "OwnSpaceId");
    }

    #[test]
    fn test_load_from_file_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ownspace.json");
        fs::write(&path, "{}").unwrap();

        let result = load_from_file(&path);
        assert!(matches!(result, Err(ConfigFileError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_from_file_no_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ownspace");
        fs::write(&path, "").unwrap();

        let result = load_from_file(&path);
        assert!(matches!(result, Err(ConfigFileError::NoExtension)));
    }

    #[test]
    fn test_load_from_file_auto_detect() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("a.toml");
        fs::write(&toml_path, "backend = \"mssql\"\n").unwrap();
        assert_eq!(
            load_from_file(&toml_path).unwrap().backend(),
            BackendKind::SqlServer
        );

        let yml_path = dir.path().join("b.yml");
        fs::write(&yml_path, "naming:\n  tenant_column: org_id\n").unwrap();
        assert_eq!(
            load_from_file(&yml_path).unwrap().naming.tenant_column.as_deref(),
            Some("org_id")
        );
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "").unwrap();

        let config = load_from_toml(&path).unwrap();
        assert_eq!(config, RetrofitConfig::default());
    }

    #[test]
    fn test_load_from_toml_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[invalid\n").unwrap();

        let result = load_from_toml(&path);
        assert!(matches!(result, Err(ConfigFileError::TomlParse(_))));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "backend: oracle\n").unwrap();

        let result = load_from_yaml(&path);
        assert!(matches!(result, Err(ConfigFileError::YamlParse(_))));
    }

    #[test]
    fn test_load_from_toml_not_found() {
        let path = Path::new("/nonexistent/path/ownspace.toml");
        let result = load_from_toml(path);
        assert!(matches!(result, Err(ConfigFileError::FileNotFound(_))));
    }
}
