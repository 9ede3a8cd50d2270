use anyhow::Result;

use super::RetrofitArgs;
use crate::output;

/// Prints the merged configuration with secrets redacted.
pub fn run(args: RetrofitArgs) -> Result<()> {
    let mut config = args.resolve()?;
    let options = config.options()?;
    if config.database_url.is_some() {
        config.database_url = Some("***".to_string());
    }
    if let Some(role) = config.row_security.app_role.as_mut() {
        role.password = "***".to_string();
    }

    if args.json {
        let output = serde_json::json!({
            "config": config,
            "resolved": {
                "backend": options.backend.to_string(),
                "tenant_column": options.tenant_column,
                "session_variable": options.session_variable,
                "policy_name": options.policy_name,
                "predicate_function": options.predicate_function,
                "app_role": options.app_role.as_ref().map(|r| r.name.clone()),
                "statement_timeout_seconds": options.statement_timeout.map(|t| t.as_secs())
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    output::header("OwnSpace Configuration");
    println!();
    println!("  backend:            {}", options.backend);
    println!(
        "  database_url:       {}",
        config.database_url.as_deref().unwrap_or("(not set)")
    );
    println!("  tenant_column:      {}", options.tenant_column);
    println!("  session_variable:   {}", options.session_variable);
    println!("  policy_name:        {}", options.policy_name);
    println!("  predicate_function: {}", options.predicate_function);
    if let Some(role) = &options.app_role {
        println!("  app_role:           {}", role.name);
    }
    if let Some(timeout) = options.statement_timeout {
        println!("  statement_timeout:  {}s", timeout.as_secs());
    }
    Ok(())
}
