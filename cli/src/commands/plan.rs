use anyhow::Result;

use super::{Resolved, RetrofitArgs};
use crate::output;

pub async fn run(args: RetrofitArgs) -> Result<()> {
    let resolved = Resolved::from_args(&args)?;
    let plan = retrofit::plan(&resolved.target, &resolved.filter, &resolved.options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    output::header(&format!("Retrofit plan ({})", resolved.target.backend));
    println!();
    output::list(
        "Tables receiving the tenant column:",
        plan.target_tables.iter().map(ToString::to_string),
    );
    output::list(
        "Unique constructs to widen:",
        plan.constructs_to_widen
            .iter()
            .map(|c| format!("{}.{} ({})", c.table, c.object_name(), c.key_column_names().join(", "))),
    );
    output::list(
        "Already widened:",
        plan.already_widened
            .iter()
            .map(|c| format!("{}.{}", c.table, c.object_name())),
    );
    output::list(
        "Foreign keys to rebuild:",
        plan.foreign_keys_to_rebuild
            .iter()
            .map(|fk| format!("{}.{} -> {}", fk.owning_table, fk.name, fk.referenced_table)),
    );

    if plan.is_settled() {
        println!();
        output::success("Schema is already widened; apply would only re-issue idempotent steps");
    }
    Ok(())
}
