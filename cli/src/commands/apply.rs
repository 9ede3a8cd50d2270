use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;

use super::{Resolved, RetrofitArgs};
use crate::output;

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub retrofit: RetrofitArgs,

    #[arg(long, help = "Print the plan and stop without issuing DDL")]
    pub dry_run: bool,
}

pub async fn run(args: ApplyArgs) -> Result<()> {
    if args.dry_run {
        return super::plan::run(args.retrofit).await;
    }

    let resolved = Resolved::from_args(&args.retrofit)?;

    // Ctrl-C stops before the next primitive; a re-run resumes.
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling retrofit");
            output::info("Interrupted; stopping after the current statement");
            on_interrupt.cancel();
        }
    });

    let report = retrofit::apply_with_cancellation(
        &resolved.target,
        &resolved.filter,
        &resolved.options,
        token,
    )
    .await?;

    if args.retrofit.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::header(&format!("Retrofit applied ({})", resolved.target.backend));
    println!();
    output::list(
        "Tables retrofitted:",
        report.tables_retrofitted.iter().map(ToString::to_string),
    );
    output::list("Unique constructs widened:", &report.constructs_widened);
    output::list("Foreign keys rebuilt:", &report.foreign_keys_rebuilt);
    println!();
    output::success(&format!(
        "{} statements in {}ms",
        report.statements_executed, report.duration_ms
    ));
    Ok(())
}
