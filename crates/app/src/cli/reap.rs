use clap::Args;
use hanko_promotions_app::context::AppContext;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{OutputFormat, describe, print_json};

#[derive(Debug, Args)]
pub(crate) struct ReapArgs {
    /// Keep sweeping on the reaper interval until interrupted
    #[arg(long)]
    watch: bool,
}

pub(crate) async fn run(
    context: &AppContext,
    args: ReapArgs,
    output: OutputFormat,
) -> Result<(), String> {
    if args.watch {
        return watch(context).await;
    }

    let report = context
        .reaper
        .sweep()
        .await
        .map_err(|error| format!("sweep failed: {}", describe(&error)))?;

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            println!(
                "activated: {}, expired: {}, skipped: {}",
                report.activated, report.expired, report.skipped
            );

            Ok(())
        }
    }
}

async fn watch(context: &AppContext) -> Result<(), String> {
    let cancel = CancellationToken::new();
    let reaper = context.reaper.clone();
    let interval = context.settings.reaper_interval;

    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { reaper.run(interval, cancel).await }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| format!("failed to listen for ctrl-c: {error}"))?;

    info!("received ctrl-c, stopping reaper");

    cancel.cancel();

    task.await
        .map_err(|error| format!("reaper task failed: {error}"))
}
