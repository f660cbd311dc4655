use clap::{Args, Subcommand};
use hanko_promotions_app::context::AppContext;

use super::OutputFormat;

mod list;
mod show;

#[derive(Debug, Args)]
pub(crate) struct PromotionsCommand {
    #[command(subcommand)]
    command: PromotionsSubcommand,
}

#[derive(Debug, Subcommand)]
enum PromotionsSubcommand {
    List(list::ListPromotionsArgs),
    Show(show::ShowPromotionArgs),
}

pub(crate) async fn run(
    context: &AppContext,
    command: PromotionsCommand,
    output: OutputFormat,
) -> Result<(), String> {
    match command.command {
        PromotionsSubcommand::List(args) => list::run(context, args, output).await,
        PromotionsSubcommand::Show(args) => show::run(context, args).await,
    }
}
