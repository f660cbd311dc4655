use clap::Args;
use hanko_promotions_app::context::AppContext;

use crate::cli::{describe, print_json};

#[derive(Debug, Args)]
pub(crate) struct ShowPromotionArgs {
    /// Promotion code
    #[arg(long)]
    code: String,
}

/// Promotions are always printed as JSON; they do not fit a table.
pub(crate) async fn run(context: &AppContext, args: ShowPromotionArgs) -> Result<(), String> {
    let promotion = context
        .promotions
        .find_by_code(&args.code)
        .await
        .map_err(|error| format!("failed to find {}: {}", args.code, describe(&error)))?;

    print_json(&promotion)
}
