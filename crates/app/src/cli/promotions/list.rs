use clap::{Args, ValueEnum};
use hanko_promotions::promotions::PromotionStatus;
use hanko_promotions_app::{
    context::AppContext, pagination::PageRequest, store::PromotionFilter,
};
use tabled::builder::Builder;

use crate::cli::{OutputFormat, describe, print_json, styled_table};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusArg {
    Draft,
    Scheduled,
    Active,
    Paused,
    Expired,
}

impl From<StatusArg> for PromotionStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Draft => Self::Draft,
            StatusArg::Scheduled => Self::Scheduled,
            StatusArg::Active => Self::Active,
            StatusArg::Paused => Self::Paused,
            StatusArg::Expired => Self::Expired,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct ListPromotionsArgs {
    /// Only promotions in this (effective) status
    #[arg(long, value_enum)]
    status: Option<StatusArg>,

    /// Page size (1-100, default 25)
    #[arg(long)]
    page_size: Option<u32>,

    /// Token from a previous page
    #[arg(long)]
    page_token: Option<String>,
}

pub(crate) async fn run(
    context: &AppContext,
    args: ListPromotionsArgs,
    output: OutputFormat,
) -> Result<(), String> {
    let filter = PromotionFilter {
        status: args.status.map(Into::into),
        ..PromotionFilter::default()
    };

    let page = context
        .promotions
        .list_promotions(
            filter,
            PageRequest {
                token: args.page_token,
                size: args.page_size,
            },
        )
        .await
        .map_err(|error| format!("failed to list promotions: {}", describe(&error)))?;

    if matches!(output, OutputFormat::Json) {
        return print_json(&page);
    }

    if page.items.is_empty() {
        println!("no promotions found");
        return Ok(());
    }

    let mut builder = Builder::default();

    builder.push_record(["Code", "Name", "Kind", "Status", "Starts", "Ends", "Used", "Id"]);

    for promotion in &page.items {
        let used = if promotion.usage_limit_total == 0 {
            promotion.usage_count.to_string()
        } else {
            format!("{}/{}", promotion.usage_count, promotion.usage_limit_total)
        };

        builder.push_record([
            promotion.code.to_string(),
            promotion.name.clone(),
            promotion.kind().to_string(),
            promotion.status.to_string(),
            promotion.schedule.starts_at.to_string(),
            promotion.schedule.ends_at.to_string(),
            used,
            promotion.id.to_string(),
        ]);
    }

    println!("{}", styled_table(builder));

    if let Some(token) = page.next_page_token {
        println!("next page: --page-token {token}");
    }

    Ok(())
}
