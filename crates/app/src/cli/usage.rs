use clap::{Args, ValueEnum};
use hanko_promotions_app::{
    context::AppContext,
    domain::usage::UsageListRequest,
    pagination::PageRequest,
    store::UsageSort,
};
use tabled::builder::Builder;

use crate::cli::{OutputFormat, describe, print_json, styled_table};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Times,
    LastUsedAt,
}

impl From<SortArg> for UsageSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Times => Self::Times,
            SortArg::LastUsedAt => Self::LastUsedAt,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct UsageArgs {
    /// Promotion code
    #[arg(long)]
    code: String,

    /// Only customers who redeemed at least this often
    #[arg(long, default_value_t = 0)]
    min_times: u64,

    /// Sort field
    #[arg(long, value_enum, default_value_t = SortArg::Times)]
    sort: SortArg,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Page size (1-200, default 50)
    #[arg(long)]
    page_size: Option<u32>,

    /// Token from a previous page
    #[arg(long)]
    page_token: Option<String>,
}

pub(crate) async fn run(
    context: &AppContext,
    args: UsageArgs,
    output: OutputFormat,
) -> Result<(), String> {
    let promotion = context
        .promotions
        .find_by_code(&args.code)
        .await
        .map_err(|error| format!("failed to find {}: {}", args.code, describe(&error)))?;

    let page = context
        .usage
        .list_usage(
            promotion.id,
            UsageListRequest {
                min_times: args.min_times,
                sort_by: args.sort.into(),
                descending: args.desc,
                page: PageRequest {
                    token: args.page_token,
                    size: args.page_size,
                },
            },
        )
        .await
        .map_err(|error| format!("failed to list usage: {}", describe(&error)))?;

    if matches!(output, OutputFormat::Json) {
        return print_json(&page);
    }

    if page.items.is_empty() {
        println!("no usage recorded for {}", promotion.code);
        return Ok(());
    }

    let mut builder = Builder::default();

    builder.push_record(["User", "Times", "First used", "Last used", "Blocked", "Orders"]);

    for usage in &page.items {
        builder.push_record([
            usage.user_id.clone(),
            usage.times.to_string(),
            usage
                .first_used_at
                .map(|at| at.to_string())
                .unwrap_or_default(),
            usage
                .last_used_at
                .map(|at| at.to_string())
                .unwrap_or_default(),
            usage.blocked.to_string(),
            usage
                .order_refs
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        ]);
    }

    println!("{}", styled_table(builder));

    if let Some(token) = page.next_page_token {
        println!("next page: --page-token {token}");
    }

    Ok(())
}
