use std::path::PathBuf;

use clap::Args;
use hanko_promotions_app::{
    context::AppContext,
    domain::redemptions::RedemptionIntent,
};
use tabled::builder::Builder;
use tokio_util::sync::CancellationToken;

use crate::cli::{OutputFormat, describe, load_cart, minor, print_json, styled_table};

#[derive(Debug, Args)]
pub(crate) struct RedeemArgs {
    /// Promotion code
    #[arg(long)]
    code: String,

    /// Cart JSON file; must carry a userId
    #[arg(long)]
    cart: PathBuf,

    /// Idempotency key; repeat it to replay the first receipt
    #[arg(long)]
    key: String,

    /// Order the promotion is applied to
    #[arg(long)]
    order: String,

    /// Acting party recorded in the audit trail
    #[arg(long, default_value = "cli")]
    actor: String,
}

pub(crate) async fn run(
    context: &AppContext,
    args: RedeemArgs,
    output: OutputFormat,
) -> Result<(), String> {
    let cart = load_cart(&args.cart)?;

    let redemption = context
        .redemptions
        .redeem(
            RedemptionIntent {
                promotion_code: args.code,
                idempotency_key: args.key,
                actor_ref: args.actor,
                order_ref: args.order,
                cart,
            },
            &CancellationToken::new(),
        )
        .await
        .map_err(|error| format!("redemption failed: {}", describe(&error)))?;

    if matches!(output, OutputFormat::Json) {
        return print_json(&redemption);
    }

    let receipt = redemption.receipt();

    let mut builder = Builder::default();

    builder.push_record(["Field", "Value"]);
    builder.push_record(["Code".to_string(), receipt.promotion_code.to_string()]);
    builder.push_record(["Order".to_string(), receipt.order_ref.clone()]);
    builder.push_record(["User".to_string(), receipt.user_id.clone()]);
    builder.push_record([
        "Discount".to_string(),
        minor(receipt.discount_minor, receipt.currency),
    ]);
    builder.push_record([
        "Shipping discount".to_string(),
        minor(receipt.shipping_discount_minor, receipt.currency),
    ]);
    builder.push_record(["Applied at".to_string(), receipt.applied_at.to_string()]);

    for line in &receipt.line_discounts {
        builder.push_record([
            format!("Line {}", line.line_id),
            minor(line.discount_minor, receipt.currency),
        ]);
    }

    println!("{}", styled_table(builder));

    if !redemption.is_applied() {
        println!("already applied; returning the original receipt");
    }

    Ok(())
}
