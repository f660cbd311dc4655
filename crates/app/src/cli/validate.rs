use std::path::PathBuf;

use clap::Args;
use hanko_promotions_app::{context::AppContext, domain::validation::ValidationOutcome};
use tabled::{
    builder::Builder,
    settings::{Alignment, object::Columns},
};
use tokio_util::sync::CancellationToken;

use crate::cli::{OutputFormat, describe, load_cart, minor, print_json, styled_table};

#[derive(Debug, Args)]
pub(crate) struct ValidateArgs {
    /// Promotion code; repeat to validate a stack
    #[arg(long = "code", required = true)]
    codes: Vec<String>,

    /// Cart JSON file
    #[arg(long)]
    cart: PathBuf,

    /// Print every rule outcome
    #[arg(long)]
    rules: bool,
}

pub(crate) async fn run(
    context: &AppContext,
    args: ValidateArgs,
    output: OutputFormat,
) -> Result<(), String> {
    let cart = load_cart(&args.cart)?;
    let cancel = CancellationToken::new();

    let outcomes = context
        .validation
        .validate_many(args.codes, &cart, &cancel)
        .await
        .map_err(|error| format!("validation failed: {}", describe(&error)))?;

    if matches!(output, OutputFormat::Json) {
        return print_json(&outcomes);
    }

    let mut builder = Builder::default();

    builder.push_record(["Code", "Eligible", "Discount", "Shipping", "Summary"]);

    for outcome in &outcomes {
        builder.push_record([
            outcome.promotion_code.to_string(),
            if outcome.eligible { "yes" } else { "no" }.to_string(),
            minor(outcome.discount_minor, cart.currency),
            minor(outcome.shipping_discount_minor, cart.currency),
            outcome.summary.clone(),
        ]);
    }

    let mut table = styled_table(builder);

    table.modify(Columns::new(2..4), Alignment::right());

    println!("{table}");

    if args.rules {
        for outcome in &outcomes {
            print_rules(outcome);
        }
    }

    let total: i64 = outcomes.iter().map(ValidationOutcome::total_minor).sum();

    println!("total discount: {}", minor(total, cart.currency));

    Ok(())
}

fn print_rules(outcome: &ValidationOutcome) {
    println!("{}", outcome.promotion_code);

    let mut builder = Builder::default();

    builder.push_record(["Rule", "Passed", "Blocking", "Message"]);

    for rule in &outcome.rules {
        builder.push_record([
            rule.key.to_string(),
            rule.passed.to_string(),
            rule.blocking.to_string(),
            rule.message.clone(),
        ]);
    }

    println!("{}", styled_table(builder));
}
