use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand, ValueEnum};
use hanko_promotions::cart::CartContext;
use hanko_promotions_app::{
    clock::{Clock, FixedClock, SystemClock},
    context::AppContext,
};
use jiff::Timestamp;
use serde::Serialize;
use tabled::{
    Table,
    builder::Builder,
    settings::{Color, Style, object::Rows},
};

use crate::config::{EngineConfig, LoggingConfig};

mod promotions;
mod reap;
mod redeem;
mod usage;
mod validate;

/// How command results are printed.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "hanko-promotions", about = "Hanko Field promotion engine CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) logging: LoggingConfig,

    #[command(flatten)]
    engine: EngineConfig,

    /// YAML fixture set seeding the in-memory store
    #[arg(
        long,
        env = "PROMO_FIXTURES",
        default_value = "fixtures/promotions.yaml",
        global = true
    )]
    fixtures: PathBuf,

    /// Evaluate at this instant instead of the current time
    #[arg(long, env = "PROMO_NOW", global = true)]
    now: Option<Timestamp>,

    /// Output format (table, json)
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Browse the promotion catalog
    Promotions(promotions::PromotionsCommand),

    /// Dry-run promotion codes against a cart
    Validate(validate::ValidateArgs),

    /// Apply a promotion to an order
    Redeem(redeem::RedeemArgs),

    /// List per-customer usage of a promotion
    Usage(usage::UsageArgs),

    /// Persist due schedule transitions
    Reap(reap::ReapArgs),
}

impl Cli {
    pub(crate) async fn run(self) -> Result<(), String> {
        let clock: Arc<dyn Clock> = match self.now {
            Some(at) => Arc::new(FixedClock::new(at)),
            None => Arc::new(SystemClock),
        };

        let context = AppContext::from_fixtures(&self.fixtures, clock, self.engine.settings())
            .await
            .map_err(|error| describe(&error))?;

        let output = self.output;

        match self.command {
            Commands::Promotions(command) => promotions::run(&context, command, output).await,
            Commands::Validate(args) => validate::run(&context, args, output).await,
            Commands::Redeem(args) => redeem::run(&context, args, output).await,
            Commands::Usage(args) => usage::run(&context, args, output).await,
            Commands::Reap(args) => reap::run(&context, args, output).await,
        }
    }
}

/// An error and its sources, joined with `: `.
pub(crate) fn describe(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

pub(crate) fn load_cart(path: &Path) -> Result<CartContext, String> {
    let json = fs::read_to_string(path)
        .map_err(|error| format!("failed to read cart {}: {error}", path.display()))?;

    serde_json::from_str(&json)
        .map_err(|error| format!("failed to parse cart {}: {error}", path.display()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|error| format!("failed to serialise output: {error}"))?;

    println!("{json}");

    Ok(())
}

/// A table with a bold header row.
pub(crate) fn styled_table(builder: Builder) -> Table {
    let mut table = builder.build();

    table.with(Style::modern_rounded());
    table.modify(Rows::first(), Color::BOLD);

    table
}

/// Minor units with a currency code, e.g. `1200 JPY`.
pub(crate) fn minor(amount: i64, currency: impl std::fmt::Display) -> String {
    format!("{amount} {currency}")
}
