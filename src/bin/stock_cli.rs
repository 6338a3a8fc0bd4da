use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use stateset_stock_ledger::{
    config,
    db::{self, DbPool},
    events::{self, EventSender},
    models::{BalanceSnapshot, Observation, PostingOutcome},
    services::{
        factory::{ServiceFactory, StockServices},
        stock_ledger::{LedgerPage, LedgerRange},
    },
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Balance(args) => handle_balance(&context, args, cli.json).await?,
        Commands::Ledger(args) => handle_ledger(&context, args, cli.json).await?,
        Commands::Submit(args) => {
            let outcome = context
                .services
                .submit(args.tenant, args.document)
                .await
                .context("failed to submit document")?;
            render_outcome(&outcome, cli.json)?;
        }
        Commands::Cancel(args) => {
            let outcome = context
                .services
                .cancel(args.tenant, args.document)
                .await
                .context("failed to cancel document")?;
            render_outcome(&outcome, cli.json)?;
        }
        Commands::Reconcile(args) => handle_reconcile(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "stock-ledger", about = "Operator tooling for the stock ledger", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Show the balance of one item at one location
    Balance(KeyArgs),
    /// Page through the ledger of one item at one location
    Ledger(LedgerArgs),
    /// Submit a draft document
    Submit(DocumentArgs),
    /// Cancel a submitted document
    Cancel(DocumentArgs),
    /// Post adjustments for a physical count
    Reconcile(ReconcileArgs),
}

#[derive(Args)]
struct KeyArgs {
    tenant: Uuid,
    item: String,
    location: String,
}

#[derive(Args)]
struct LedgerArgs {
    #[command(flatten)]
    key: KeyArgs,
    #[arg(long, help = "First posting date to include (YYYY-MM-DD)")]
    from: Option<NaiveDate>,
    #[arg(long, help = "Last posting date to include (YYYY-MM-DD)")]
    to: Option<NaiveDate>,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, help = "Entries per page; defaults to the configured page size")]
    limit: Option<u64>,
}

#[derive(Args)]
struct DocumentArgs {
    tenant: Uuid,
    document: Uuid,
}

#[derive(Args)]
struct ReconcileArgs {
    tenant: Uuid,
    location: String,
    #[arg(
        long = "count",
        required = true,
        help = "Counted quantity as ITEM=QTY or ITEM=QTY@RATE; repeat per item"
    )]
    counts: Vec<CountArg>,
}

#[derive(Clone, Debug)]
struct CountArg {
    item: String,
    quantity: Decimal,
    rate: Option<Decimal>,
}

impl FromStr for CountArg {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let (item, rest) = value
            .split_once('=')
            .ok_or_else(|| anyhow!("expected ITEM=QTY[@RATE], got '{}'", value))?;
        let (quantity, rate) = match rest.split_once('@') {
            Some((quantity, rate)) => (quantity, Some(rate)),
            None => (rest, None),
        };
        Ok(Self {
            item: item.trim().to_string(),
            quantity: Decimal::from_str(quantity.trim())
                .with_context(|| format!("invalid quantity in '{}'", value))?,
            rate: rate
                .map(|r| Decimal::from_str(r.trim()))
                .transpose()
                .with_context(|| format!("invalid rate in '{}'", value))?,
        })
    }
}

struct CliContext {
    db: Arc<DbPool>,
    services: StockServices,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_migrate {
            db::run_migrations(&db_pool)
                .await
                .context("failed to run migrations")?;
        }
        let db = Arc::new(db_pool);

        let (event_sender, event_rx) = EventSender::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        let services = ServiceFactory::new(db.clone(), event_sender, &config).build();

        Ok(Self {
            db,
            services,
        })
    }
}

async fn handle_balance(context: &CliContext, args: KeyArgs, json: bool) -> Result<()> {
    let balance = context
        .services
        .get_balance(args.tenant, &args.item, &args.location)
        .await
        .context("failed to read balance")?;

    if json {
        print_json(&balance)?;
    } else {
        render_balance(&balance);
    }
    Ok(())
}

async fn handle_ledger(context: &CliContext, args: LedgerArgs, json: bool) -> Result<()> {
    let page = context
        .services
        .query_ledger(
            args.key.tenant,
            &args.key.item,
            &args.key.location,
            LedgerRange::between(args.from, args.to),
            Some(args.page),
            args.limit,
        )
        .await
        .context("failed to query ledger")?;

    if json {
        print_json(&page)?;
    } else {
        render_ledger(&page);
    }
    Ok(())
}

async fn handle_reconcile(context: &CliContext, args: ReconcileArgs, json: bool) -> Result<()> {
    let observations = args
        .counts
        .into_iter()
        .map(|count| {
            let observation = Observation::new(&count.item, count.quantity);
            match count.rate {
                Some(rate) => observation.with_rate(rate),
                None => observation,
            }
        })
        .collect();

    let adjustments = context
        .services
        .reconcile(args.tenant, &args.location, observations)
        .await
        .context("failed to reconcile")?;

    if json {
        return print_json(&adjustments);
    }
    if adjustments.is_empty() {
        println!("Counts match the books; nothing posted");
    }
    for adjustment in &adjustments {
        println!(
            "- {} @ {} • {} -> {} ({}) at rate {} • document {}",
            adjustment.item_code,
            adjustment.location_code,
            adjustment.previous_qty,
            adjustment.actual_qty,
            adjustment.difference,
            adjustment.rate,
            adjustment.document_id
        );
    }
    Ok(())
}

fn render_outcome(outcome: &PostingOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }
    println!("Document {} is now {}", outcome.document_id, outcome.status);
    for balance in &outcome.balances {
        render_balance(balance);
    }
    for warning in &outcome.warnings {
        println!("warning: {}", warning);
    }
    Ok(())
}

fn render_balance(balance: &BalanceSnapshot) {
    println!(
        "- {} @ {} • on hand {} • reserved {} • available {} • rate {} • value {}",
        balance.item_code,
        balance.location_code,
        balance.on_hand,
        balance.reserved,
        balance.available,
        balance.valuation_rate,
        balance.stock_value
    );
}

fn render_ledger(page: &LedgerPage) {
    println!(
        "Page {}/{} ({} entries)",
        page.page, page.total_pages, page.total_items
    );
    for entry in &page.entries {
        println!(
            "#{} {} {} • {} -> {} • value {} -> {} • {}{}",
            entry.id,
            entry.posting_date,
            entry.posting_time,
            entry.quantity_delta,
            entry.balance_after,
            entry.value_delta,
            entry.value_after,
            entry.causing_document(),
            if entry.cancelled { " (cancelled)" } else { "" }
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
