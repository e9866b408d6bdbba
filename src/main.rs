//! Turco's House POS CLI

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use turcos_pos_lib::cart::AddOnSelection;
use turcos_pos_lib::config::{self, PosConfig};
use turcos_pos_lib::receipt::{money, PrintOutput};
use turcos_pos_lib::{diagnostics, Catalog, LedgerStatus, PaymentMethod, PrintStatus, Register};

#[derive(Debug, Parser)]
#[command(name = "turcos-pos", about = "Turco's House point of sale", long_about = None)]
struct Cli {
    /// Data directory (database, config, logs, receipts)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start, show or end the event session
    Session(SessionCommand),
    /// List products and add-ons
    Catalog,
    /// Ring up and finalize one order
    Order(OrderArgs),
    /// List recorded orders
    Orders {
        /// Only orders not yet mirrored to the remote store
        #[arg(long)]
        pending: bool,
    },
    /// Print the receipt of a recorded order again
    Reprint {
        /// Order id, e.g. ORD-3f2a...
        order_id: String,
    },
    /// Show ledger, sync and build information
    Status,
    /// Push every pending order to the remote store again
    Resync,
}

#[derive(Debug, Args)]
struct SessionCommand {
    #[command(subcommand)]
    command: SessionSubcommand,
}

#[derive(Debug, Subcommand)]
enum SessionSubcommand {
    Start {
        #[arg(long)]
        seller: String,
        #[arg(long)]
        event: String,
    },
    Show,
    End,
}

#[derive(Debug, Args)]
struct OrderArgs {
    /// Customer name
    #[arg(long)]
    customer: String,

    /// Item as PRODUCT_ID[xQTY][:ADDON,ADDON...], repeatable
    #[arg(long = "item", required = true)]
    items: Vec<ItemSpec>,

    /// Gift order: total is zero
    #[arg(long)]
    gift: bool,

    /// Cash tendered
    #[arg(long, conflicts_with = "card", required_unless_present = "card")]
    cash: Option<Decimal>,

    /// Pay by card
    #[arg(long)]
    card: bool,
}

/// One `--item` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemSpec {
    product_id: u32,
    quantity: u32,
    add_ons: AddOnSelection,
}

impl FromStr for ItemSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, add_ons) = match s.trim().split_once(':') {
            Some((head, list)) => (
                head,
                AddOnSelection::new(list.split(',').map(str::trim).filter(|id| !id.is_empty())),
            ),
            None => (s.trim(), AddOnSelection::none()),
        };
        let (id, quantity) = match head.split_once(['x', 'X']) {
            Some((id, qty)) => {
                let quantity = qty
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("invalid quantity in {s:?}"))?;
                (id, quantity)
            }
            None => (head, 1),
        };
        if quantity == 0 {
            return Err(format!("quantity must be at least 1 in {s:?}"));
        }
        let product_id = id
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid product id in {s:?}"))?;
        Ok(Self {
            product_id,
            quantity,
            add_ons,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = config::resolve_data_dir(cli.data_dir.as_deref());
    let config = config::load(&data_dir)
        .with_context(|| format!("loading configuration from {}", data_dir.display()))?;
    let _guard = turcos_pos_lib::init_logging(&config.log_dir());
    info!("Starting Turco's House POS v{}", env!("CARGO_PKG_VERSION"));

    run(cli.command, &config).await
}

async fn run(command: Commands, config: &PosConfig) -> anyhow::Result<()> {
    if let Commands::Catalog = command {
        print_catalog(&Catalog::builtin(), &config.receipt.currency);
        return Ok(());
    }

    let mut register = Register::open(config, Catalog::builtin())
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let result = dispatch(&mut register, command, config);

    // Let queued pushes finish before the process exits.
    let stats = register.shutdown().await;
    if stats.attempted > 0 {
        println!(
            "sync: {} succeeded, {} failed{}",
            stats.succeeded,
            stats.failed,
            stats
                .last_error
                .map(|e| format!(" (last error: {e})"))
                .unwrap_or_default()
        );
    }
    result
}

fn dispatch(register: &mut Register, command: Commands, config: &PosConfig) -> anyhow::Result<()> {
    match command {
        Commands::Session(SessionCommand { command }) => match command {
            SessionSubcommand::Start { seller, event } => {
                let session = register.start_session(&seller, &event)?;
                println!("session started: {} @ {}", session.seller, session.event_name);
            }
            SessionSubcommand::Show => match register.resume_session()? {
                Some(session) => println!(
                    "{} @ {} (since {})",
                    session.seller,
                    session.event_name,
                    session.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                ),
                None => println!("no active session"),
            },
            SessionSubcommand::End => {
                register.end_session()?;
                println!("session ended");
            }
        },
        Commands::Catalog => print_catalog(register.catalog(), &config.receipt.currency),
        Commands::Order(args) => place_order(register, args, config)?,
        Commands::Orders { pending } => {
            let currency = config.receipt.currency.as_str();
            for order in register.orders(pending)? {
                println!(
                    "{}  {}  {:<16} {:>10}  {:<4}  {}",
                    order.id,
                    order.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    order.customer_name,
                    money(currency, order.total),
                    order.payment_method().as_str(),
                    if order.synced { "synced" } else { "pending" }
                );
            }
            println!("{} pending sync", register.unsynced_count()?);
        }
        Commands::Reprint { order_id } => {
            let output = register.reprint(&order_id)?;
            report_print_output(&output);
        }
        Commands::Status => {
            let report = diagnostics::status(register.ledger(), config, Some(register.sync_stats()))?;
            let value = json!({ "about": diagnostics::about(), "status": report });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Resync => {
            let queued = register.resync_pending()?;
            println!("{queued} pending orders queued for sync");
        }
    }
    Ok(())
}

fn place_order(register: &mut Register, args: OrderArgs, config: &PosConfig) -> anyhow::Result<()> {
    if register.resume_session()?.is_none() {
        bail!("no active event session; run `turcos-pos session start` first");
    }

    register.transaction_mut().set_customer_name(&args.customer)?;
    register.transaction_mut().set_gift(args.gift)?;
    for item in args.items {
        for add_on in item.add_ons.iter() {
            if register.catalog().add_on(add_on).is_none() {
                warn!(add_on, "Unknown add-on; it will not change the price");
            }
        }
        register.add_item(item.product_id, item.quantity, item.add_ons)?;
    }

    let total = register.begin_payment()?;
    match args.cash {
        Some(amount) => {
            let tx = register.transaction_mut();
            tx.select_payment(PaymentMethod::Cash)?;
            tx.set_cash(amount)?;
        }
        None => register.transaction_mut().select_payment(PaymentMethod::Card)?,
    }

    let currency = config.receipt.currency.as_str();
    let done = match register.finalize() {
        Ok(done) => done,
        Err(e) => {
            return Err(e).with_context(|| format!("order total is {}", money(currency, total)));
        }
    };

    println!("order {} total {}", done.order.id, money(currency, done.order.total));
    if let Some(change) = done.order.payment.change() {
        println!("change {}", money(currency, change));
    }
    match &done.ledger {
        LedgerStatus::Recorded => {}
        LedgerStatus::Failed(e) => println!("warning: order not saved locally: {e}"),
    }
    match &done.print {
        PrintStatus::Printed(output) => report_print_output(output),
        PrintStatus::Failed(e) => println!("warning: receipt not printed: {e}"),
    }
    println!("{} pending sync", register.unsynced_count()?);
    Ok(())
}

fn report_print_output(output: &PrintOutput) {
    if let PrintOutput::File(path) = output {
        println!("receipt written to {}", path.display());
    }
}

fn print_catalog(catalog: &Catalog, currency: &str) {
    println!("Products:");
    for product in catalog.products() {
        println!("  {:>2}  {:<18} {:>6}", product.id, product.name, money(currency, product.price));
    }
    println!("Add-ons:");
    for add_on in catalog.add_ons() {
        println!("  {:<12} {:<12} +{}", add_on.id, add_on.name, money(currency, add_on.price));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_item_spec_forms() {
        let plain: ItemSpec = "3".parse().unwrap();
        assert_eq!(plain.product_id, 3);
        assert_eq!(plain.quantity, 1);
        assert!(plain.add_ons.is_empty());

        let full: ItemSpec = "1x2:sin_sal, extra_shot".parse().unwrap();
        assert_eq!(full.product_id, 1);
        assert_eq!(full.quantity, 2);
        assert_eq!(full.add_ons, AddOnSelection::new(["extra_shot", "sin_sal"]));

        let addons_only: ItemSpec = "7:sin_hielo".parse().unwrap();
        assert_eq!(addons_only.quantity, 1);
        assert!(addons_only.add_ons.contains("sin_hielo"));
    }

    #[test]
    fn test_item_spec_rejects_bad_input() {
        assert!("".parse::<ItemSpec>().is_err());
        assert!("abc".parse::<ItemSpec>().is_err());
        assert!("1x0".parse::<ItemSpec>().is_err());
        assert!("1xmany".parse::<ItemSpec>().is_err());
    }

    #[test]
    fn test_order_args_require_a_payment() {
        let parsed = Cli::try_parse_from(["turcos-pos", "order", "--customer", "Ana", "--item", "1x2"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "turcos-pos", "order", "--customer", "Ana", "--item", "1x2", "--cash", "100",
        ])
        .unwrap();
        match parsed.command {
            Commands::Order(args) => {
                assert_eq!(args.cash, Some(Decimal::from(100)));
                assert!(!args.card);
                assert_eq!(args.items.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from([
            "turcos-pos", "order", "--customer", "Ana", "--item", "1", "--cash", "5", "--card",
        ])
        .is_err());
    }
}
