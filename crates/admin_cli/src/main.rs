use std::error::Error;

use clap::{Args, Parser, Subcommand};
use engine::{Engine, TransferCmd};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ledger_admin")]
#[command(about = "Admin utilities for the wallet ledger (seed, inspect, audit)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./ledger.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Wallet(Wallet),
    /// Create funded wallets, printing their ids.
    Seed(SeedArgs),
    /// Move money between two wallets.
    Send(SendArgs),
    /// Print the most recent transfers.
    History(HistoryArgs),
    /// Recompute every balance from the transfer log.
    Audit,
}

#[derive(Args, Debug)]
struct Wallet {
    #[command(subcommand)]
    command: WalletCommand,
}

#[derive(Subcommand, Debug)]
enum WalletCommand {
    Create(WalletCreateArgs),
    Show(WalletShowArgs),
}

#[derive(Args, Debug)]
struct WalletCreateArgs {
    /// Wallet id, generated when omitted.
    #[arg(long)]
    id: Option<Uuid>,
    #[arg(long, default_value = "0")]
    balance: String,
}

#[derive(Args, Debug)]
struct WalletShowArgs {
    id: Uuid,
}

#[derive(Args, Debug)]
struct SeedArgs {
    #[arg(long)]
    wallets: usize,
    #[arg(long)]
    balance: String,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long)]
    from: Uuid,
    #[arg(long)]
    to: Uuid,
    #[arg(long)]
    amount: String,
    #[arg(long)]
    idempotency_key: Option<String>,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    #[arg(long, default_value_t = 10)]
    count: i64,
    /// Cursor printed by a previous call.
    #[arg(long)]
    cursor: Option<String>,
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::Wallet(Wallet {
            command: WalletCommand::Create(args),
        }) => {
            let wallet_id = engine.create_wallet(args.id, &args.balance).await?;
            println!("created wallet: {wallet_id}");
        }
        Command::Wallet(Wallet {
            command: WalletCommand::Show(args),
        }) => {
            let wallet = engine.balance(args.id).await?;
            println!("wallet:  {}", wallet.id);
            println!("balance: {}", wallet.balance);
            println!("opening: {}", wallet.opening_balance);
            println!("updated: {}", wallet.updated_at.to_rfc3339());
        }
        Command::Seed(args) => {
            for wallet_id in engine.seed_wallets(args.wallets, &args.balance).await? {
                println!("{wallet_id}");
            }
        }
        Command::Send(args) => {
            let mut cmd = TransferCmd::new(args.from, args.to, args.amount);
            if let Some(key) = args.idempotency_key {
                cmd = cmd.idempotency_key(key);
            }
            let transfer_id = engine.send(cmd).await?;
            println!("transfer: {transfer_id}");
        }
        Command::History(args) => {
            let page = engine
                .history_page(args.count, args.cursor.as_deref())
                .await?;
            for transfer in page.transfers {
                println!(
                    "{}  {}  {} -> {}  {}",
                    transfer.transferred_at.to_rfc3339(),
                    transfer.id,
                    transfer.from,
                    transfer.to,
                    transfer.amount
                );
            }
            if let Some(cursor) = page.next_cursor {
                println!("next: {cursor}");
            }
        }
        Command::Audit => {
            let report = engine.reconcile().await?;
            println!(
                "checked {} wallets, {} transfers",
                report.wallets_checked, report.transfers_checked
            );
            if !report.is_clean() {
                for drift in &report.drift {
                    eprintln!(
                        "drift: wallet {} stored {} expected {}",
                        drift.wallet_id, drift.stored, drift.expected
                    );
                }
                std::process::exit(1);
            }
            println!("ledger is consistent");
        }
    }

    Ok(())
}
