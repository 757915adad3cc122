use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fmd_accounts::{AccountConfig, AccountManager};
use tracing::info;

#[derive(Parser)]
#[command(name = "fmd-admin")]
#[command(about = "Inspect and maintain the FMD account store", long_about = None)]
struct Cli {
    /// Overrides FMD_DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the store, applying migrations and any pending legacy import
    Migrate,
    /// Account count and highest surrogate key
    Stats,
    /// History sizes and delivery settings of one account
    Show { uid: String },
    /// Delete an account with its locations and pictures
    Delete { uid: String },
}

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fmd_admin=info,fmd_accounts=info,fmd_db=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Config
    let mut config = AccountConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.storage_dir = dir;
    }

    let manager = AccountManager::open(&config)?;
    info!("Account store ready in {}", config.storage_dir.display());

    match cli.command {
        Command::Migrate => {
            info!("Migrations applied, {} accounts", manager.account_count()?);
        }
        Command::Stats => {
            let last = manager
                .last_sequence()?
                .map_or_else(|| "none".to_string(), |id| id.to_string());
            println!("accounts: {}", manager.account_count()?);
            println!("last id:  {}", last);
        }
        Command::Show { uid } => {
            println!("uid:        {}", uid);
            println!("locations:  {}", manager.location_count(&uid)?);
            println!("pictures:   {}", manager.picture_count(&uid)?);
            println!("push url:   {}", manager.push_url(&uid)?);
            println!("command:    {}", manager.command_to_user(&uid)?);
        }
        Command::Delete { uid } => {
            manager.delete_account(&uid)?;
            println!("deleted {}", uid);
        }
    }

    Ok(())
}
