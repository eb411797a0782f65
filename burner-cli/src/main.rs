//! Burner CLI - manage disposable signing accounts.
//!
//! Burners are kept in a data directory on disk. Chain calls go to an
//! in-process devnet that starts empty on every run, so `restore` on a store
//! written by a previous run reports a chain reset.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use burner::prelude::*;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Balance minted to the master account on the devnet, in prefund units.
const MASTER_PREFUNDS: u64 = 1_000;

/// Burner - disposable on-chain signing accounts
#[derive(Parser)]
#[command(name = "burner")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "BURNER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory burners are stored in
    #[arg(short, long, env = "BURNER_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Master account private key (hex) used to fund new burners
    #[arg(long, env = "BURNER_MASTER_KEY", global = true, hide_env_values = true)]
    master_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, fund and deploy a new burner, and make it active
    Create,

    /// List stored burners
    List,

    /// Make a burner the active one
    Select(AddressArgs),

    /// Show a stored burner without selecting it
    Show(AddressArgs),

    /// Restore the active burner; on the per-run devnet this always discards stored burners
    ///
    /// The devnet starts empty on every run, so the probe never finds burners
    /// stored by an earlier run and the store is cleared.
    Restore,

    /// Manage configuration
    Config(ConfigArgs),
}

/// A burner address argument
#[derive(Args)]
struct AddressArgs {
    /// Burner address
    address: Address,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration file path
    Path,
    /// Write the default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "burner={level},burner_cli={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.json"));

    if let Commands::Config(args) = cli.command {
        return cmd_config(args, &config_file).await;
    }

    let config = load_config(&config_file).await?;
    let manager = open_manager(&data_dir, config, cli.master_key.as_deref()).await?;

    match cli.command {
        Commands::Create => cmd_create(&manager).await,
        Commands::List => cmd_list(&manager).await,
        Commands::Select(args) => cmd_select(&manager, args.address).await,
        Commands::Show(args) => cmd_show(&manager, args.address).await,
        Commands::Restore => cmd_restore(&manager).await,
        Commands::Config(_) => Ok(()),
    }
}

/// Default data directory, `~/.burner`.
fn default_data_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".burner")
}

/// Load the config file if present, then apply environment overrides.
async fn load_config(path: &Path) -> Result<BurnerConfig> {
    let config = if path.exists() {
        BurnerConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))?
    } else {
        BurnerConfig::default()
    };
    Ok(config.with_env_overrides()?)
}

/// Build a manager over the data directory and a fresh devnet.
async fn open_manager(
    data_dir: &Path,
    config: BurnerConfig,
    master_key: Option<&str>,
) -> Result<BurnerManager> {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.declare_class(config.account_class_hash).await;

    let mut builder = BurnerManager::builder()
        .ledger(ledger.clone())
        .storage(Arc::new(FileStorage::new(data_dir)));

    if let Some(key) = master_key {
        let master = Account::from_private_key_hex(ledger.clone(), key)
            .context("invalid master key")?;
        let balance = config
            .prefund_amount
            .saturating_mul(U256::from(MASTER_PREFUNDS));
        ledger.mint(master.address(), balance).await;
        tracing::debug!(address = %master.address(), "master account funded on devnet");
        builder = builder.master(master);
    }

    Ok(builder.config(config).build()?)
}

/// Create a burner.
async fn cmd_create(manager: &BurnerManager) -> Result<()> {
    match manager.create().await {
        Ok(burner) => {
            println!("Burner created: {}", burner.address());
            Ok(())
        }
        Err(BurnerError::DeploymentFailed {
            address, source, ..
        }) => {
            println!("Burner {address} was funded but its deployment failed: {source}");
            println!("The prefund stays at that address.");
            Err(anyhow::anyhow!("deployment failed"))
        }
        Err(BurnerError::PersistFailed {
            address, orphan, ..
        }) => {
            println!("Burner {address} was deployed but could not be stored, retrying");
            let burner = manager.resume_deployment(*orphan).await?;
            println!("Burner created: {}", burner.address());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// List burners.
async fn cmd_list(manager: &BurnerManager) -> Result<()> {
    let entries = manager.list().await?;
    if entries.is_empty() {
        println!("No burners. Run 'burner create' to make one.");
        return Ok(());
    }
    for entry in entries {
        let marker = if entry.active { "*" } else { " " };
        println!("{marker} {}", entry.address);
    }
    Ok(())
}

/// Select a burner.
async fn cmd_select(manager: &BurnerManager, address: Address) -> Result<()> {
    let burner = manager.select(address).await?;
    println!("Active burner: {}", burner.address());
    Ok(())
}

/// Show a burner.
async fn cmd_show(manager: &BurnerManager, address: Address) -> Result<()> {
    let burner = manager.get(address).await?;
    let active = manager
        .list()
        .await?
        .iter()
        .any(|e| e.address == address && e.active);

    println!("Address:    {}", burner.address());
    println!("Public key: {}", burner.public_key());
    println!("Active:     {}", if active { "yes" } else { "no" });
    Ok(())
}

/// Restore the active burner.
async fn cmd_restore(manager: &BurnerManager) -> Result<()> {
    match manager.restore_active_on_startup().await {
        Ok(Some(burner)) => println!("Active burner: {}", burner.address()),
        Ok(None) => println!("No active burner."),
        Err(e) if e.is_recoverable() => println!("warning: {e}"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_file: &Path) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            let config = load_config(config_file).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Init { force } => {
            if config_file.exists() && !force {
                println!("Configuration already exists at: {}", config_file.display());
                println!("Use --force to overwrite.");
                return Ok(());
            }
            BurnerConfig::default().save(config_file).await?;
            println!("Configuration created: {}", config_file.display());
        }
        ConfigCommands::Validate => match load_config(config_file).await {
            Ok(config) => match config.validate() {
                Ok(()) => println!("Configuration is valid"),
                Err(e) => println!("error: {e}"),
            },
            Err(e) => println!("error: {e:#}"),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_restore_help_warns_about_devnet() {
        let cli = Cli::command();
        let restore = cli.find_subcommand("restore").unwrap();
        let about = restore.get_about().unwrap().to_string();
        assert!(about.contains("always discards stored burners"));
    }
}
