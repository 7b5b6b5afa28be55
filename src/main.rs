//! catalog-crawler - Crawls storefront category taxonomies into a staged
//! SQLite catalog and publishes them atomically.

use anyhow::Result;
use catalog_crawler::commands::{AdminCommand, RunCommand, TreeCommand};
use catalog_crawler::config::{Config, DriverKind, OutputFormat, RootSpec};
use catalog_crawler::format::Formatter;
use catalog_crawler::template::Storefront;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "catalog-crawler",
    version,
    about = "Crawls storefront category taxonomies and republishes them atomically",
    long_about = "Crawls the category menu and listing filters of a storefront, stages the \
                  resulting taxonomy and swaps it into the published catalog in one transaction."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Storefront preset
    #[arg(short, long, global = true)]
    storefront: Option<Storefront>,

    /// Browser driver (http, chrome)
    #[arg(long, global = true)]
    driver: Option<DriverKind>,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true, env = "CATALOG_PROXY")]
    proxy: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl all roots and publish the result
    #[command(alias = "r")]
    Run {
        /// Root to crawl as LABEL=URL (repeatable); replaces configured roots
        #[arg(long = "root", value_parser = parse_root)]
        roots: Vec<RootSpec>,

        /// Skip the snapshot of the published catalog
        #[arg(long)]
        no_snapshot: bool,
    },

    /// Print the catalog
    #[command(alias = "t")]
    Tree {
        /// Show the staged catalog instead of the published one
        #[arg(long)]
        staged: bool,
    },

    /// Show the run lock and node counts
    Status,

    /// Force-release the run lock
    Unlock,

    /// Drop staged data left by a failed run
    Discard,

    /// List supported storefronts
    Storefronts,
}

fn parse_root(s: &str) -> Result<RootSpec, String> {
    let (label, url) =
        s.split_once('=').ok_or_else(|| format!("Expected LABEL=URL, got '{}'", s))?;
    if label.trim().is_empty() || url.trim().is_empty() {
        return Err(format!("Expected LABEL=URL, got '{}'", s));
    }
    Ok(RootSpec { label: label.trim().to_string(), url: url.trim().to_string() })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(storefront) = cli.storefront {
        config.storefront = storefront;
    }
    if let Some(database) = cli.database {
        config.database = Some(database);
    }
    if let Some(driver) = cli.driver {
        config.driver = driver;
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }

    match cli.command {
        Commands::Run { roots, no_snapshot } => {
            if !roots.is_empty() {
                config.roots = roots;
            }
            if no_snapshot {
                config.crawl.snapshot_before_swap = false;
            }

            let formatter = Formatter::new(config.format);
            let summary = RunCommand::new(config).execute().await?;
            println!("{}", formatter.format_summary(&summary));

            if !summary.swapped() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Tree { staged } => {
            let output = TreeCommand::new(config).execute(staged)?;
            println!("{}", output);
        }

        Commands::Status => {
            println!("{}", AdminCommand::new(config).status()?);
        }

        Commands::Unlock => {
            println!("{}", AdminCommand::new(config).unlock()?);
        }

        Commands::Discard => {
            println!("{}", AdminCommand::new(config).discard()?);
        }

        Commands::Storefronts => {
            println!("Supported storefronts:\n");
            println!("{:<8} {:<20} {:<10}", "Code", "Domain", "Name");
            println!("{:-<8} {:-<20} {:-<10}", "", "", "");

            for storefront in Storefront::all() {
                println!(
                    "{:<8} {:<20} {:<10}",
                    storefront.to_string(),
                    storefront.domain(),
                    storefront.display_name()
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
