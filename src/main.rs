//! xborder-crawler - Cross-border Korea/US storefront price crawler
//!
//! Routes products to regional storefronts and extracts prices with selector fallbacks.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};
use tracing_subscriber::EnvFilter;
use xborder_crawler::commands::{read_products_file, CrawlCommand};
use xborder_crawler::config::{BrowserBackend, Config, OutputFormat};
use xborder_crawler::format::Formatter;
use xborder_crawler::router::CategoryRouter;
use xborder_crawler::sites::{Region, SiteRegistry};

#[derive(Parser)]
#[command(
    name = "xborder-crawler",
    version,
    about = "Cross-border Korea/US storefront price crawler",
    long_about = "Routes each product to Korean or US storefronts by category, drives a browser backend to each search page, and extracts prices through ordered selector fallbacks."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Page backend (http, chrome, fixture)
    #[arg(short, long, global = true)]
    backend: Option<BrowserBackend>,

    /// Proxy URL (e.g., socks5://host:port)
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Delay between products in milliseconds
    #[arg(long, global = true)]
    delay: Option<u64>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Seed for reproducible timing jitter
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl prices for one or more products
    #[command(alias = "c")]
    Crawl {
        /// Product names
        names: Vec<String>,

        /// File with one product name per line
        #[arg(short = 'p', long)]
        products_file: Option<PathBuf>,
    },

    /// Show the category and regions a product name routes to
    Classify {
        /// Product name
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// List supported storefronts
    Sites {
        /// Only show storefronts in this region
        #[arg(short, long)]
        region: Option<Region>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
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
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy = Some(proxy);
    }
    if let Some(delay) = cli.delay {
        config.product_delay_ms = delay;
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(seed) = cli.seed {
        config.jitter_seed = Some(seed);
    }

    let formatter = Formatter::new(config.format);

    match cli.command {
        Commands::Crawl { mut names, products_file } => {
            if let Some(path) = products_file {
                names.extend(read_products_file(path)?);
            }
            if names.is_empty() {
                bail!("No products given; pass names or --products-file");
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; finishing the current storefront");
                    on_interrupt.cancel();
                }
            });

            CrawlCommand::new(config).execute(&names, &cancel).await?;
        }

        Commands::Classify { name } => {
            let name = name.join(" ");
            let router = CategoryRouter::new()
                .with_extra_keywords(&config.extra_cosmetic_keywords, &config.extra_electronics_keywords);
            println!("{}", formatter.format_classification(&name, router.classify(&name)));
        }

        Commands::Sites { region } => {
            let registry = SiteRegistry::builtin();
            let targets = match region {
                Some(region) => registry.targets_for(region),
                None => registry.all().to_vec(),
            };
            println!("{}", formatter.format_targets(&targets));
        }
    }

    Ok(())
}
