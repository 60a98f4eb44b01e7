//! tradefeed CLI - invoke the acquisition pipelines from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tradefeed::cancel::{cancel_pair, CancelToken};
use tradefeed::config::FeedConfig;
use tradefeed::price::{PriceCache, PriceClient};
use tradefeed::trades::{AtaDeriver, BalanceDeltaDecoder, RpcHistory, TradeService};

#[derive(Parser)]
#[command(name = "tradefeed", about = "Read-only price and trade-history pipelines")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "tradefeed.toml", env = "TRADEFEED_CONFIG")]
    config: String,

    /// Verbose logging
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the current price quote for the tracked pair
    Price,

    /// Fetch a page of decoded trades for a wallet
    Trades {
        /// Wallet address, base58
        #[arg(long)]
        wallet: String,

        /// Page size; 0 uses the configured default
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Cursor: only return trades strictly before this signature
        #[arg(long)]
        before: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = load_config(&cli.config)?;

    // Ctrl-C fires the cancellation signal observed by every suspension
    // point in the invoked pipeline
    let (cancel_handle, cancel_token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling");
            cancel_handle.cancel();
        }
    });

    match cli.command {
        Command::Price => run_price(&config, &cancel_token).await,
        Command::Trades {
            wallet,
            limit,
            before,
        } => run_trades(&config, &wallet, limit, before.as_deref()).await,
    }
}

async fn run_price(config: &FeedConfig, cancel: &CancelToken) -> Result<()> {
    let client = PriceClient::new(
        config.quote.clone(),
        config.price_bounds.clone(),
        config.rate_limit.clone(),
        config.retry.clone(),
    )?;
    let mut cache = PriceCache::new(&config.cache);

    const KEY: &str = "price";
    let quote = match cache.get(KEY) {
        Some(cached) => {
            info!(price = cached.price, "serving cached quote");
            cached
        }
        None => {
            let fresh = client.fetch_price(cancel).await?;
            cache.set(KEY, fresh.clone());
            fresh
        }
    };

    println!("{}", serde_json::to_string_pretty(&quote)?);
    cache.shutdown().await;
    Ok(())
}

async fn run_trades(
    config: &FeedConfig,
    wallet: &str,
    limit: usize,
    before: Option<&str>,
) -> Result<()> {
    let service = TradeService::new(
        RpcHistory::new(&config.rpc),
        BalanceDeltaDecoder::new(&config.trades.mint),
        Box::new(AtaDeriver::new(&config.trades.mint)?),
        &config.trades,
    )?;

    let page = service.get_trades(wallet, limit, before).await?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "tradefeed=debug,info"
    } else {
        "tradefeed=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<FeedConfig> {
    if std::path::Path::new(path).exists() {
        FeedConfig::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Ok(FeedConfig::default())
    }
}
