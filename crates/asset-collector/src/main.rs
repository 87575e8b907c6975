//! Asset collector CLI.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asset_collector::modules::{self, Context, QuoteSource};
use asset_collector::{mask_database_url, CollectorConfig, CollectorError, CoordinatorConfig, RunSummary};
use asset_core::{Normalizer, Venue};
use asset_data::{ChunkedSink, Database, PgStore};

#[derive(Parser)]
#[command(name = "asset-collector")]
#[command(about = "Market price and reference data collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Stop scheduling new entities after this many seconds
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Entities fetched concurrently (overrides INGEST_CONCURRENCY)
    #[arg(long, global = true)]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Latest prices into latest_prices
    Quotes {
        #[arg(long, value_enum)]
        market: MarketArg,

        #[arg(long, value_enum, default_value = "yahoo")]
        source: SourceArg,

        /// Comma separated symbols (e.g. "AAPL,MSFT")
        #[arg(long, conflicts_with = "all")]
        symbols: Option<String>,

        /// Every known symbol of the market
        #[arg(long)]
        all: bool,
    },

    /// Gold futures (GC=F) latest price
    Gold,

    /// Daily OHLCV history into stock_prices
    History {
        #[arg(long, conflicts_with = "all")]
        symbols: Option<String>,

        /// Every stored S&P 500 constituent
        #[arg(long)]
        all: bool,

        /// Years of history (default HISTORY_YEARS or 5)
        #[arg(long)]
        years: Option<u32>,
    },

    /// SET symbol directory into set_symbols
    SyncSetSymbols,

    /// S&P 500 constituents into sp500_symbols
    SyncSp500,

    /// Create the schema and tables
    InitDb,
}

#[derive(Clone, Copy, ValueEnum)]
enum MarketArg {
    Us,
    Set,
    Commodity,
}

impl From<MarketArg> for Venue {
    fn from(market: MarketArg) -> Self {
        match market {
            MarketArg::Us => Venue::Us,
            MarketArg::Set => Venue::Set,
            MarketArg::Commodity => Venue::Commodity,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Yahoo,
    SetWeb,
}

impl From<SourceArg> for QuoteSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Yahoo => QuoteSource::Yahoo,
            SourceArg::SetWeb => QuoteSource::SetWeb,
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("asset_collector={level},asset_data={level},asset_core={level}").into()
    });

    // stdout carries the run summary, logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = CollectorConfig::from_env()?;
    init_tracing(&cli.log_level, cli.log_json || config.log_json);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "asset collector starting");
    tracing::debug!(database_url = %mask_database_url(&config.database.url), "configuration loaded");

    let registry = Context::registry(&config)?;
    let db = Database::connect(&config.database.pool_config())
        .await
        .context("database connection failed")?;
    let store = PgStore::new(db.pool().clone(), &config.database.schema);
    let sink = Arc::new(ChunkedSink::new(Arc::new(store.clone()), config.ingest.chunk_size));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing in-flight entities");
                cancel.cancel();
            }
        });
    }

    let coordinator = CoordinatorConfig {
        concurrency: cli.concurrency.unwrap_or(config.ingest.concurrency).max(1),
        request_delay: config.ingest.request_delay(),
        retry: config.ingest.retry(),
        deadline: cli.deadline_secs.map(Duration::from_secs),
    };

    let ctx = Context {
        store,
        sink,
        normalizer: Normalizer::new(Arc::new(registry)),
        coordinator,
        cancel,
        config,
    };

    let exit = run_command(&ctx, cli.command).await;
    db.close().await;
    exit
}

async fn run_command(ctx: &Context, command: Commands) -> anyhow::Result<ExitCode> {
    ctx.init_db().await?;

    let (operation, result) = match command {
        Commands::InitDb => {
            tracing::info!("database initialized");
            println!("{}", json!({ "status": "completed", "operation": "init-db" }));
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Quotes {
            market,
            source,
            symbols,
            all,
        } => (
            "quotes",
            modules::collect_quotes(ctx, market.into(), source.into(), symbols.as_deref(), all)
                .await,
        ),
        Commands::Gold => (
            "gold",
            modules::collect_quotes(ctx, Venue::Commodity, QuoteSource::Yahoo, Some("GC=F"), false)
                .await,
        ),
        Commands::History {
            symbols,
            all,
            years,
        } => (
            "history",
            modules::collect_history(ctx, symbols.as_deref(), all, years).await,
        ),
        Commands::SyncSetSymbols => ("sync-set-symbols", modules::sync_set_symbols(ctx).await),
        Commands::SyncSp500 => ("sync-sp500", modules::sync_sp500(ctx).await),
    };

    report(operation, result)
}

fn report(operation: &str, result: Result<RunSummary, CollectorError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(summary) => {
            summary.log_summary(operation);
            println!(
                "{}",
                json!({ "status": "completed", "operation": operation, "summary": summary })
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(CollectorError::Aborted(aborted)) => {
            aborted.summary.log_summary(operation);
            tracing::error!(operation = operation, kind = %aborted.kind, cause = %aborted.cause, "run aborted");
            println!(
                "{}",
                json!({
                    "status": "aborted",
                    "operation": operation,
                    "kind": aborted.kind,
                    "cause": aborted.cause,
                    "summary": aborted.summary,
                })
            );
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e.into()),
    }
}
