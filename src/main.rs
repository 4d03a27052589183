use clap::{Parser, Subcommand};
use ingestor::{
    commands::{collect, collect_snapshot, drain, init_schema},
    config::IngestConfig,
    context::AppContext,
};

#[derive(Parser)]
#[command(name = "ingestor")]
#[command(about = "Collects Grand Exchange price observations into PostgreSQL with a durable retry queue")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collector cycle for a single item's 5-minute timeseries
    Collect {
        /// Item ID to fetch (must be > 0)
        #[arg(long = "item-id", value_parser = clap::value_parser!(i64).range(1..))]
        item_id: i64,
    },
    /// Run one collector cycle for the 5-minute snapshot of all items
    CollectSnapshot {
        /// Unix timestamp of the 5-minute window to fetch
        timestamp: i64,
    },
    /// Retry queued observations once and rewrite the queue
    Drain,
    /// Create the price_observations table if it does not exist
    InitSchema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let config = IngestConfig::from_env()?;
    let app_context = AppContext::initialize(config);

    match command {
        Commands::Collect { item_id } => {
            collect::run(&app_context, item_id).await?;
        }
        Commands::CollectSnapshot { timestamp } => {
            collect_snapshot::run(&app_context, timestamp).await?;
        }
        Commands::Drain => {
            drain::run(&app_context).await?;
        }
        Commands::InitSchema => {
            init_schema::run(&app_context).await?;
        }
    }

    Ok(())
}
