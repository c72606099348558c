use anyhow::Result;
use clap::{ArgAction, Parser};
use searchload_target::{TargetConfig, TargetServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "searchload-target", author, version, about = "Bounded product search service", long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value_t = TargetConfig::default().listen)]
    listen: String,

    /// Number of products to generate at start-up.
    #[arg(long, default_value_t = TargetConfig::default().catalog_size)]
    catalog_size: usize,

    /// Seed for catalog generation.
    #[arg(long)]
    seed: Option<u64>,

    /// Do not expose Prometheus counters on /metrics.
    #[arg(long, action = ArgAction::SetTrue)]
    no_metrics: bool,

    /// Increase logging verbosity.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "searchload_target=debug"
    } else {
        "searchload_target=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = TargetConfig {
        listen: args.listen,
        catalog_size: args.catalog_size,
        seed: args.seed,
        metrics: !args.no_metrics,
    };
    let server = TargetServer::bind(&config).await?;
    info!(listener = %server.local_addr(), "Search target ready");
    server.run().await
}
