#![doc = include_str!("../README.md")]

mod runner;

use runner::batch::{load_batch, run_batch, save_batch};
use runner::config::{CliArgs, RunnerConfig};
use runner::grpc::EchoClient;
use runner::limiter::ConcurrencyLimiter;
use runner::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let providers = init_telemetry()?;

    let args = CliArgs::parse_normalized();
    let config = RunnerConfig::try_from(args)?;
    tracing::info!(
        "Processing from {} to {} ({} queries in flight, {} transport)",
        config.input.display(),
        config.output.display(),
        config.query_limit,
        config.transport
    );

    let specs = load_batch(&config.input).await?;
    let limiter = ConcurrencyLimiter::new(config.query_limit);
    let echo = EchoClient::new(config.transport);

    let results = run_batch(&specs, &limiter, &echo).await?;
    save_batch(&config.output, &specs, &results).await?;

    tracing::info!("Done.");
    providers.shutdown();
    Ok(())
}
