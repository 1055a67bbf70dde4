//! The garbage-collection daemon: runs a GC pass once, or forever on a
//! fixed interval.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use redisrwlock::{RedisConfig, RedisStore, RwlockClient};
use tracing::{error, info};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Garbage-collects crashed owners' locks, wait edges, and owner records"
)]
struct Cli {
    /// Run forever, collecting every `--interval` seconds, instead of once.
    #[arg(short, long)]
    repeat: bool,

    /// Seconds between passes when `--repeat` is set.
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Store connection URL. Falls back to $REDIS_URL, then a local default.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Key prefix, for running multiple logical services against one store.
    #[arg(long, default_value = "")]
    prefix: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = RedisConfig::new(&cli.redis_url).with_prefix(&cli.prefix);
    let store = match RedisStore::new(&config) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to connect to store");
            return ExitCode::FAILURE;
        }
    };

    let client = match RwlockClient::new(store, cli.prefix.clone(), hostname(), std::process::id()).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to register client connection");
            return ExitCode::FAILURE;
        }
    };

    if cli.repeat {
        info!(interval = cli.interval, "starting GC daemon loop");
        loop {
            tokio::select! {
                result = run_pass(&client) => {
                    if let Err(code) = result {
                        return code;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received interrupt, shutting down");
                    return ExitCode::SUCCESS;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(cli.interval)) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("received interrupt, shutting down");
                    return ExitCode::SUCCESS;
                }
            }
        }
    } else {
        match run_pass(&client).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(code) => code,
        }
    }
}

async fn run_pass(client: &RwlockClient<RedisStore>) -> Result<(), ExitCode> {
    match client.gc().await {
        Ok(summary) => {
            info!(%summary, "gc pass complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "gc pass failed");
            Err(ExitCode::FAILURE)
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
