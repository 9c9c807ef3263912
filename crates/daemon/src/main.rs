// repo-puller: polling daemon entry point.

use anyhow::Context;
use repo_puller::config::PullerConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match PullerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return Err(error).context("failed to load configuration");
        }
    };

    repo_puller::runtime::run(config).await.inspect_err(|error| error!("{error:#}"))
}
