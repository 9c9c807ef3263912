use std::future::Future;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::PullerConfig;
use crate::git::worker::{CommandExecutor, GitWorker};
use crate::repo::RepositoryHandle;
use crate::sync::SyncLoop;

/// Run the puller until SIGINT/SIGTERM.
pub async fn run(config: PullerConfig) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Run the puller until `shutdown` resolves. Errors are fatal: bad working
/// copy path, failed clone or open, or an unrecoverable tick.
pub async fn run_until<F>(config: PullerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let worker = GitWorker::new(&config.local_path, config.remote.clone())
        .with_timeout(config.command_timeout);
    run_with_worker(&config, worker, shutdown).await
}

async fn run_with_worker<E, F>(
    config: &PullerConfig,
    worker: GitWorker<E>,
    shutdown: F,
) -> Result<()>
where
    E: CommandExecutor,
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        remote = %config.remote,
        path = %config.local_path.display(),
        branch = %config.branch,
        interval_secs = config.check_interval.as_secs(),
        "starting repository puller"
    );
    if config.remote.credentials_ignored() {
        warn!(
            remote = %config.remote,
            "USERNAME/PAT_TOKEN only apply to http(s) remotes, ignoring them"
        );
    }

    let handle = RepositoryHandle::initialize(config, worker)
        .await
        .context("failed to initialize working copy")?;
    info!(path = %handle.path().display(), head = %handle.local_head(), "working copy ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = shutdown_tx.send(true);
    });

    SyncLoop::new(handle, config.check_interval)
        .run(shutdown_rx)
        .await
        .context("sync loop stopped")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
