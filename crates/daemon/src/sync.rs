// Poll loop: align branch, fetch, compare heads, fast-forward, sleep.
//
// Git command failures inside a tick are logged and absorbed; the next tick
// retries. A tick error whose cause is not a git command failure (the binary
// cannot be spawned) ends the loop so the process can exit non-zero.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::git::worker::{CommandExecutor, GitWorkerError, ProcessCommandExecutor};
use crate::repo::{RepositoryHandle, SyncState};

/// Result of a tick that completed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Local and remote heads matched; nothing was pulled.
    UpToDate { head: String },
    /// The local branch was fast-forwarded.
    Pulled { from: String, to: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStep {
    Checkout,
    Fetch,
    Resolve,
    Pull,
}

impl Display for TickStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TickStep::Checkout => "checkout",
            TickStep::Fetch => "fetch",
            TickStep::Resolve => "resolve",
            TickStep::Pull => "pull",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{step} failed on branch `{branch}`: {source}")]
pub struct TickError {
    pub step: TickStep,
    pub branch: String,
    #[source]
    pub source: GitWorkerError,
}

impl TickError {
    /// Command failures and timeouts are retried on the next tick.
    pub fn is_recoverable(&self) -> bool {
        !self.source.is_spawn_failure()
    }
}

pub struct SyncLoop<E = ProcessCommandExecutor> {
    handle: RepositoryHandle<E>,
    interval: Duration,
}

impl<E: CommandExecutor> SyncLoop<E> {
    pub fn new(handle: RepositoryHandle<E>, interval: Duration) -> Self {
        Self { handle, interval }
    }

    pub fn handle(&self) -> &RepositoryHandle<E> {
        &self.handle
    }

    /// Tick until `shutdown` changes. Returns an error only for
    /// unrecoverable tick failures.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), TickError> {
        loop {
            info!(branch = %self.handle.branch(), "checking for updates");
            match self.tick().await {
                Ok(TickOutcome::UpToDate { head }) => {
                    info!(branch = %self.handle.branch(), %head, "no new commits");
                }
                Ok(TickOutcome::Pulled { from, to }) => {
                    info!(branch = %self.handle.branch(), %from, %to, "pull complete");
                }
                Err(error) if error.is_recoverable() => {
                    error!(
                        branch = %error.branch,
                        step = %error.step,
                        error = %error.source,
                        "error checking for updates"
                    );
                }
                Err(error) => {
                    error!(
                        branch = %error.branch,
                        step = %error.step,
                        error = %error.source,
                        "unrecoverable error, stopping sync loop"
                    );
                    return Err(error);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.changed() => {
                    info!("sync loop shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// One poll: realign the branch, fetch, compare, pull when behind.
    pub async fn tick(&mut self) -> Result<TickOutcome, TickError> {
        let branch = self.handle.branch().to_string();
        let remote_ref = format!("refs/remotes/{}/{}", self.handle.remote_name(), branch);
        let fail = |step: TickStep| {
            let branch = branch.clone();
            move |source| TickError { step, branch, source }
        };

        let worker = self.handle.worker();
        let current = worker.current_branch().await.map_err(fail(TickStep::Checkout))?;
        if current != branch {
            info!(from = %current, to = %branch, "switching to tracked branch");
            worker.checkout(&branch).await.map_err(fail(TickStep::Checkout))?;
        }

        worker.fetch(self.handle.remote_name()).await.map_err(fail(TickStep::Fetch))?;
        let local_head = worker.rev_parse("HEAD").await.map_err(fail(TickStep::Resolve))?;
        let remote_head = worker.rev_parse(&remote_ref).await.map_err(fail(TickStep::Resolve))?;

        if local_head == remote_head {
            self.handle.record_heads(local_head.clone(), remote_head);
            self.handle.set_state(SyncState::UpToDate);
            return Ok(TickOutcome::UpToDate { head: local_head });
        }

        info!(
            branch = %branch,
            local = %local_head,
            remote = %remote_head,
            "new commits available, pulling"
        );
        self.handle.record_heads(local_head.clone(), remote_head.clone());
        self.handle.set_state(SyncState::BehindOrInvalidBranch);

        let worker = self.handle.worker();
        worker.pull_ff_only(&branch).await.map_err(fail(TickStep::Pull))?;
        let head = worker.rev_parse("HEAD").await.map_err(fail(TickStep::Resolve))?;

        self.handle.record_heads(head.clone(), remote_head);
        self.handle.set_state(SyncState::UpToDate);
        Ok(TickOutcome::Pulled { from: local_head, to: head })
    }
}
