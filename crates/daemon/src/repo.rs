// Working copy handle and initializer.
//
// A working copy is either opened (path contains `.git`) or cloned (path
// absent or empty). Any other existing content is left alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::PullerConfig;
use crate::git::worker::{CommandExecutor, GitWorker, GitWorkerError, ProcessCommandExecutor};

/// What the initializer found at the working copy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A git working copy already existed.
    Opened,
    /// The path was absent or empty and the remote was cloned into it.
    Cloned,
    /// The path holds other files; nothing was touched.
    DirectoryNotEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Cloned,
    Opened,
    /// Heads differed (or the branch had to be realigned) on the last tick.
    BehindOrInvalidBranch,
    UpToDate,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("`{}` is not empty and is not a git working copy", .path.display())]
    DirectoryNotEmpty { path: PathBuf },
    #[error("failed to prepare `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to clone branch `{branch}`: {source}")]
    Clone {
        branch: String,
        #[source]
        source: GitWorkerError,
    },
    #[error("failed to open working copy at `{}`: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: GitWorkerError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalPath {
    Missing,
    Empty,
    WorkingCopy,
    Occupied,
}

fn inspect(path: &Path) -> io::Result<LocalPath> {
    if path.join(".git").is_dir() {
        return Ok(LocalPath::WorkingCopy);
    }
    if !path.exists() {
        return Ok(LocalPath::Missing);
    }
    if !path.is_dir() {
        return Ok(LocalPath::Occupied);
    }
    let mut entries = fs::read_dir(path)?;
    Ok(if entries.next().is_none() { LocalPath::Empty } else { LocalPath::Occupied })
}

/// Make sure a working copy exists at `config.local_path`, cloning the
/// tracked branch when the path is absent or empty.
pub async fn ensure_working_copy<E: CommandExecutor>(
    config: &PullerConfig,
    worker: &GitWorker<E>,
) -> Result<InitOutcome, InitError> {
    let path = worker.repo_path();
    let io_error = |source| InitError::Io { path: path.to_path_buf(), source };

    match inspect(path).map_err(io_error)? {
        LocalPath::WorkingCopy => {
            info!(path = %path.display(), "valid git repository found");
            Ok(InitOutcome::Opened)
        }
        LocalPath::Occupied => {
            warn!(
                path = %path.display(),
                "directory is not empty and is not a git repository, refusing to clone into it"
            );
            Ok(InitOutcome::DirectoryNotEmpty)
        }
        LocalPath::Missing | LocalPath::Empty => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(io_error)?;
            }

            info!(remote = %config.remote, path = %path.display(), "cloning repository");
            worker
                .clone_branch(&config.branch)
                .await
                .map_err(|source| InitError::Clone { branch: config.branch.clone(), source })?;
            info!(branch = %config.branch, "repository cloned and branch checked out");

            forget_clone_credentials(config, worker).await;
            Ok(InitOutcome::Cloned)
        }
    }
}

/// Clone stores the URL it was given as `origin`. Put the credential-free
/// URL back so the token never lives in `.git/config`.
async fn forget_clone_credentials<E: CommandExecutor>(
    config: &PullerConfig,
    worker: &GitWorker<E>,
) {
    if config.remote.authenticated() == config.remote.as_str() {
        return;
    }
    if let Err(error) = worker.set_remote_url(&config.remote_name, config.remote.as_str()).await {
        warn!(%error, "failed to remove credentials from cloned remote configuration");
    }
}

/// The local working copy tracked by the sync loop.
#[derive(Debug)]
pub struct RepositoryHandle<E = ProcessCommandExecutor> {
    worker: GitWorker<E>,
    branch: String,
    remote_name: String,
    local_head: String,
    remote_head: Option<String>,
    state: SyncState,
}

impl<E: CommandExecutor> RepositoryHandle<E> {
    /// Ensure the working copy exists, then open it.
    pub async fn initialize(config: &PullerConfig, worker: GitWorker<E>) -> Result<Self, InitError> {
        let state = match ensure_working_copy(config, &worker).await? {
            InitOutcome::Opened => SyncState::Opened,
            InitOutcome::Cloned => SyncState::Cloned,
            InitOutcome::DirectoryNotEmpty => {
                return Err(InitError::DirectoryNotEmpty { path: worker.repo_path().to_path_buf() })
            }
        };
        Self::open(config, worker, state).await
    }

    async fn open(
        config: &PullerConfig,
        worker: GitWorker<E>,
        state: SyncState,
    ) -> Result<Self, InitError> {
        let local_head = worker.rev_parse("HEAD").await.map_err(|source| InitError::Open {
            path: worker.repo_path().to_path_buf(),
            source,
        })?;

        Ok(Self {
            worker,
            branch: config.branch.clone(),
            remote_name: config.remote_name.clone(),
            local_head,
            remote_head: None,
            state,
        })
    }

    pub fn worker(&self) -> &GitWorker<E> {
        &self.worker
    }

    pub fn path(&self) -> &Path {
        self.worker.repo_path()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn local_head(&self) -> &str {
        &self.local_head
    }

    /// Remote branch head seen by the most recent successful fetch.
    pub fn remote_head(&self) -> Option<&str> {
        self.remote_head.as_deref()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SyncState) {
        self.state = state;
    }

    pub(crate) fn record_heads(&mut self, local_head: String, remote_head: String) {
        self.local_head = local_head;
        self.remote_head = Some(remote_head);
    }
}
