// Puller configuration.
//
// Read once from the environment at startup and then passed by reference
// into the initializer and the sync loop. Nothing here is global.

use std::env::VarError;
use std::path::PathBuf;
use std::time::Duration;

use crate::git::worker::DEFAULT_COMMAND_TIMEOUT;
use crate::remote::{Credentials, RemoteUrl};

pub const DEFAULT_LOCAL_PATH: &str = "/repo";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_BRANCH: &str = "main";
pub const REMOTE_NAME: &str = "origin";

/// Immutable daemon settings.
///
/// Constructed via [`PullerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct PullerConfig {
    /// Remote repository, carrying credentials when both `USERNAME` and
    /// `PAT_TOKEN` are set.
    pub remote: RemoteUrl,
    /// Working copy location.
    pub local_path: PathBuf,
    /// Delay between sync ticks.
    pub check_interval: Duration,
    /// Tracked branch.
    pub branch: String,
    /// Remote whose tracking refs receive fetched branches.
    pub remote_name: String,
    /// Upper bound for a single git command.
    pub command_timeout: Duration,
}

impl PullerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `REPO_URL` | *(required)* |
    /// | `LOCAL_PATH` | `/repo` |
    /// | `CHECK_INTERVAL` | `300` seconds |
    /// | `BRANCH` | `main` |
    /// | `USERNAME` | *(none)* |
    /// | `PAT_TOKEN` | *(none)* |
    /// | `GIT_TIMEOUT` | `120` seconds |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    pub fn from_env_fn<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        // Empty values count as unset.
        let var = |key: &str| env(key).ok().filter(|value| !value.trim().is_empty());

        let repo_url = var("REPO_URL").ok_or(ConfigError::MissingRepoUrl)?;
        let username = var("USERNAME").unwrap_or_default();
        let token = var("PAT_TOKEN").unwrap_or_default();
        let remote = RemoteUrl::new(repo_url.trim(), Credentials::from_parts(&username, &token));

        let check_interval = match var("CHECK_INTERVAL") {
            Some(value) => parse_seconds("CHECK_INTERVAL", &value)?,
            None => DEFAULT_CHECK_INTERVAL,
        };
        let command_timeout = match var("GIT_TIMEOUT") {
            Some(value) => parse_seconds("GIT_TIMEOUT", &value)?,
            None => DEFAULT_COMMAND_TIMEOUT,
        };

        Ok(Self {
            remote,
            local_path: var("LOCAL_PATH").map(PathBuf::from).unwrap_or(DEFAULT_LOCAL_PATH.into()),
            check_interval,
            branch: var("BRANCH").unwrap_or_else(|| DEFAULT_BRANCH.into()),
            remote_name: REMOTE_NAME.into(),
            command_timeout,
        })
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds { name, value: value.to_string() }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("REPO_URL is required")]
    MissingRepoUrl,
    #[error("{name} must be a positive number of seconds, got `{value}`")]
    InvalidSeconds { name: &'static str, value: String },
}
