use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use latest_commits::{Auth, RetryPolicy, RunOptions, Timezone, TimezoneError};
use serde::{Deserialize, Serialize};

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "ARTIFACTORY_TOKEN";

pub const DEFAULT_OUT: &str = "data/builds";
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_JOBS: usize = 1;

/// Optional defaults file. Every key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileConfig {
    pub out: Option<PathBuf>,
    pub retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub backoff_ms: Option<u64>,
    pub jobs: Option<usize>,
    pub utc_offset: Option<String>,
}

/// Flags that can also be set in the config file. Flags win.
#[derive(Debug, Clone, Default, Args)]
pub struct Tuning {
    /// Output root directory [default: data/builds]
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Maximum attempts per target [default: 3]
    #[arg(long)]
    pub retries: Option<u32>,
    /// Per-request timeout in seconds [default: 30]
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,
    /// Exponential backoff base in milliseconds [default: 1000]
    #[arg(long, value_name = "MS")]
    pub backoff_ms: Option<u64>,
    /// Targets fetched in parallel [default: 1]
    #[arg(long)]
    pub jobs: Option<usize>,
    /// Offset for `fetched_at` timestamps, e.g. +05:30 [default: local]
    #[arg(long, value_name = "OFFSET")]
    pub utc_offset: Option<String>,
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error("jobs must be at least 1")]
    NoJobs,

    #[error("timeout must be at least 1 second")]
    NoTimeout,
}

/// Fully merged settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub out: PathBuf,
    pub retries: u32,
    pub timeout: Duration,
    pub backoff: Duration,
    pub jobs: usize,
    pub timezone: Timezone,
}

impl Settings {
    /// Flags override the file, the file overrides built-in defaults.
    pub fn merge(flags: &Tuning, file: &FileConfig) -> Result<Self, ConfigError> {
        let out = flags
            .out
            .clone()
            .or_else(|| file.out.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));

        let jobs = flags.jobs.or(file.jobs).unwrap_or(DEFAULT_JOBS);
        if jobs == 0 {
            return Err(ConfigError::NoJobs);
        }

        let timeout_secs = flags
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::NoTimeout);
        }

        let timezone = match flags.utc_offset.as_ref().or(file.utc_offset.as_ref()) {
            Some(offset) => offset.parse()?,
            None => Timezone::Local,
        };

        Ok(Self {
            out,
            retries: flags.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
            timeout: Duration::from_secs(timeout_secs),
            backoff: Duration::from_millis(
                flags.backoff_ms.or(file.backoff_ms).unwrap_or(DEFAULT_BACKOFF_MS),
            ),
            jobs,
            timezone,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.backoff)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            jobs: self.jobs,
            timezone: self.timezone,
        }
    }
}

/// Config file path: `~/.config/latest-commits/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("latest-commits").join("config.toml"))
}

/// Load the config file. An explicit path must exist; the default
/// location is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    match explicit {
        Some(path) => read_config(path),
        None => match config_path() {
            Some(path) if path.is_file() => read_config(&path),
            _ => Ok(FileConfig::default()),
        },
    }
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Credentials for the run and an optional note for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuth {
    pub auth: Auth,
    pub warning: Option<String>,
}

pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV).ok()
}

/// Pick the credentials for the run.
///
/// A non-empty token wins over basic auth. Basic auth needs both user and
/// password. With neither the run is anonymous.
pub fn resolve_auth(
    token: Option<String>,
    user: Option<String>,
    password: Option<String>,
) -> ResolvedAuth {
    let token = token.filter(|t| !t.trim().is_empty());
    let basic = user.zip(password);

    match (token, basic) {
        (Some(token), basic) => ResolvedAuth {
            auth: Auth::Bearer(token),
            warning: basic.map(|_| {
                format!("both {TOKEN_ENV} and --user/--password given; using the token")
            }),
        },
        (None, Some((user, password))) => ResolvedAuth {
            auth: Auth::Basic { user, password },
            warning: None,
        },
        (None, None) => ResolvedAuth {
            auth: Auth::Anonymous,
            warning: Some(format!(
                "no {TOKEN_ENV} found and no --user/--password given; requests are unauthenticated"
            )),
        },
    }
}

/// Accept both `--builds 1 2` and `--builds "1 2"`.
pub fn split_identifiers(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split_whitespace())
        .map(str::to_owned)
        .collect()
}
