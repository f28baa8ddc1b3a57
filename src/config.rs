//! Configuration types for issue-sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Largest number of issues the remote bulk-create endpoint accepts per call
pub const MAX_BULK_BATCH_SIZE: usize = 50;

/// Remote tracker connection settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    /// Base URL of the tracker (e.g. "https://acme.atlassian.net")
    ///
    /// A bare domain is accepted and normalized to https.
    pub base_url: String,

    /// Account email used for Basic authentication
    pub email: String,

    /// API token used for Basic authentication
    pub api_token: String,

    /// Project the records are created in and fetched from
    pub project_key: String,
}

/// Retry configuration for remote calls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of consecutive attempts per request (default: 25)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt timeout for search calls (default: 15 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Per-attempt timeout for bulk-create calls (default: 60 seconds)
    #[serde(default = "default_write_timeout", with = "duration_serde")]
    pub write_timeout: Duration,

    /// Pause after a 429 response that carries no Retry-After header (default: 5 seconds)
    #[serde(default = "default_rate_limit_delay", with = "duration_serde")]
    pub rate_limit_delay: Duration,

    /// Initial delay before retrying any other failure (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries of other failures (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to failure delays (default: true)
    ///
    /// Rate-limit pauses are never jittered: the server-supplied delay is honored exactly.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            request_timeout: default_request_timeout(),
            write_timeout: default_write_timeout(),
            rate_limit_delay: default_rate_limit_delay(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Fetch direction settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Records requested per page (default: 10)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Where fetch progress is persisted (default: "jira_checkpoint.json")
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

/// Populate direction settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopulateConfig {
    /// Number of records to create (default: 20000)
    #[serde(default = "default_total_issues")]
    pub total_issues: usize,

    /// Records per bulk-create call (default: 50, the remote maximum)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bulk-create calls allowed in flight at once (default: 3)
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for PopulateConfig {
    fn default() -> Self {
        Self {
            total_issues: default_total_issues(),
            batch_size: default_batch_size(),
            max_parallel: default_max_parallel(),
        }
    }
}

/// Main configuration for [`IssueSync`](crate::IssueSync)
///
/// Every component receives the part it needs at construction; nothing is
/// read from process-wide state after loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote tracker connection
    #[serde(default)]
    pub jira: JiraConfig,

    /// Retry and timeout policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Populate settings
    #[serde(default)]
    pub populate: PopulateConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let mut config: Config = serde_json::from_str(&raw)?;
        config.jira.base_url = normalize_base_url(&config.jira.base_url);
        Ok(config)
    }

    /// Load connection settings from the environment, reading `.env` first if present
    ///
    /// Reads `JIRA_DOMAIN`, `EMAIL`, `API_TOKEN` and `PROJECT_KEY`; all other
    /// settings take their defaults.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Override connection settings from the environment, reading `.env` first if present
    pub fn apply_env(&mut self) {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }
        self.apply_lookup(|key| std::env::var(key).ok());
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_lookup(lookup);
        config
    }

    /// Override connection settings with any variables the lookup provides
    pub fn apply_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(domain) = lookup("JIRA_DOMAIN") {
            self.jira.base_url = normalize_base_url(&domain);
        }
        if let Some(email) = lookup("EMAIL") {
            self.jira.email = email;
        }
        if let Some(token) = lookup("API_TOKEN") {
            self.jira.api_token = token;
        }
        if let Some(project) = lookup("PROJECT_KEY") {
            self.jira.project_key = project;
        }
    }

    /// Check that the configuration can drive both directions
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.jira.base_url)
            .map_err(|e| Error::config("jira.base_url", format!("invalid base URL: {e}")))?;

        for (key, value) in [
            ("jira.email", &self.jira.email),
            ("jira.api_token", &self.jira.api_token),
            ("jira.project_key", &self.jira.project_key),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(key, "must not be empty"));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts", "must be at least 1"));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!("must be a finite number of at least 1.0, got {multiplier}"),
            ));
        }
        if self.fetch.page_size == 0 {
            return Err(Error::config("fetch.page_size", "must be at least 1"));
        }
        validate_batching(self.populate.batch_size, self.populate.max_parallel)
    }
}

/// Check batch size and worker limit for a populate run
pub(crate) fn validate_batching(batch_size: usize, max_parallel: usize) -> Result<()> {
    if batch_size == 0 || batch_size > MAX_BULK_BATCH_SIZE {
        return Err(Error::config(
            "populate.batch_size",
            format!("must be between 1 and {MAX_BULK_BATCH_SIZE}, got {batch_size}"),
        ));
    }
    if max_parallel == 0 {
        return Err(Error::config("populate.max_parallel", "must be at least 1"));
    }
    Ok(())
}

/// Turn a bare domain into an https base URL and strip trailing slashes
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn default_max_attempts() -> u32 {
    25
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_rate_limit_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    10
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("jira_checkpoint.json")
}

fn default_total_issues() -> usize {
    20_000
}

fn default_batch_size() -> usize {
    MAX_BULK_BATCH_SIZE
}

fn default_max_parallel() -> usize {
    3
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
