//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.facaudit.toml` files.

use crate::api::{ClientConfig, RetryPolicy};
use crate::pipeline::Endpoints;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".facaudit.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Snapshot settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// FAC API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Endpoint for audit report metadata.
    #[serde(default = "default_general_endpoint")]
    pub general_endpoint: String,

    /// Endpoint for federal award records.
    #[serde(default = "default_awards_endpoint")]
    pub awards_endpoint: String,

    /// Records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on transport failure.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Delay before the first retry; doubled for each further one.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// File holding the API key, used when none is given on the command line.
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            general_endpoint: default_general_endpoint(),
            awards_endpoint: default_awards_endpoint(),
            page_size: default_page_size(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            key_file: default_key_file(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.fac.gov".to_string()
}

fn default_general_endpoint() -> String {
    "general".to_string()
}

fn default_awards_endpoint() -> String {
    "federal_awards".to_string()
}

fn default_page_size() -> usize {
    4999 // server caps responses at 5000 rows
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> usize {
    2
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_key_file() -> PathBuf {
    PathBuf::from(".key")
}

/// Snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding `<dataset>_data.json` snapshots.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Fetch again when a snapshot cannot be parsed instead of failing.
    #[serde(default = "default_true")]
    pub refetch_on_corrupt: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            refetch_on_corrupt: true,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the output files are written to.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// File name of the merged JSON export.
    #[serde(default = "default_merged_json")]
    pub merged_json: String,

    /// File name of the merged CSV export.
    #[serde(default = "default_merged_csv")]
    pub merged_csv: String,

    /// File name of the program summary.
    #[serde(default = "default_summary_csv")]
    pub summary_csv: String,

    /// Programs kept in the summary.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            merged_json: default_merged_json(),
            merged_csv: default_merged_csv(),
            summary_csv: default_summary_csv(),
            top_n: default_top_n(),
        }
    }
}

impl OutputConfig {
    pub fn merged_json_path(&self) -> PathBuf {
        self.dir.join(&self.merged_json)
    }

    pub fn merged_csv_path(&self) -> PathBuf {
        self.dir.join(&self.merged_csv)
    }

    pub fn summary_csv_path(&self) -> PathBuf {
        self.dir.join(&self.summary_csv)
    }

    /// CSV copy of the snapshot for `dataset`, e.g. `general_data.csv`.
    pub fn snapshot_csv_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(format!("{}_data.csv", dataset))
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_merged_json() -> String {
    "output.json".to_string()
}

fn default_merged_csv() -> String {
    "output.csv".to_string()
}

fn default_summary_csv() -> String {
    "mostcommonprograms.csv".to_string()
}

fn default_top_n() -> usize {
    crate::analysis::DEFAULT_TOP_N
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref base_url) = args.base_url {
            self.api.base_url = base_url.clone();
        }
        if let Some(page_size) = args.page_size {
            self.api.page_size = page_size;
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }
        if let Some(ref dir) = args.cache_dir {
            self.cache.dir = dir.clone();
        }
        if let Some(ref dir) = args.output_dir {
            self.output.dir = dir.clone();
        }
        if let Some(top) = args.top {
            self.output.top_n = top;
        }
    }

    /// The API key: the explicit one when given, else the trimmed contents
    /// of the key file. `None` when neither yields a non-empty key.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }

        match std::fs::read_to_string(&self.api.key_file) {
            Ok(content) => {
                let key = content.trim();
                (!key.is_empty()).then(|| key.to_string())
            }
            Err(e) => {
                debug!("No API key read from {}: {}", self.api.key_file.display(), e);
                None
            }
        }
    }

    /// HTTP client settings for the given key.
    pub fn client_config(&self, api_key: Option<String>) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            api_key,
            timeout_seconds: self.api.timeout_seconds,
            key_file: self.api.key_file.display().to_string(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        if self.api.retries == 0 {
            return RetryPolicy::none();
        }
        RetryPolicy {
            max_retries: self.api.retries,
            base_delay: Duration::from_millis(self.api.retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            general: self.api.general_endpoint.clone(),
            awards: self.api.awards_endpoint.clone(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
