use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::history::TrackerSettings;

const CANDIDATES: [&str; 4] = [
    "pipewatch.toml",
    "pipewatch.json",
    "pipewatch.yaml",
    "pipewatch.yml",
];

/// Configuration file structure for pipewatch.
///
/// Every section is optional; command-line flags take precedence over the
/// values found here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Window size, thresholds and alert mode
    #[serde(default)]
    pub tracker: TrackerSettings,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub package: PackageConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub smp: SmpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,

    /// GitLab project path (e.g., 'group/project')
    pub project_path: Option<String>,

    /// Retries of a failed API call before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between two API retries, in seconds
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HistoryConfig {
    /// History file; defaults to a per-project file in the cache directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotifyConfig {
    /// Slack incoming webhook
    pub webhook_url: Option<String>,

    #[serde(default = "default_channel")]
    pub default_channel: String,

    /// Owner of jobs no JOBOWNERS rule matches
    pub default_owner: Option<String>,

    pub owners_file: Option<PathBuf>,

    /// Owner handle to Slack channel
    #[serde(default)]
    pub channels: IndexMap<String, String>,

    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// Append links to the failing runs
    #[serde(default = "default_include_links")]
    pub include_links: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageConfig {
    /// Maximum allowed size increase, in bytes
    pub threshold: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetricsConfig {
    /// Datadog API site receiving package size series
    #[serde(default = "default_metrics_api_url")]
    pub api_url: String,

    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SmpConfig {
    /// Repository holding the `test/` experiment directories
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,

    /// Command building the `smp-local-agent:latest` image
    pub build_command: Option<Vec<String>>,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_base_url(),
            project_path: None,
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            default_channel: default_channel(),
            default_owner: None,
            owners_file: None,
            channels: IndexMap::new(),
            default_branch: default_branch(),
            include_links: default_include_links(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            api_url: default_metrics_api_url(),
            api_key: None,
        }
    }
}

impl Default for SmpConfig {
    fn default() -> Self {
        Self {
            repo_root: default_repo_root(),
            build_command: None,
        }
    }
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_max_retries() -> u32 {
    30
}

fn default_retry_delay_seconds() -> u64 {
    10
}

fn default_channel() -> String {
    "#agent-platform-ops".to_string()
}

fn default_include_links() -> bool {
    true
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_metrics_api_url() -> String {
    "https://api.datadoghq.com".to_string()
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Uses `path` when given, otherwise the first of `pipewatch.toml`,
    /// `pipewatch.json`, `pipewatch.yaml` and `pipewatch.yml` found in the
    /// current directory. Returns the defaults when none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => match CANDIDATES.iter().map(Path::new).find(|path| path.exists()) {
                Some(path) => Self::load_from_path(path)?,
                None => Self::default(),
            },
        };

        config.tracker.validate()?;
        Ok(config)
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
