//! Configuration loading.
//!
//! Settings come from an optional TOML file and are then overlaid with a few
//! environment variables used by container deployments:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `GEMINI_API_KEY` | `generation.api_key` (never read from the file) |
//! | `ADMIN_PASSWORD` | `admin.password` |
//! | `LOGS_DIR` | `logs.dir` |
//! | `PORT` | port of `server.bind` (host becomes `0.0.0.0`) |
//!
//! The resulting [`Config`] is built once in `main` and shared read-only.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub overview: OverviewConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub study: StudyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Directory of static pages used as overview sources.
    #[serde(default = "default_corpus_dir")]
    pub dir: PathBuf,
    /// URL prefix the corpus is served under; document hrefs are `{prefix}/{name}`.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: default_corpus_dir(),
            url_prefix: default_url_prefix(),
        }
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./webpages")
}
fn default_url_prefix() -> String {
    "/local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OverviewConfig {
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default = "default_source_char_limit")]
    pub source_char_limit: usize,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
            source_char_limit: default_source_char_limit(),
        }
    }
}

fn default_max_sources() -> usize {
    8
}
fn default_source_char_limit() -> usize {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Filled from `GEMINI_API_KEY`; ignored if present in the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("./logs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_admin_password")]
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: default_admin_password(),
        }
    }
}

fn default_admin_password() -> String {
    "gour".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StudyConfig {
    /// Minimum number of words a conclusion needs to be accepted.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            min_words: default_min_words(),
        }
    }
}

fn default_min_words() -> usize {
    100
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Loads configuration from `path` (or defaults when `None`), applies
/// environment overrides, and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Overlays environment variables onto `config`. The lookup is injected so
/// tests don't have to mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = non_empty("GEMINI_API_KEY") {
        config.generation.api_key = Some(key);
    }
    if let Some(password) = non_empty("ADMIN_PASSWORD") {
        config.admin.password = password;
    }
    if let Some(dir) = non_empty("LOGS_DIR") {
        config.logs.dir = PathBuf::from(dir);
    }
    if let Some(port) = non_empty("PORT") {
        config.server.bind = format!("0.0.0.0:{}", port.trim());
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.overview.max_sources == 0 {
        bail!("overview.max_sources must be > 0");
    }
    if config.overview.source_char_limit == 0 {
        bail!("overview.source_char_limit must be > 0");
    }
    if config.admin.password.is_empty() {
        bail!("admin.password must not be empty");
    }
    let prefix = &config.corpus.url_prefix;
    if !prefix.starts_with('/') || prefix.trim_end_matches('/').is_empty() {
        bail!("corpus.url_prefix must start with '/' and name a path below the root");
    }
    if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
        bail!("server.bind is not a valid socket address: {}", config.server.bind);
    }

    match config.generation.provider.as_str() {
        "gemini" | "disabled" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini or disabled.",
            other
        ),
    }

    Ok(())
}
