//! Configuration management for kbctl
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend REST root, including the /api prefix
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Media root serving uploaded PDFs and extracted page assets
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,

    /// Listing and rendering configuration
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Status polling configuration
    #[serde(default)]
    pub poll: PollConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Voice input configuration
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Listing and rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Documents per listing page (must match the backend paginator)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Content preview width in listings (grapheme clusters)
    #[serde(default = "default_list_preview_chars")]
    pub list_preview_chars: usize,

    /// Snippet preview width for retrieved passages (grapheme clusters)
    #[serde(default = "default_snippet_preview_chars")]
    pub snippet_preview_chars: usize,

    /// Department choices offered at upload
    #[serde(default = "default_departments")]
    pub departments: Vec<String>,

    /// Author id attached to uploads
    #[serde(default = "default_author")]
    pub default_author: i64,
}

/// Status polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between status checks and watch refreshes
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default model backing answers ("cloud" or "local")
    #[serde(default = "default_query_model")]
    pub model: String,

    /// Whether retrieval is enabled unless overridden per query
    #[serde(default = "default_use_retrieval")]
    pub use_retrieval: bool,
}

/// Voice input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// External transcriber command (empty = voice input unavailable)
    #[serde(default = "default_voice_command")]
    pub command: String,

    /// Arguments passed to the transcriber command
    #[serde(default)]
    pub args: Vec<String>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for kbctl data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Directory holding chunk edit sessions
    pub sessions_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            media_base_url: default_media_base_url(),
            console: ConsoleConfig::default(),
            poll: PollConfig::default(),
            query: QueryConfig::default(),
            voice: VoiceConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            list_preview_chars: default_list_preview_chars(),
            snippet_preview_chars: default_snippet_preview_chars(),
            departments: default_departments(),
            default_author: default_author(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: default_query_model(),
            use_retrieval: default_use_retrieval(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            command: default_voice_command(),
            args: Vec::new(),
        }
    }
}

impl Config {
    /// Get the default base directory for kbctl (~/.kbctl)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kbctl")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            sessions_dir: base.join("sessions"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            sessions_dir: base.join("sessions"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Parsed API root with a trailing slash so endpoint joins append segments
    pub fn api_url(&self) -> Result<Url> {
        parse_root_url(&self.api_base_url)
    }

    /// Parsed media root with a trailing slash
    pub fn media_url(&self) -> Result<Url> {
        parse_root_url(&self.media_base_url)
    }

    /// Interval between status polls and watch refreshes
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_base_url)
            .map_err(|e| Error::Config(format!("Invalid api_base_url: {}", e)))?;
        Url::parse(&self.media_base_url)
            .map_err(|e| Error::Config(format!("Invalid media_base_url: {}", e)))?;

        if self.console.page_size == 0 {
            return Err(Error::Config(
                "console.page_size must be > 0".to_string(),
            ));
        }

        if self.console.snippet_preview_chars == 0 || self.console.list_preview_chars == 0 {
            return Err(Error::Config(
                "console preview widths must be > 0".to_string(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(Error::Config("poll.interval_secs must be > 0".to_string()));
        }

        if !matches!(self.query.model.as_str(), "cloud" | "local") {
            return Err(Error::Config(
                "query.model must be 'cloud' or 'local'".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a root URL, guaranteeing a trailing slash on the path.
///
/// `Url::join` replaces the last path segment when the base lacks one, which
/// would silently drop the /api prefix from every endpoint.
fn parse_root_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
