//! Application configuration for Gatherer.
//!
//! User config lives at `~/.gatherer/gatherer.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarvestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "gatherer.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".gatherer";

// ---------------------------------------------------------------------------
// Config structs (matching gatherer.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default batch width (concurrent in-flight fetches).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Default record cap. 0 means unlimited.
    #[serde(default)]
    pub max_records: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_records: 0,
        }
    }
}

fn default_concurrency() -> usize {
    10
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds. A hung request resolves as a
    /// per-record failure after this, never blocking the rest of its batch.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether to follow redirects (some providers serve records behind
    /// redirecting download endpoints).
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            follow_redirects: default_true(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Harvest options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime options for one harvest — merged from config file + CLI flags,
/// validated before any fetching begins.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Harvest/session name; qualifies minted identifiers.
    pub name: String,
    /// Root collection endpoints, walked sequentially.
    pub uris: Vec<Url>,
    /// Batch width W: fixed number of in-flight fetches per batch.
    pub concurrency: usize,
    /// Truncate the identifier sequence to the first N. 0 means unlimited.
    pub max_records: usize,
    /// Provider auth headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Extra query parameters appended to page requests.
    pub params: Vec<(String, String)>,
    /// Static identifier-list file (one identifier per line), for providers
    /// without reliable server-side pagination.
    pub id_list_path: Option<PathBuf>,
}

impl HarvestOptions {
    /// Options for a named harvest with a single root endpoint.
    pub fn new(name: impl Into<String>, uri: Url) -> Self {
        Self {
            name: name.into(),
            uris: vec![uri],
            concurrency: default_concurrency(),
            max_records: 0,
            headers: Vec::new(),
            params: Vec::new(),
            id_list_path: None,
        }
    }

    /// Apply file-level defaults for anything the caller left unset.
    pub fn with_defaults(mut self, defaults: &DefaultsConfig) -> Self {
        if self.concurrency == 0 {
            self.concurrency = defaults.concurrency;
        }
        if self.max_records == 0 {
            self.max_records = defaults.max_records;
        }
        self
    }

    /// Validate at construction time, before any fetching begins.
    ///
    /// A harvest needs at least one root URI or a readable identifier-list
    /// file, and a positive batch width.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(HarvestError::config("concurrency must be greater than 0"));
        }

        match &self.id_list_path {
            Some(path) => {
                // Surface an unreadable list now rather than mid-harvest.
                std::fs::metadata(path).map_err(|e| HarvestError::io(path, e))?;
            }
            None => {
                if self.uris.is_empty() {
                    return Err(HarvestError::config(
                        "provide at least one root URI or an identifier-list file",
                    ));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.gatherer/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.gatherer/gatherer.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HarvestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
