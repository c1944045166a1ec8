//! Application configuration for buyergroup.
//!
//! User config lives at `~/.buyergroup/buyergroup.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BuyerGroupError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "buyergroup.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".buyergroup";

/// Page ceiling that no configuration may exceed.
pub const HARD_PAGE_CEILING: u32 = 25;

// ---------------------------------------------------------------------------
// Config structs (matching buyergroup.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Pipeline thresholds and limits.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Credits charged per external call.
    #[serde(default)]
    pub costs: CostsConfig,

    /// Data provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory that result bundles are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// libSQL database file for run history.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            database_path: default_database_path(),
        }
    }
}

fn default_output_dir() -> String {
    "~/buyergroup-runs".into()
}
fn default_database_path() -> String {
    "~/.buyergroup/history.db".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum relevance for a candidate to survive scoring.
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f64,

    /// Minimum influence for a candidate to survive scoring.
    #[serde(default = "default_influence_floor")]
    pub influence_floor: f64,

    /// Multiplier applied to both floors during the relaxation pass.
    #[serde(default = "default_relaxation_factor")]
    pub floor_relaxation_factor: f64,

    /// Upper bound on discovery pages per run (clamped to 25).
    #[serde(default = "default_page_ceiling")]
    pub page_ceiling: u32,

    /// Maximum in-flight provider calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    #[serde(default = "default_enrich_timeout_ms")]
    pub enrich_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            relevance_floor: default_relevance_floor(),
            influence_floor: default_influence_floor(),
            floor_relaxation_factor: default_relaxation_factor(),
            page_ceiling: default_page_ceiling(),
            concurrency: default_concurrency(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            page_timeout_ms: default_page_timeout_ms(),
            enrich_timeout_ms: default_enrich_timeout_ms(),
        }
    }
}

fn default_relevance_floor() -> f64 {
    0.15
}
fn default_influence_floor() -> f64 {
    40.0
}
fn default_relaxation_factor() -> f64 {
    0.5
}
fn default_page_ceiling() -> u32 {
    12
}
fn default_concurrency() -> usize {
    4
}
fn default_resolve_timeout_ms() -> u64 {
    10_000
}
fn default_page_timeout_ms() -> u64 {
    15_000
}
fn default_enrich_timeout_ms() -> u64 {
    20_000
}

/// `[costs]` section, in provider credits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostsConfig {
    #[serde(default)]
    pub context_resolution: u64,

    #[serde(default = "default_discovery_page_cost")]
    pub discovery_page: u64,

    #[serde(default = "default_enrichment_cost")]
    pub profile_enrichment: u64,
}

impl Default for CostsConfig {
    fn default() -> Self {
        Self {
            context_resolution: 0,
            discovery_page: default_discovery_page_cost(),
            profile_enrichment: default_enrichment_cost(),
        }
    }
}

fn default_discovery_page_cost() -> u64 {
    1
}
fn default_enrichment_cost() -> u64 {
    10
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the people-data REST provider.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.peopledata.example".into()
}
fn default_api_key_env() -> String {
    "BUYERGROUP_API_KEY".into()
}
fn default_user_agent() -> String {
    format!("buyergroup/{}", env!("CARGO_PKG_VERSION"))
}

// ---------------------------------------------------------------------------
// Pipeline settings (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub relevance_floor: f64,
    pub influence_floor: f64,
    pub floor_relaxation_factor: f64,
    /// Already clamped to [`HARD_PAGE_CEILING`].
    pub page_ceiling: u32,
    pub concurrency: usize,
    pub resolve_timeout: Duration,
    pub page_timeout: Duration,
    pub enrich_timeout: Duration,
    pub costs: CostsConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            relevance_floor: p.relevance_floor,
            influence_floor: p.influence_floor,
            floor_relaxation_factor: p.floor_relaxation_factor,
            page_ceiling: p.page_ceiling.clamp(1, HARD_PAGE_CEILING),
            concurrency: p.concurrency.max(1),
            resolve_timeout: Duration::from_millis(p.resolve_timeout_ms),
            page_timeout: Duration::from_millis(p.page_timeout_ms),
            enrich_timeout: Duration::from_millis(p.enrich_timeout_ms),
            costs: config.costs.clone(),
        }
    }
}

impl PipelineSettings {
    /// Reject floors and timeouts the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("relevance_floor", self.relevance_floor),
            ("influence_floor", self.influence_floor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BuyerGroupError::validation(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if !(self.floor_relaxation_factor > 0.0 && self.floor_relaxation_factor <= 1.0) {
            return Err(BuyerGroupError::validation(format!(
                "floor_relaxation_factor must be in (0, 1], got {}",
                self.floor_relaxation_factor
            )));
        }
        if [self.resolve_timeout, self.page_timeout, self.enrich_timeout]
            .iter()
            .any(Duration::is_zero)
        {
            return Err(BuyerGroupError::validation("timeouts must be greater than zero"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.buyergroup/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BuyerGroupError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.buyergroup/buyergroup.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
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
    let content = std::fs::read_to_string(path).map_err(|e| BuyerGroupError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BuyerGroupError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BuyerGroupError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BuyerGroupError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BuyerGroupError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the provider API key from the configured env var.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.provider.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BuyerGroupError::config(format!(
            "provider API key not found. Set the {var_name} environment variable."
        ))),
    }
}
