//! Application configuration for Keywatch.
//!
//! User config lives at `~/.keywatch/keywatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KeywatchError, Result};
use crate::scope::{RegionMode, RegionScope};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "keywatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".keywatch";

// ---------------------------------------------------------------------------
// Config structs (matching keywatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Evidence gathering settings.
    #[serde(default)]
    pub evidence: EvidenceConfig,

    /// Default geographic scope.
    #[serde(default)]
    pub region: RegionConfig,

    /// Guard set location and isolation semantics.
    #[serde(default)]
    pub guards: GuardsConfig,

    /// Provider credentials and models.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Evidence cache location.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[evidence]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// `off`, `test`, `shallow` or `deep`.
    #[serde(default = "default_search_mode")]
    pub search_mode: String,

    /// `perplexity` or `gemini` (alias `google`).
    #[serde(default = "default_search_provider")]
    pub search_provider: String,

    #[serde(default = "default_recency_window_months")]
    pub recency_window_months: u32,

    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u32,

    #[serde(default)]
    pub bypass_cache: bool,

    /// Overrides the per-mode result cap when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,

    /// Keywords gathered concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per provider call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            search_mode: default_search_mode(),
            search_provider: default_search_provider(),
            recency_window_months: default_recency_window_months(),
            cache_ttl_days: default_cache_ttl_days(),
            bypass_cache: false,
            max_results: None,
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_search_mode() -> String {
    "shallow".into()
}
fn default_search_provider() -> String {
    "gemini".into()
}
fn default_recency_window_months() -> u32 {
    3
}
fn default_cache_ttl_days() -> u32 {
    14
}
fn default_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[region]` section. Applies when a keyword carries no source-location rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    #[serde(default = "default_region_mode")]
    pub region_mode: String,

    #[serde(default)]
    pub region_country: String,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            region_mode: default_region_mode(),
            region_country: String::new(),
        }
    }
}

fn default_region_mode() -> String {
    "global".into()
}

/// `[guards]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardsConfig {
    /// Directory holding `<category>.txt` guard files.
    #[serde(default = "default_guards_dir")]
    pub dir: String,

    /// Reload guard files before every run.
    #[serde(default)]
    pub hot_reload: bool,

    /// `relocate` or `reject`.
    #[serde(default = "default_isolation")]
    pub isolation: String,
}

impl Default for GuardsConfig {
    fn default() -> Self {
        Self {
            dir: default_guards_dir(),
            hot_reload: false,
            isolation: default_isolation(),
        }
    }
}

fn default_guards_dir() -> String {
    "guards".into()
}
fn default_isolation() -> String {
    "relocate".into()
}

/// `[providers]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Name of the env var holding the Perplexity key (never store the key itself).
    #[serde(default = "default_perplexity_api_key_env")]
    pub perplexity_api_key_env: String,

    #[serde(default = "default_perplexity_model")]
    pub perplexity_model: String,

    /// Name of the env var holding the Google AI key.
    #[serde(default = "default_gemini_api_key_env")]
    pub gemini_api_key_env: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            perplexity_api_key_env: default_perplexity_api_key_env(),
            perplexity_model: default_perplexity_model(),
            gemini_api_key_env: default_gemini_api_key_env(),
            gemini_model: default_gemini_model(),
        }
    }
}

fn default_perplexity_api_key_env() -> String {
    "PERPLEXITY_API_KEY".into()
}
fn default_perplexity_model() -> String {
    "sonar".into()
}
fn default_gemini_api_key_env() -> String {
    "GOOGLE_API_KEY".into()
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash".into()
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite file for cached evidence. Empty disables the cache.
    #[serde(default = "default_cache_path")]
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> String {
    "~/.keywatch/evidence_cache.db".into()
}

// ---------------------------------------------------------------------------
// Typed options
// ---------------------------------------------------------------------------

/// How much searching a run performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Off,
    Test,
    #[default]
    Shallow,
    Deep,
}

impl SearchMode {
    /// Default evidence cap per keyword.
    pub fn max_results(&self) -> usize {
        match self {
            Self::Off => 0,
            Self::Test => 2,
            Self::Shallow => 3,
            Self::Deep => 6,
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != Self::Off
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Test => "test",
            Self::Shallow => "shallow",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = KeywatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "test" => Ok(Self::Test),
            // "fast" is the older name for shallow
            "shallow" | "fast" => Ok(Self::Shallow),
            "deep" => Ok(Self::Deep),
            other => Err(KeywatchError::config(format!(
                "invalid search_mode '{other}' (expected off, test, shallow or deep)"
            ))),
        }
    }
}

/// Which live evidence provider to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    Perplexity,
    #[default]
    Gemini,
}

impl SearchProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Perplexity => "perplexity",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchProvider {
    type Err = KeywatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "perplexity" => Ok(Self::Perplexity),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(KeywatchError::config(format!(
                "invalid search_provider '{other}' (expected perplexity or gemini)"
            ))),
        }
    }
}

/// What the isolation filter does with a keyword that belongs to another
/// category's guard set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// Move the keyword into the guarded category.
    #[default]
    Relocate,
    /// Drop the keyword and record it as a leak.
    Reject,
}

impl FromStr for IsolationMode {
    type Err = KeywatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "relocate" => Ok(Self::Relocate),
            "reject" => Ok(Self::Reject),
            other => Err(KeywatchError::config(format!(
                "invalid isolation '{other}' (expected relocate or reject)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Validated runtime configuration for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub search_mode: SearchMode,
    pub search_provider: SearchProvider,
    pub recency_window_months: u32,
    pub cache_ttl_days: u32,
    pub bypass_cache: bool,
    /// Evidence items kept per keyword after ranking.
    pub max_results: usize,
    pub concurrency: usize,
    pub timeout: Duration,
    /// Scope used when a keyword has no source-location rule.
    pub default_scope: RegionScope,
    pub isolation: IsolationMode,
    pub guards_dir: PathBuf,
    pub hot_reload: bool,
    /// `None` disables the evidence cache.
    pub cache_path: Option<PathBuf>,
    pub providers: ProvidersConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::default(),
            search_provider: SearchProvider::default(),
            recency_window_months: default_recency_window_months(),
            cache_ttl_days: default_cache_ttl_days(),
            bypass_cache: false,
            max_results: SearchMode::default().max_results(),
            concurrency: default_concurrency(),
            timeout: Duration::from_secs(default_timeout_secs()),
            default_scope: RegionScope::global(),
            isolation: IsolationMode::default(),
            guards_dir: PathBuf::from(default_guards_dir()),
            hot_reload: false,
            cache_path: None,
            providers: ProvidersConfig::default(),
        }
    }
}

impl TryFrom<&AppConfig> for PipelineConfig {
    type Error = KeywatchError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let evidence = &config.evidence;
        let search_mode: SearchMode = evidence.search_mode.parse()?;
        let search_provider: SearchProvider = evidence.search_provider.parse()?;
        let isolation: IsolationMode = config.guards.isolation.parse()?;

        let region_mode: RegionMode = config
            .region
            .region_mode
            .parse()
            .map_err(KeywatchError::config)?;
        let default_scope = RegionScope::from_parts(region_mode, &config.region.region_country)
            .map_err(KeywatchError::config)?;

        if evidence.concurrency == 0 {
            return Err(KeywatchError::config("concurrency must be at least 1"));
        }
        if evidence.timeout_secs == 0 {
            return Err(KeywatchError::config("timeout_secs must be at least 1"));
        }
        if evidence.recency_window_months == 0 {
            return Err(KeywatchError::config(
                "recency_window_months must be at least 1",
            ));
        }

        let cache_path = match config.cache.path.trim() {
            "" => None,
            path => Some(expand_home(path)),
        };

        Ok(Self {
            search_mode,
            search_provider,
            recency_window_months: evidence.recency_window_months,
            cache_ttl_days: evidence.cache_ttl_days,
            bypass_cache: evidence.bypass_cache,
            max_results: evidence
                .max_results
                .unwrap_or_else(|| search_mode.max_results()),
            concurrency: evidence.concurrency,
            timeout: Duration::from_secs(evidence.timeout_secs),
            default_scope,
            isolation,
            guards_dir: expand_home(&config.guards.dir),
            hot_reload: config.guards.hot_reload,
            cache_path,
            providers: config.providers.clone(),
        })
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.keywatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KeywatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.keywatch/keywatch.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| KeywatchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| KeywatchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KeywatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KeywatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KeywatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("search_mode"));
        assert!(toml_str.contains("PERPLEXITY_API_KEY"));
        assert!(!toml_str.contains("max_results"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.evidence.recency_window_months, 3);
        assert_eq!(parsed.evidence.cache_ttl_days, 14);
        assert_eq!(parsed.guards.isolation, "relocate");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[evidence]
search_mode = "deep"

[region]
region_mode = "exclude_country"
region_country = "za"
"#;
        let app: AppConfig = toml::from_str(toml_str).expect("parse");
        let config = PipelineConfig::try_from(&app).expect("valid config");
        assert_eq!(config.search_mode, SearchMode::Deep);
        assert_eq!(config.max_results, 6);
        assert_eq!(config.default_scope.rule(), "!South Africa");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn max_results_override() {
        let mut app = AppConfig::default();
        app.evidence.max_results = Some(5);
        let config = PipelineConfig::try_from(&app).expect("valid config");
        assert_eq!(config.max_results, 5);
    }

    #[test]
    fn invalid_region_mode_fails_fast() {
        let mut app = AppConfig::default();
        app.region.region_mode = "sideways".into();
        let err = PipelineConfig::try_from(&app).unwrap_err();
        assert!(matches!(err, KeywatchError::Config { .. }));
        assert!(err.to_string().contains("region_mode"));
    }

    #[test]
    fn include_mode_without_country_fails() {
        let mut app = AppConfig::default();
        app.region.region_mode = "include_country".into();
        assert!(PipelineConfig::try_from(&app).is_err());
    }

    #[test]
    fn invalid_enums_fail() {
        let mut app = AppConfig::default();
        app.evidence.search_provider = "bing".into();
        assert!(PipelineConfig::try_from(&app).is_err());

        let mut app = AppConfig::default();
        app.guards.isolation = "shuffle".into();
        assert!(PipelineConfig::try_from(&app).is_err());

        let mut app = AppConfig::default();
        app.evidence.concurrency = 0;
        assert!(PipelineConfig::try_from(&app).is_err());
    }

    #[test]
    fn search_mode_parsing() {
        assert_eq!("FAST".parse::<SearchMode>().expect("parse"), SearchMode::Shallow);
        assert_eq!("google".parse::<SearchProvider>().expect("parse"), SearchProvider::Gemini);
        assert_eq!(SearchMode::Off.max_results(), 0);
        assert!(!SearchMode::Off.is_enabled());
    }

    #[test]
    fn empty_cache_path_disables_cache() {
        let mut app = AppConfig::default();
        app.cache.path = String::new();
        let config = PipelineConfig::try_from(&app).expect("valid config");
        assert!(config.cache_path.is_none());
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("kw_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[guards]\nhot_reload = true\n").expect("write");
        let app = load_config_from(&path).expect("load");
        assert!(app.guards.hot_reload);
        let _ = std::fs::remove_file(&path);
    }
}
