use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Environment-configurable defaults (§6).
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 3;
pub const DEFAULT_SIGNAL_CONFIDENCE_THRESHOLD: f64 = 0.60;
pub const DEFAULT_STALENESS_THRESHOLD_MINUTES: i64 = 30;
pub const TICK_INTERVAL_SECS: u64 = 300;

/// Top-level config (yarnnn.toml + YARNNN_* env overrides), following the
/// teacher's figment-based `SkynetConfig::load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YarnnnConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentLoopConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub tiers: TierCadenceConfig,
    #[serde(default)]
    pub exporters: ExportersConfig,
    pub platform_encryption_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.yarnnn/yarnnn.db")
}

/// Model selection per phase (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,
    pub api_key: Option<String>,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            reasoning_model: default_reasoning_model(),
            generation_model: default_generation_model(),
            extraction_model: default_extraction_model(),
            api_key: None,
            base_url: default_anthropic_base_url(),
        }
    }
}

fn default_reasoning_model() -> String {
    "claude-haiku-4-5".to_string()
}
fn default_generation_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_extraction_model() -> String {
    "claude-haiku-4-5".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_generation_wall_clock_secs")]
    pub generation_wall_clock_secs: u64,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            generation_wall_clock_secs: default_generation_wall_clock_secs(),
        }
    }
}

fn default_max_tool_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}
fn default_generation_wall_clock_secs() -> u64 {
    90
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_dedup_window_hours")]
    pub dedup_window_hours: i64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            dedup_window_hours: default_dedup_window_hours(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_SIGNAL_CONFIDENCE_THRESHOLD
}
fn default_dedup_window_hours() -> i64 {
    72
}

/// Per-tier sync frequency constants (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCadenceConfig {
    #[serde(default = "default_free_syncs_per_day")]
    pub free_syncs_per_day: u32,
    #[serde(default = "default_starter_syncs_per_day")]
    pub starter_syncs_per_day: u32,
}

impl Default for TierCadenceConfig {
    fn default() -> Self {
        Self {
            free_syncs_per_day: default_free_syncs_per_day(),
            starter_syncs_per_day: default_starter_syncs_per_day(),
        }
    }
}

fn default_free_syncs_per_day() -> u32 {
    2
}
fn default_starter_syncs_per_day() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportersConfig {
    pub resend: Option<ResendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendConfig {
    pub api_key: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
}

fn default_from_address() -> String {
    "deliverables@yarnnn.app".to_string()
}

impl YarnnnConfig {
    /// Load config from a TOML file with `YARNNN_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, `YARNNN_CONFIG` env var,
    /// `~/.yarnnn/yarnnn.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("YARNNN_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("YARNNN_").split("_"))
            .extract()
            .map_err(|e| crate::error::OrchestratorError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.yarnnn/yarnnn.toml")
}
