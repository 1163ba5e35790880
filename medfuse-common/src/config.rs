//! Configuration loading and resolution
//!
//! The engine reads one immutable [`EngineConfig`] at startup and injects it
//! into every component. Resolution order (highest priority first):
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (`MEDFUSE_*`)
//! 3. TOML config file
//! 4. Built-in defaults (code constants)

use crate::defaults;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MEDFUSE_CONFIG";

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub fusion: FusionConfig,
    pub gate: GateConfig,
    pub display: DisplayConfig,
    pub collaborators: CollaboratorConfig,
    pub tables: TablesConfig,
}

/// HTTP server bootstrap settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Broadcast capacity of the event bus
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
            event_capacity: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Log-odds fusion weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Weight applied to each image logit
    pub w_img: f64,
    /// Weight applied to each unit of text strength
    pub w_txt: f64,
    /// Constant added to the combined log-odds before the sigmoid
    pub bias: f64,
    /// Maximum number of ranked candidates kept
    pub topk: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            w_img: 0.7,
            w_txt: 0.5,
            bias: 0.0,
            topk: 10,
        }
    }
}

/// Question gating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Confidence/margin gating with the near-certain override
    Full,
    /// Question generation switched off
    Disabled,
}

impl FromStr for GateMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(GateMode::Full),
            "disabled" | "off" => Ok(GateMode::Disabled),
            other => Err(Error::Config(format!("Unknown gate mode: {}", other))),
        }
    }
}

/// Question gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub mode: GateMode,
    /// Ask when top confidence is below this
    pub ask_threshold: f64,
    /// Ask when the top1-top2 margin is below this
    pub margin_threshold: f64,
    /// Near-certain override: top confidence at or above this...
    pub near_certain_confidence: f64,
    /// ...and margin at or above this floor
    pub near_certain_margin_floor: f64,
    /// Upper bound on questions kept from one proposal
    pub max_questions: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::Full,
            ask_threshold: 0.70,
            margin_threshold: 0.08,
            near_certain_confidence: 0.95,
            near_certain_margin_floor: 0.02,
            max_questions: 4,
        }
    }
}

/// Compact summary display limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Leading diagnosis plus alternates
    pub max_candidates_displayed: usize,
    /// Alternates scoring below this are hidden
    pub min_confidence_displayed: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_candidates_displayed: 3,
            min_confidence_displayed: 0.60,
        }
    }
}

/// External collaborator endpoints and limits
///
/// An unset URL selects the offline default for that collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub extraction_url: Option<String>,
    pub question_url: Option<String>,
    pub retrieval_url: Option<String>,
    pub imaging_url: Option<String>,
    /// Timeout for extraction, retrieval and imaging calls
    pub timeout_ms: u64,
    /// Timeout for question proposal
    pub question_timeout_ms: u64,
    /// Retrieved context is cut to this many characters
    pub max_context_chars: usize,
    pub retrieval_top_k: usize,
    /// Optional JSON file of EHR records used for case binding
    pub ehr_json: Option<PathBuf>,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            extraction_url: None,
            question_url: None,
            retrieval_url: None,
            imaging_url: None,
            timeout_ms: 20_000,
            question_timeout_ms: 8_000,
            max_context_chars: 2_000,
            retrieval_top_k: 5,
            ehr_json: None,
        }
    }
}

/// Static label tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    /// Imaging label → canonical condition
    pub aliases: BTreeMap<String, String>,
    /// Domain name → member condition labels
    pub domains: BTreeMap<String, Vec<String>>,
    /// Condition label → keywords searched in extracted text
    pub keywords: BTreeMap<String, Vec<String>>,
    /// Phrase → condition label
    pub synonyms: BTreeMap<String, String>,
    /// Conditions raising a red flag when ranked high
    pub critical_conditions: Vec<String>,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            aliases: defaults::aliases(),
            domains: defaults::domains(),
            keywords: defaults::keywords(),
            synonyms: defaults::synonyms(),
            critical_conditions: defaults::critical_conditions(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML (if any) plus environment overrides
    ///
    /// `cli_path` wins over `MEDFUSE_CONFIG`, which wins over the platform
    /// config directory. A missing optional file falls back to defaults; an
    /// explicitly named file that cannot be read is an error.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path)? {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Read {} failed: {}", path.display(), e))
                })?;
                info!("Configuration loaded from {}", path.display());
                Self::from_toml_str(&content)?
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; absent sections take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Overlay `MEDFUSE_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_value("MEDFUSE_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse("MEDFUSE_PORT") {
            self.server.port = v;
        }
        if let Some(v) = env_value("MEDFUSE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_parse("MEDFUSE_W_IMG") {
            self.fusion.w_img = v;
        }
        if let Some(v) = env_parse("MEDFUSE_W_TXT") {
            self.fusion.w_txt = v;
        }
        if let Some(v) = env_parse("MEDFUSE_TOPK") {
            self.fusion.topk = v;
        }
        if let Some(v) = env_parse("MEDFUSE_GATE_MODE") {
            self.gate.mode = v;
        }
        if let Some(v) = env_parse("MEDFUSE_ASK_THRESHOLD") {
            self.gate.ask_threshold = v;
        }
        if let Some(v) = env_parse("MEDFUSE_MARGIN_THRESHOLD") {
            self.gate.margin_threshold = v;
        }
        if let Some(v) = env_value("MEDFUSE_EXTRACTION_URL") {
            self.collaborators.extraction_url = Some(v);
        }
        if let Some(v) = env_value("MEDFUSE_QUESTION_URL") {
            self.collaborators.question_url = Some(v);
        }
        if let Some(v) = env_value("MEDFUSE_RETRIEVAL_URL") {
            self.collaborators.retrieval_url = Some(v);
        }
        if let Some(v) = env_value("MEDFUSE_IMAGING_URL") {
            self.collaborators.imaging_url = Some(v);
        }
        if let Some(v) = env_parse("MEDFUSE_MAX_CONTEXT_CHARS") {
            self.collaborators.max_context_chars = v;
        }
        if let Some(v) = env_value("MEDFUSE_EHR_JSON") {
            self.collaborators.ehr_json = Some(PathBuf::from(v));
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("gate.ask_threshold", self.gate.ask_threshold),
            ("gate.margin_threshold", self.gate.margin_threshold),
            ("gate.near_certain_confidence", self.gate.near_certain_confidence),
            ("gate.near_certain_margin_floor", self.gate.near_certain_margin_floor),
            ("display.min_confidence_displayed", self.display.min_confidence_displayed),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !self.fusion.w_img.is_finite() || !self.fusion.w_txt.is_finite() || !self.fusion.bias.is_finite() {
            return Err(Error::Config("fusion weights must be finite".to_string()));
        }
        if self.fusion.topk == 0 {
            return Err(Error::Config("fusion.topk must be at least 1".to_string()));
        }
        if self.display.max_candidates_displayed == 0 {
            return Err(Error::Config(
                "display.max_candidates_displayed must be at least 1".to_string(),
            ));
        }
        if self.server.event_capacity == 0 {
            return Err(Error::Config("server.event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Locate the TOML file to load, if any
fn resolve_config_path(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Ok(Some(path.to_path_buf()));
    }

    // Priority 2: Environment variable
    if let Some(path) = env_value(CONFIG_ENV_VAR) {
        return Ok(Some(PathBuf::from(path)));
    }

    // Priority 3: Platform config directory (optional)
    let default_path = dirs::config_dir().map(|d| d.join("medfuse").join("config.toml"));
    Ok(default_path.filter(|p| p.exists()))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env_value(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}
