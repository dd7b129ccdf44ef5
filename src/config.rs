//! Configuration management for the WHB04B-6 bridge
//!
//! Handles loading, validation, and saving of the JSON configuration file.
//! Configuration is stored at `~/.config/whb04b6d/config.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::protocol::AXIS_COUNT;

// ============================================================================
// Constants
// ============================================================================

/// Default config directory name
const CONFIG_DIR: &str = "whb04b6d";

/// Default config file name
const CONFIG_FILE: &str = "config.json";

/// Default per-axis jog feed rates (mm/min)
const DEFAULT_AXIS_FEED_RATES: [u32; AXIS_COUNT] = [6000, 6000, 600, 6000, 6000, 6000];

/// Highest per-axis feed rate; the display field is 16 bits wide
const MAX_AXIS_FEED_RATE: u32 = u16::MAX as u32;

/// Shortest tick interval accepted for any timer (ms)
const MIN_INTERVAL_MS: u64 = 10;

// ============================================================================
// Jog Configuration
// ============================================================================

/// Wheel jogging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JogConfig {
    /// Jog feed rate per axis (X, Y, Z, A, B, C)
    #[serde(default = "default_axis_feed_rates")]
    pub axis_feed_rates: [u32; AXIS_COUNT],

    /// Interval between jog command ticks in milliseconds
    #[serde(default = "default_command_interval")]
    pub command_interval_ms: u64,

    /// Drive continuous-velocity jogging from the wheel
    #[serde(default)]
    pub continuous_enabled: bool,

    /// Wheel detents per tick needed to start or keep a continuous jog
    #[serde(default = "default_continuous_threshold")]
    pub continuous_threshold: u32,

    /// Longest segment a single continuous jog tick may request
    #[serde(default = "default_continuous_distance")]
    pub continuous_distance: f64,
}

fn default_axis_feed_rates() -> [u32; AXIS_COUNT] { DEFAULT_AXIS_FEED_RATES }
fn default_command_interval() -> u64 { 100 }
fn default_continuous_threshold() -> u32 { 2 }
fn default_continuous_distance() -> f64 { 100.0 }

impl Default for JogConfig {
    fn default() -> Self {
        Self {
            axis_feed_rates: DEFAULT_AXIS_FEED_RATES,
            command_interval_ms: 100,
            continuous_enabled: false,
            continuous_threshold: 2,
            continuous_distance: 100.0,
        }
    }
}

impl JogConfig {
    /// Validate and clamp values
    pub fn validate(&mut self) {
        self.command_interval_ms = self.command_interval_ms.max(MIN_INTERVAL_MS);
        for rate in &mut self.axis_feed_rates {
            *rate = (*rate).clamp(1, MAX_AXIS_FEED_RATE);
        }
        self.continuous_threshold = self.continuous_threshold.max(1);
        if !self.continuous_distance.is_finite() || self.continuous_distance <= 0.0 {
            self.continuous_distance = default_continuous_distance();
        }
    }
}

// ============================================================================
// Display Configuration
// ============================================================================

/// Pendant LCD settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Interval between periodic display refreshes in milliseconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Show work coordinates (true) or machine coordinates (false)
    #[serde(default = "default_true")]
    pub show_work_coordinates: bool,
}

fn default_true() -> bool { true }
fn default_refresh_interval() -> u64 { 500 }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 500,
            show_work_coordinates: true,
        }
    }
}

impl DisplayConfig {
    pub fn validate(&mut self) {
        self.refresh_interval_ms = self.refresh_interval_ms.max(MIN_INTERVAL_MS);
    }
}

// ============================================================================
// Command Configuration
// ============================================================================

/// Controller command strings that vary between setups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Command for the Fn+M6 safe-Z retract
    #[serde(default = "default_safe_z")]
    pub safe_z: String,

    /// Prefix of the run-macro command; the macro number is appended
    #[serde(default = "default_macro_prefix")]
    pub macro_prefix: String,
}

fn default_safe_z() -> String {
    "G53 G0 Z0".to_string()
}

fn default_macro_prefix() -> String {
    "$Macros/Run=".to_string()
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            safe_z: default_safe_z(),
            macro_prefix: default_macro_prefix(),
        }
    }
}

impl CommandConfig {
    pub fn validate(&mut self) {
        if self.safe_z.trim().is_empty() {
            self.safe_z = default_safe_z();
        }
        if self.macro_prefix.trim().is_empty() {
            self.macro_prefix = default_macro_prefix();
        }
    }
}

// ============================================================================
// Probe Configuration
// ============================================================================

/// Tool-length probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Machine X/Y of the tool setter; the probe starts in place if unset
    #[serde(default)]
    pub location: Option<[f64; 2]>,

    /// Machine Z to travel at while moving to the tool setter
    #[serde(default)]
    pub safe_z: f64,

    /// Maximum downward probe travel
    #[serde(default = "default_max_travel")]
    pub max_travel: f64,

    /// Probe feed rate
    #[serde(default = "default_probe_feed")]
    pub feed: f64,

    /// Retract distance after contact
    #[serde(default = "default_retract")]
    pub retract: f64,
}

fn default_max_travel() -> f64 { 50.0 }
fn default_probe_feed() -> f64 { 100.0 }
fn default_retract() -> f64 { 2.0 }

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            location: None,
            safe_z: 0.0,
            max_travel: 50.0,
            feed: 100.0,
            retract: 2.0,
        }
    }
}

impl ProbeConfig {
    pub fn validate(&mut self) {
        if !self.max_travel.is_finite() || self.max_travel <= 0.0 {
            self.max_travel = default_max_travel();
        }
        if !self.feed.is_finite() || self.feed <= 0.0 {
            self.feed = default_probe_feed();
        }
        if !self.retract.is_finite() || self.retract < 0.0 {
            self.retract = default_retract();
        }
    }
}

// ============================================================================
// Serial Configuration
// ============================================================================

/// Controller serial link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial device, e.g. `/dev/ttyUSB0`
    #[serde(default)]
    pub port: Option<String>,

    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Interval between `?` status queries in milliseconds
    #[serde(default = "default_status_poll")]
    pub status_poll_ms: u64,
}

fn default_baud_rate() -> u32 { 115_200 }
fn default_status_poll() -> u64 { 200 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            status_poll_ms: 200,
        }
    }
}

impl SerialConfig {
    pub fn validate(&mut self) {
        if self.baud_rate == 0 {
            self.baud_rate = default_baud_rate();
        }
        self.status_poll_ms = self.status_poll_ms.max(MIN_INTERVAL_MS);
    }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub jog: JogConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    /// Configuration file path (not serialized)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Get the default config directory path
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load configuration from file path
    ///
    /// Returns default config if file doesn't exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let mut config: Config =
            serde_json::from_str(&contents).map_err(ConfigError::ParseError)?;

        config.validate();
        config.config_path = Some(path.to_path_buf());

        tracing::info!(
            path = %path.display(),
            continuous_jog = config.jog.continuous_enabled,
            serial_port = ?config.serial.port,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate and clamp all sections
    pub fn validate(&mut self) {
        self.jog.validate();
        self.display.validate();
        self.commands.validate();
        self.probe.validate();
        self.serial.validate();
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = match &self.config_path {
            Some(p) => p.clone(),
            None => Self::default_config_path()
                .ok_or_else(|| ConfigError::ValidationError("No config path".to_string()))?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::ParseError)?;
        fs::write(&path, contents).map_err(ConfigError::IoError)?;

        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Create the config file with defaults if it doesn't exist
    pub fn create_default_if_missing<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;

        if let Some(path) = &config.config_path {
            if !path.exists() {
                config.save()?;
                tracing::info!(path = %path.display(), "Created default configuration file");
            }
        }

        Ok(config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration error type
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading/writing file
    IoError(std::io::Error),
    /// JSON parsing error
    ParseError(serde_json::Error),
    /// Validation error
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::ValidationError(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
