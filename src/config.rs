//! TOML configuration for etherflood.
//!
//! Every field has a default, so an empty or partial file is valid. The file
//! is located via `--config`, then `ETHERFLOOD_CONFIG`, then
//! `/etc/etherflood/etherflood.toml`. Only an explicit `--config` must load;
//! discovered files that fail are skipped and reported through
//! [`LoadedConfig::log`]. Command-line flags override the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::flood::{self, FloodParams};
use crate::frame::{DEFAULT_ETHER_TYPE, MAX_PAYLOAD_LEN};
use crate::link::InterfaceSelector;

pub const CONFIG_ENV: &str = "ETHERFLOOD_CONFIG";
const SYSTEM_CONFIG_PATH: &str = "/etc/etherflood/etherflood.toml";

/// Values below this are 802.3 length fields, not EtherTypes.
const MIN_ETHER_TYPE: u16 = 0x0600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("queue depth must be at least 1")]
    ZeroQueueDepth,

    #[error("seed {0} is out of range (0-255)")]
    SeedOutOfRange(u32),

    #[error("frame count {0} exceeds the maximum of {max}", max = u32::MAX)]
    TooManyFrames(u64),

    #[error("interface must not be empty")]
    EmptyInterface,

    #[error("EtherType {0:#06x} is below 0x0600 and would be read as a length")]
    EtherTypeTooSmall(u16),

    #[error("invalid EtherType '{0}'")]
    InvalidEtherType(String),

    #[error("payload length {0} exceeds {max} bytes", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge(usize),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtherfloodConfig {
    #[serde(default)]
    pub flood: FloodConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EtherfloodConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load from an explicit path; failure is fatal.
    pub fn load_explicit(path: &Path) -> Result<LoadedConfig> {
        Ok(LoadedConfig {
            config: Self::load(path)?,
            source: Some(path.to_path_buf()),
            skipped: Vec::new(),
        })
    }

    /// Try `ETHERFLOOD_CONFIG`, then the system path, then defaults.
    ///
    /// Nothing is logged here, since this runs before the subscriber exists;
    /// call [`LoadedConfig::log`] once tracing is up.
    pub fn load_or_default() -> LoadedConfig {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from_candidates(env_path.as_deref(), Path::new(SYSTEM_CONFIG_PATH))
    }

    /// Fallback chain with injectable paths. A missing system file is not an
    /// error; any other failure is recorded and the next candidate is tried.
    pub fn load_from_candidates(env_path: Option<&Path>, system_path: &Path) -> LoadedConfig {
        let mut skipped = Vec::new();

        if let Some(path) = env_path {
            match Self::load(path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        source: Some(path.to_path_buf()),
                        skipped,
                    }
                }
                Err(e) => skipped.push(SkippedConfig {
                    path: path.to_path_buf(),
                    error: format!("{:#}", e),
                }),
            }
        }

        if system_path.exists() {
            match Self::load(system_path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        source: Some(system_path.to_path_buf()),
                        skipped,
                    }
                }
                Err(e) => skipped.push(SkippedConfig {
                    path: system_path.to_path_buf(),
                    error: format!("{:#}", e),
                }),
            }
        }

        LoadedConfig {
            config: Self::default(),
            source: None,
            skipped,
        }
    }
}

/// A config file that was found but could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedConfig {
    pub path: PathBuf,
    pub error: String,
}

/// Result of config discovery: the config in effect, where it came from,
/// and any candidate files that were passed over.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EtherfloodConfig,
    /// `None` when running on compiled-in defaults.
    pub source: Option<PathBuf>,
    pub skipped: Vec<SkippedConfig>,
}

impl LoadedConfig {
    /// Emit what discovery did. Call after the subscriber is installed.
    pub fn log(&self) {
        for s in &self.skipped {
            warn!(
                path = %s.path.display(),
                error = s.error.as_str(),
                "config file could not be loaded, falling back"
            );
        }
        match &self.source {
            Some(path) => info!(path = %path.display(), "loaded configuration"),
            None => debug!("no usable config file, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flood
// ---------------------------------------------------------------------------

/// Parameters of a flood run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodConfig {
    /// Number of frames to send.
    pub frames: u64,
    /// Number of concurrent sender workers.
    pub workers: usize,
    /// Interface index or name.
    pub interface: String,
    /// Source-address seed (0-255). Picked at random when unset.
    pub seed: Option<u32>,
    pub ether_type: u16,
    /// Zeroed payload bytes per frame, before minimum-size padding.
    pub payload_len: usize,
    /// Capacity of the work queue feeding the workers.
    pub queue_depth: usize,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            frames: 1,
            workers: 12,
            interface: "1".to_string(),
            seed: None,
            ether_type: DEFAULT_ETHER_TYPE,
            payload_len: 0,
            queue_depth: 1,
        }
    }
}

impl FloodConfig {
    /// Check every field that would otherwise fail after workers start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        flood::validate_pool(self.workers, self.queue_depth)?;
        if self.frames > u32::MAX as u64 {
            return Err(ConfigError::TooManyFrames(self.frames));
        }
        if let Some(seed) = self.seed {
            if seed > u8::MAX as u32 {
                return Err(ConfigError::SeedOutOfRange(seed));
            }
        }
        if self.interface.trim().is_empty() {
            return Err(ConfigError::EmptyInterface);
        }
        if self.ether_type < MIN_ETHER_TYPE {
            return Err(ConfigError::EtherTypeTooSmall(self.ether_type));
        }
        if self.payload_len > MAX_PAYLOAD_LEN {
            return Err(ConfigError::PayloadTooLarge(self.payload_len));
        }
        Ok(())
    }

    pub fn interface_selector(&self) -> InterfaceSelector {
        // Infallible.
        match self.interface.parse() {
            Ok(sel) => sel,
            Err(never) => match never {},
        }
    }

    /// Validate and resolve into pipeline parameters, drawing a random seed
    /// if none was configured.
    pub fn params(&self) -> Result<FloodParams, ConfigError> {
        self.validate()?;
        let seed = match self.seed {
            Some(s) => s as u8,
            None => {
                let s = rand::random::<u8>();
                debug!(seed = s, "no seed configured, picked one at random");
                s
            }
        };
        Ok(FloodParams {
            frame_count: self.frames as u32,
            workers: self.workers,
            seed,
            queue_depth: self.queue_depth,
        })
    }
}

/// Parse an EtherType written as hex (`0xbeef`) or decimal (`48879`).
pub fn parse_ether_type(s: &str) -> Result<u16, ConfigError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|_| ConfigError::InvalidEtherType(s.to_string()))
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
