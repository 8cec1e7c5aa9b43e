use std::path::{Path, PathBuf};

use checkin_core::{
    DEFAULT_DESCRIPTOR_DIM, DEFAULT_DISTANCE_THRESHOLD, DEFAULT_REQUIRED_SIMILARITY, SAMPLES_REQUIRED,
};
use checkin_guard::{AbuseConfig, RateLimitConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Service configuration: optional TOML file, then `CHECKIN_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Descriptor length produced by the face encoder.
    pub descriptor_dim: usize,
    /// Distance at which similarity saturates to zero.
    pub distance_threshold: f32,
    /// Best-match similarity required to accept a check-in.
    pub required_similarity: f32,
    /// Samples collected per enrollment.
    pub samples_required: usize,
    pub rate_limit: RateLimitConfig,
    pub abuse: AbuseConfig,
    /// Interval of the background sweep that reclaims expired guard state.
    pub sweep_interval_secs: u64,
    /// A check-in this soon after the previous one is flagged. 0 disables.
    pub recent_attendance_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("checkin.db"),
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            required_similarity: DEFAULT_REQUIRED_SIMILARITY,
            samples_required: SAMPLES_REQUIRED,
            rate_limit: RateLimitConfig::default(),
            abuse: AbuseConfig::default(),
            sweep_interval_secs: 60,
            recent_attendance_secs: 300,
        }
    }
}

impl Config {
    /// Load from `$CHECKIN_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("CHECKIN_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("CHECKIN_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        self.descriptor_dim = env_parse("CHECKIN_DESCRIPTOR_DIM", self.descriptor_dim);
        self.distance_threshold = env_parse("CHECKIN_DISTANCE_THRESHOLD", self.distance_threshold);
        self.required_similarity =
            env_parse("CHECKIN_REQUIRED_SIMILARITY", self.required_similarity);
        self.samples_required = env_parse("CHECKIN_SAMPLES_REQUIRED", self.samples_required);
        self.rate_limit.max_attempts =
            env_parse("CHECKIN_MAX_ATTEMPTS", self.rate_limit.max_attempts);
        self.rate_limit.window_ms = env_parse("CHECKIN_WINDOW_MS", self.rate_limit.window_ms);
        self.abuse.burst_window_ms = env_parse("CHECKIN_BURST_WINDOW_MS", self.abuse.burst_window_ms);
        self.abuse.burst_threshold = env_parse("CHECKIN_BURST_THRESHOLD", self.abuse.burst_threshold);
        self.abuse.block_duration_ms =
            env_parse("CHECKIN_BLOCK_DURATION_MS", self.abuse.block_duration_ms);
        self.sweep_interval_secs = env_parse("CHECKIN_SWEEP_INTERVAL_SECS", self.sweep_interval_secs);
        self.recent_attendance_secs =
            env_parse("CHECKIN_RECENT_ATTENDANCE_SECS", self.recent_attendance_secs);
        self
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("checkin")
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
