//! Configuration types for fetchtap

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::FilterSpec;
use crate::{Result, TapError};

/// Default capacity of the capture store
pub const DEFAULT_MAX_CAPTURES: usize = 1000;

/// Which requests the recorder admits while recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// Capture every request
    #[default]
    All,
    /// Capture only POSTs to chat session resources
    ChatOnly,
    /// Apply the path, method and status filter
    Custom,
}

impl CaptureMode {
    /// Wire name of the mode
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureMode::All => "all",
            CaptureMode::ChatOnly => "chat-only",
            CaptureMode::Custom => "custom",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureMode {
    type Err = TapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(CaptureMode::All),
            "chat-only" => Ok(CaptureMode::ChatOnly),
            "custom" => Ok(CaptureMode::Custom),
            other => Err(TapError::InvalidConfig(format!(
                "Invalid mode '{other}'. Use: all, chat-only, custom"
            ))),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Recording gate, mode, filter and capacity
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Entry point supervision
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Export and sink settings
    #[serde(default)]
    pub export: ExportConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Runtime capture state, mutated through the recorder's control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Master gate; false suppresses all capture
    #[serde(default = "default_true")]
    pub is_recording: bool,
    /// Admission mode
    #[serde(default)]
    pub capture_mode: CaptureMode,
    /// Capacity of the capture store
    #[serde(default = "default_max_captures")]
    pub max_captures: usize,
    /// Filter applied in custom mode
    #[serde(default)]
    pub filter: FilterSpec,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            is_recording: true,
            capture_mode: CaptureMode::All,
            max_captures: DEFAULT_MAX_CAPTURES,
            filter: FilterSpec::default(),
        }
    }
}

/// Reinstallation supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Whether the supervisor task runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Steady-state poll interval
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// One-shot checks after startup, before polling begins
    #[serde(default = "default_startup_delays_ms")]
    pub startup_delays_ms: Vec<u64>,
}

impl SupervisorConfig {
    /// Poll interval as a duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Startup checks as durations, in ascending order
    #[must_use]
    pub fn startup_delays(&self) -> Vec<Duration> {
        let mut delays: Vec<Duration> = self
            .startup_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect();
        delays.sort_unstable();
        delays
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval_ms(),
            startup_delays_ms: default_startup_delays_ms(),
        }
    }
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory used by the directory sink
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Prefix of every exported file name
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Hand every finalized record to the sink
    #[serde(default = "default_true")]
    pub auto_save: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_prefix: default_file_prefix(),
            auto_save: true,
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Upper bound on a single stream capture, 0 disables
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,
}

impl LimitsConfig {
    /// Stream capture bound, `None` when disabled
    #[must_use]
    pub fn stream_timeout(&self) -> Option<Duration> {
        (self.stream_timeout_ms > 0).then(|| Duration::from_millis(self.stream_timeout_ms))
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            stream_timeout_ms: default_stream_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_captures() -> usize {
    DEFAULT_MAX_CAPTURES
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_startup_delays_ms() -> Vec<u64> {
    vec![2000, 5000]
}

fn default_file_prefix() -> String {
    "fetchtap".to_string()
}

fn default_stream_timeout_ms() -> u64 {
    5 * 60 * 1000
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TapError::InvalidConfig(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TapError::InvalidConfig(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.capture.max_captures == 0 {
            return Err(TapError::InvalidConfig(
                "max_captures must be greater than 0".to_string(),
            ));
        }

        self.capture.filter.validate()?;

        if self.supervisor.interval_ms == 0 {
            return Err(TapError::InvalidConfig(
                "supervisor interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.export.file_prefix.is_empty() {
            return Err(TapError::InvalidConfig(
                "export file_prefix cannot be empty".to_string(),
            ));
        }

        if self
            .export
            .file_prefix
            .contains(|c: char| c == '/' || c == '\\' || c == '\0')
        {
            return Err(TapError::InvalidConfig(format!(
                "export file_prefix cannot contain path separators: {}",
                self.export.file_prefix
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            [capture]
            is_recording = false
            capture_mode = "chat-only"
            max_captures = 50

            [capture.filter]
            paths = ["/api/"]
            methods = ["POST"]
            status_codes = [200, 201]

            [supervisor]
            interval_ms = 250
            startup_delays_ms = [500]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert!(!config.capture.is_recording);
        assert_eq!(config.capture.capture_mode, CaptureMode::ChatOnly);
        assert_eq!(config.capture.max_captures, 50);
        assert_eq!(config.capture.filter.paths.len(), 1);
        assert!(config.capture.filter.methods.contains("POST"));
        assert!(config.capture.filter.status_codes.contains(&201));
        assert_eq!(config.supervisor.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.capture.is_recording);
        assert_eq!(config.capture.capture_mode, CaptureMode::All);
        assert_eq!(config.capture.max_captures, DEFAULT_MAX_CAPTURES);
        assert_eq!(config.supervisor.startup_delays_ms, vec![2000, 5000]);
        assert_eq!(config.export.file_prefix, "fetchtap");
        assert!(config.export.auto_save);
        assert_eq!(
            config.limits.stream_timeout(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            [capture]
            capture_mode = "custom"

            [limits]
            stream_timeout_ms = 0
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.capture.capture_mode, CaptureMode::Custom);
        assert_eq!(config.limits.stream_timeout(), None);
    }

    #[test]
    fn test_invalid_config_zero_capacity() {
        let config: Config = toml::from_str("[capture]\nmax_captures = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_config_unknown_mode() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[capture]\ncapture_mode = \"everything\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_config_prefix() {
        let mut config = Config::default();
        config.export.file_prefix = "../escape".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_startup_delays_sorted() {
        let config = SupervisorConfig {
            enabled: true,
            interval_ms: 10,
            startup_delays_ms: vec![5000, 2000],
        };
        assert_eq!(
            config.startup_delays(),
            vec![Duration::from_millis(2000), Duration::from_millis(5000)]
        );
    }

    #[test]
    fn test_capture_mode_from_str() {
        assert_eq!("all".parse::<CaptureMode>().unwrap(), CaptureMode::All);
        assert_eq!(
            "chat-only".parse::<CaptureMode>().unwrap(),
            CaptureMode::ChatOnly
        );
        assert_eq!("custom".parse::<CaptureMode>().unwrap(), CaptureMode::Custom);
        assert!(matches!(
            "Custom".parse::<CaptureMode>(),
            Err(TapError::InvalidConfig(_))
        ));
        assert_eq!(CaptureMode::ChatOnly.to_string(), "chat-only");
    }
}
