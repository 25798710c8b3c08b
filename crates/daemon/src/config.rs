//! Configuration management for the wintrack daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `%APPDATA%/wintrack/config.toml` (Windows standard)
//! 2. `~/.config/wintrack/config.toml` (Unix-style, for WSL compatibility)
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wintrack_core::program::DEFAULT_HOST_SHELL;
use wintrack_core::{default_shell_executable, ConfinementConfig, ConfinementPadding, ForegroundConfig};

/// Allowed range of the foreground poll interval, in milliseconds.
const POLL_INTERVAL_RANGE: (u64, u64) = (100, 60_000);

/// Allowed range of the cursor re-clip interval, in milliseconds.
const TICK_INTERVAL_RANGE: (u64, u64) = (1, 1_000);

/// Main configuration structure for wintrack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
    /// Foreground tracking configuration.
    pub foreground: ForegroundTrackingConfig,
    /// Cursor confinement configuration.
    pub cursor: CursorConfig,
}

/// Behavior-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to start the foreground tracker with the daemon.
    #[serde(default = "default_true")]
    pub track_foreground: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            track_foreground: true,
        }
    }
}

/// Foreground tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForegroundTrackingConfig {
    /// Poll the foreground window after this long without notifications.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Executable stem of the host shell that frames packaged applications.
    #[serde(default = "default_host_shell_name")]
    pub host_shell_name: String,

    /// Executables whose tool windows are never reported.
    #[serde(default = "default_suppressed_owners")]
    pub suppressed_tool_window_owners: Vec<String>,
}

impl Default for ForegroundTrackingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            host_shell_name: default_host_shell_name(),
            suppressed_tool_window_owners: default_suppressed_owners(),
        }
    }
}

/// Cursor confinement configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Interval at which the clip rectangle is re-applied, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Padding used when a confine command does not specify one.
    #[serde(default)]
    pub padding: ConfinementPadding,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            padding: ConfinementPadding::ZERO,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_host_shell_name() -> String {
    DEFAULT_HOST_SHELL.to_string()
}

fn default_suppressed_owners() -> Vec<String> {
    vec![default_shell_executable()]
}

fn default_tick_interval_ms() -> u64 {
    17
}

/// A configuration value that was out of range and has been corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Dotted path of the offending field, e.g. `cursor.tick_interval_ms`.
    pub field: String,
    pub message: String,
}

fn clamp_field(value: &mut u64, (min, max): (u64, u64), field: &str, warnings: &mut Vec<ConfigWarning>) {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        warnings.push(ConfigWarning {
            field: field.to_string(),
            message: format!("{} is outside {}..={}, using {}", value, min, max, clamped),
        });
        *value = clamped;
    }
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Tries the following locations in order:
    /// 1. `%APPDATA%/wintrack/config.toml`
    /// 2. `~/.config/wintrack/config.toml`
    /// 3. `./config.toml`
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Clamp out-of-range values in place and describe every correction.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        clamp_field(
            &mut self.foreground.poll_interval_ms,
            POLL_INTERVAL_RANGE,
            "foreground.poll_interval_ms",
            &mut warnings,
        );
        clamp_field(
            &mut self.cursor.tick_interval_ms,
            TICK_INTERVAL_RANGE,
            "cursor.tick_interval_ms",
            &mut warnings,
        );

        if self.foreground.host_shell_name.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "foreground.host_shell_name".to_string(),
                message: format!("empty, using {}", DEFAULT_HOST_SHELL),
            });
            self.foreground.host_shell_name = default_host_shell_name();
        }

        warnings
    }

    /// Settings for the foreground tracker.
    pub fn foreground_config(&self) -> ForegroundConfig {
        ForegroundConfig {
            poll_interval: Duration::from_millis(self.foreground.poll_interval_ms),
            host_shell_name: self.foreground.host_shell_name.clone(),
            suppressed_tool_window_owners: self.foreground.suppressed_tool_window_owners.clone(),
        }
    }

    /// Settings for the cursor-confinement tracker.
    pub fn confinement_config(&self) -> ConfinementConfig {
        ConfinementConfig {
            tick_interval: Duration::from_millis(self.cursor.tick_interval_ms),
        }
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Windows standard: %APPDATA%/wintrack/config.toml
    if let Some(proj_dirs) = ProjectDirs::from("com", "wintrack", "wintrack") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    // 2. Unix-style: ~/.config/wintrack/config.toml
    if let Some(home) = dirs_home() {
        paths.push(home.join(".config").join("wintrack").join("config.toml"));
    }

    // 3. Current directory: ./config.toml
    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.behavior.log_level, "info");
        assert!(config.behavior.track_foreground);
        assert_eq!(config.foreground.poll_interval_ms, 1000);
        assert_eq!(config.foreground.host_shell_name, "ApplicationFrameHost");
        assert_eq!(config.foreground.suppressed_tool_window_owners.len(), 1);
        assert!(config.foreground.suppressed_tool_window_owners[0].ends_with("explorer.exe"));
        assert_eq!(config.cursor.tick_interval_ms, 17);
        assert_eq!(config.cursor.padding, ConfinementPadding::ZERO);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_partial_parse() {
        // Config with only some fields should use defaults for the rest
        let toml_str = r#"
            [cursor]
            padding = { top = 30 }
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.cursor.padding, ConfinementPadding::new(0, 30, 0, 0));
        assert_eq!(config.cursor.tick_interval_ms, 17); // default
        assert_eq!(config.foreground.poll_interval_ms, 1000); // default
        assert!(config.behavior.track_foreground); // default
    }

    #[test]
    fn test_config_full_parse() {
        let toml_str = r#"
            [behavior]
            log_level = "debug"
            track_foreground = false

            [foreground]
            poll_interval_ms = 250
            host_shell_name = "FrameHost"
            suppressed_tool_window_owners = []

            [cursor]
            tick_interval_ms = 5
            padding = { left = 1, top = 2, right = 3, bottom = 4 }
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.behavior.log_level, "debug");
        assert!(!config.behavior.track_foreground);
        assert_eq!(config.foreground.host_shell_name, "FrameHost");
        assert!(config.foreground.suppressed_tool_window_owners.is_empty());

        let foreground = config.foreground_config();
        assert_eq!(foreground.poll_interval, Duration::from_millis(250));
        assert_eq!(foreground.host_shell_name, "FrameHost");

        assert_eq!(config.confinement_config().tick_interval, Duration::from_millis(5));
        assert_eq!(config.cursor.padding, ConfinementPadding::new(1, 2, 3, 4));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let mut config = Config::default();
        assert!(config.validate().is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_clamps_intervals() {
        let mut config = Config::default();
        config.foreground.poll_interval_ms = 5;
        config.cursor.tick_interval_ms = 0;

        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].field, "foreground.poll_interval_ms");
        assert_eq!(warnings[1].field, "cursor.tick_interval_ms");
        assert_eq!(config.foreground.poll_interval_ms, 100);
        assert_eq!(config.cursor.tick_interval_ms, 1);

        config.foreground.poll_interval_ms = 120_000;
        config.cursor.tick_interval_ms = 5_000;
        assert_eq!(config.validate().len(), 2);
        assert_eq!(config.foreground.poll_interval_ms, 60_000);
        assert_eq!(config.cursor.tick_interval_ms, 1_000);
    }

    #[test]
    fn test_validate_restores_empty_host_shell() {
        let mut config = Config::default();
        config.foreground.host_shell_name = "  ".to_string();

        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "foreground.host_shell_name");
        assert_eq!(config.foreground.host_shell_name, DEFAULT_HOST_SHELL);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[foreground]\npoll_interval_ms = 500").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.foreground.poll_interval_ms, 500);
        assert_eq!(config.cursor.tick_interval_ms, 17);
    }

    #[test]
    fn test_load_from_path_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cursor]\ntick_interval_ms = \"fast\"").unwrap();

        let err = Config::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from_path(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_config_paths_not_empty() {
        let paths = config_paths();
        assert!(!paths.is_empty());
        assert_eq!(paths.last(), Some(&PathBuf::from("config.toml")));
    }
}
