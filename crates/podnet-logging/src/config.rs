//! Logging configuration
//!
//! A [`LogConfig`] names where events go (console, rolling file, or both)
//! and which levels pass. Per-target overrides let a node run the federation
//! core at `debug` while keeping storage at `info`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tracing targets of the PodNet crates
pub const PODNET_TARGETS: [&str; 4] = [
    "podnet_core",
    "podnet_storage",
    "podnet_federation",
    "podnet_logging",
];

/// Main logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for every target without an override (RUST_LOG wins over it)
    pub level: String,
    /// Per-target level overrides, e.g. `podnet_federation = "debug"`
    pub targets: BTreeMap<String, String>,
    /// Console output, disabled when `None`
    pub console: Option<ConsoleOutput>,
    /// Rolling file output, disabled when `None`
    pub file: Option<FileOutput>,
    /// Fields carried by JSON lines
    pub json: JsonFields,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            targets: BTreeMap::new(),
            console: Some(ConsoleOutput::default()),
            file: None,
            json: JsonFields::default(),
        }
    }
}

impl LogConfig {
    /// Pretty colored console, PodNet crates at `debug`
    pub fn development() -> Self {
        let mut config = Self {
            console: Some(ConsoleOutput {
                format: ConsoleFormat::Pretty,
                ansi: true,
            }),
            ..Default::default()
        };
        for target in PODNET_TARGETS {
            config = config.with_target(target, "debug");
        }
        config
    }

    /// JSON lines to daily-rotated files under `log_dir`, no console
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: None,
            file: Some(FileOutput::new(log_dir)),
            ..Default::default()
        }
    }

    /// Compact console output of warnings and errors only
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            console: Some(ConsoleOutput {
                format: ConsoleFormat::Compact,
                ansi: false,
            }),
            ..Default::default()
        }
    }

    /// Set the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// `EnvFilter` directives: the base level followed by target overrides
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(
                self.targets
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// How console lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConsoleFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line human-readable output
    Pretty,
    /// Single-line human-readable output
    Compact,
}

/// Console output settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsoleOutput {
    pub format: ConsoleFormat,
    /// ANSI colors, ignored for JSON
    pub ansi: bool,
}

/// Rolling file output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutput {
    /// Directory for log files, created if missing
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
    pub rotation: Rotation,
}

impl FileOutput {
    /// Daily-rotated `podnet.*.log` files in `directory`
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            prefix: "podnet".to_string(),
            rotation: Rotation::Daily,
        }
    }

    /// Use a different file name prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Use a different rotation
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// When log files roll over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    /// A single file, truncated on start
    Never,
}

/// Fields carried by JSON lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Put event fields at the top level instead of under `fields`
    pub flatten: bool,
    /// Include the list of entered spans (e.g. `federation_round`)
    pub spans: bool,
    /// Include source file and line
    pub location: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            flatten: true,
            spans: true,
            location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_json_console() {
        let config = LogConfig::default();
        assert_eq!(config.filter_directives(), "info");
        assert_eq!(config.console.unwrap().format, ConsoleFormat::Json);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_development_raises_podnet_targets() {
        let config = LogConfig::development();
        let directives = config.filter_directives();
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("podnet_federation=debug"));
        assert!(directives.contains("podnet_storage=debug"));
        assert!(config.console.unwrap().ansi);
    }

    #[test]
    fn test_production_writes_files_only() {
        let config = LogConfig::production(PathBuf::from("/var/log/podnet"));
        assert!(config.console.is_none());
        let file = config.file.unwrap();
        assert_eq!(file.prefix, "podnet");
        assert_eq!(file.rotation, Rotation::Daily);
    }

    #[test]
    fn test_target_override_replaces_previous() {
        let config = LogConfig::testing()
            .with_target("podnet_federation", "debug")
            .with_target("podnet_federation", "trace");
        assert_eq!(config.filter_directives(), "warn,podnet_federation=trace");
    }
}
