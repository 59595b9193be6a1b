//! Structured logging for PodNet federation nodes
//!
//! Every crate in the workspace logs through `tracing` with structured
//! fields (`pod`, `kind`, `count`, ...). This crate installs the global
//! subscriber that writes those events to the console, to rolling JSONL
//! files, or both.
//!
//! # Quick Start
//!
//! ```ignore
//! use podnet_logging::{LogConfig, PodNetSubscriberBuilder};
//!
//! // JSON lines on stdout
//! podnet_logging::init_default()?;
//!
//! // Pretty output with the federation core at trace level
//! PodNetSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .with_target("podnet_federation", "trace")
//!     .init()?;
//! ```
//!
//! `RUST_LOG` always takes precedence over the configured directives.

pub mod config;

pub use config::{
    ConsoleFormat, ConsoleOutput, FileOutput, JsonFields, LogConfig, PODNET_TARGETS, Rotation,
};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter directive: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to create rolling appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builder for the global PodNet subscriber
#[derive(Debug, Clone, Default)]
pub struct PodNetSubscriberBuilder {
    config: LogConfig,
}

impl PodNetSubscriberBuilder {
    /// Builder with the default configuration (JSON lines on stdout)
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.config = self.config.with_target(target, level);
        self
    }

    /// Set or disable console output
    pub fn with_console(mut self, console: Option<ConsoleOutput>) -> Self {
        self.config.console = console;
        self
    }

    /// Also write JSON lines to rolling files
    pub fn with_file(mut self, file: FileOutput) -> Self {
        self.config.file = Some(file);
        self
    }

    /// Install the subscriber globally
    ///
    /// With file output the returned guard flushes the background writer
    /// when dropped; keep it alive for the life of the process.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.config.filter_directives())?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if let Some(console) = &self.config.console {
            layers.push(console_layer(console, &self.config.json));
        }

        let mut guard = None;
        if let Some(file) = &self.config.file {
            let (writer, file_guard) = file_writer(file)?;
            layers.push(json_layer(&self.config.json, writer));
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()?;

        Ok(guard)
    }
}

fn console_layer(console: &ConsoleOutput, json: &JsonFields) -> BoxedLayer {
    match console.format {
        ConsoleFormat::Json => json_layer(json, std::io::stdout),
        ConsoleFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(console.ansi)
            .boxed(),
        ConsoleFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(console.ansi)
            .with_target(true)
            .boxed(),
    }
}

fn json_layer<W>(fields: &JsonFields, writer: W) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(fields.flatten)
        .with_current_span(fields.spans)
        .with_span_list(fields.spans)
        .with_file(fields.location)
        .with_line_number(fields.location)
        .with_writer(writer)
        .boxed()
}

/// Non-blocking writer for file output
fn file_writer(file: &FileOutput) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match file.rotation {
        Rotation::Never => {
            fs::create_dir_all(&file.directory)?;
            let log = File::create(file.directory.join(format!("{}.log", file.prefix)))?;
            return Ok(tracing_appender::non_blocking(log));
        }
        Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file.prefix.as_str())
        .filename_suffix("log")
        .build(&file.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the default subscriber (JSON lines on stdout)
pub fn init_default() -> Result<Option<WorkerGuard>, LoggingError> {
    PodNetSubscriberBuilder::new().init()
}

/// Install the development subscriber (pretty console, PodNet crates at debug)
pub fn init_development() -> Result<Option<WorkerGuard>, LoggingError> {
    PodNetSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Install the testing subscriber
///
/// Safe to call from every test: a subscriber installed earlier is kept.
pub fn init_testing() {
    let _ = PodNetSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder_overrides() {
        let builder = PodNetSubscriberBuilder::new()
            .with_level("warn")
            .with_target("podnet_storage", "trace")
            .with_console(None);
        assert_eq!(
            builder.config.filter_directives(),
            "warn,podnet_storage=trace"
        );
        assert!(builder.config.console.is_none());
    }

    #[test]
    fn test_single_file_writer_creates_file() {
        let temp = TempDir::new().unwrap();
        let output = FileOutput::new(temp.path().join("logs"))
            .with_prefix("node")
            .with_rotation(Rotation::Never);

        let (_writer, _guard) = file_writer(&output).unwrap();
        assert!(temp.path().join("logs").join("node.log").exists());
    }

    #[test]
    fn test_bad_directive_is_reported() {
        // Only reached when RUST_LOG is unset
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let err = PodNetSubscriberBuilder::new()
            .with_target("podnet_core", "not-a-level")
            .init()
            .unwrap_err();
        assert!(matches!(err, LoggingError::Filter(_)));
    }

    #[test]
    fn test_init_testing_is_idempotent() {
        init_testing();
        init_testing();
    }
}
