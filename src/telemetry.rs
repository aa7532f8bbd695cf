//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the application. These helpers cover the common cases.
//!
//! ```rust,ignore
//! use initfetch::telemetry::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! init_subscriber(
//!     SubscriberConfig::builder()
//!         .log_level(tracing::Level::DEBUG)
//!         .output_format(OutputFormat::Json)
//!         .build(),
//! )?;
//! ```

use std::str::FromStr;

use tracing::Level;

use crate::defaults;
use crate::error::{FetchError, Result};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonCompact,
}

impl FromStr for OutputFormat {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-compact" => Ok(Self::JsonCompact),
            _ => Err(FetchError::Configuration(format!(
                "Invalid log format: {s}. Valid options: text, json, json-compact"
            ))),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: Level,
    pub output_format: OutputFormat,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            output_format: OutputFormat::Text,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    /// Text output at debug level; shows every dispatched request.
    pub fn debug() -> Self {
        Self {
            log_level: Level::DEBUG,
            output_format: OutputFormat::Text,
        }
    }

    /// Filter directive restricting output to this crate.
    pub fn filter(&self) -> String {
        format!(
            "initfetch={}",
            self.log_level.as_str().to_ascii_lowercase()
        )
    }
}

#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<Level>,
    output_format: Option<OutputFormat>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Parse one of `trace`, `debug`, `info`, `warn`, `error` (any case).
    pub fn log_level_str(mut self, level: &str) -> Result<Self> {
        let parsed = Level::from_str(level.trim()).map_err(|_| {
            FetchError::Configuration(format!(
                "Invalid log level: {level}. Valid options: trace, debug, info, warn, error"
            ))
        })?;
        self.log_level = Some(parsed);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
        }
    }
}

/// Install a global `fmt` subscriber.
///
/// Succeeds without doing anything if a global subscriber is already set.
pub fn init_subscriber(config: SubscriberConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(true);

    let init_result = match config.output_format {
        OutputFormat::Text => builder.try_init(),
        OutputFormat::Json => builder.with_thread_ids(true).json().try_init(),
        OutputFormat::JsonCompact => builder
            .with_thread_ids(true)
            .json()
            .flatten_event(true)
            .try_init(),
    };

    match init_result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("has already been set") => Ok(()),
        Err(e) => Err(FetchError::Configuration(format!(
            "Failed to initialize tracing: {e}"
        ))),
    }
}

pub fn init_default() -> Result<()> {
    init_subscriber(SubscriberConfig::default())
}

pub fn init_debug() -> Result<()> {
    init_subscriber(SubscriberConfig::debug())
}

/// Build a config from `INITFETCH_LOG_LEVEL` and `INITFETCH_LOG_FORMAT`.
///
/// Unset variables keep their defaults; invalid values are an error.
pub fn config_from_env() -> Result<SubscriberConfig> {
    let mut builder = SubscriberConfig::builder();
    if let Ok(level) = std::env::var(defaults::env::LOG_LEVEL) {
        builder = builder.log_level_str(&level)?;
    }
    if let Ok(format) = std::env::var(defaults::env::LOG_FORMAT) {
        builder = builder.output_format(format.parse()?);
    }
    Ok(builder.build())
}

pub fn init_from_env() -> Result<()> {
    init_subscriber(config_from_env()?)
}
