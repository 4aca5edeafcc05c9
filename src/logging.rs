//! Logging setup for route-injector
//!
//! Decoration, resolution and teardown emit `tracing` events under the
//! `route_injector` target. This module installs a subscriber for them.
//!
//! # Features
//!
//! - `logging` - Emit events (default)
//! - `logging-json` - JSON subscriber output
//! - `logging-pretty` - Human-readable subscriber output
//!
//! # Example
//!
//! ```rust,ignore
//! use route_injector::{logging, Settings};
//!
//! // Default format for the enabled features
//! logging::init();
//!
//! // Or follow the `[logging]` section of the settings file
//! let settings = Settings::load()?;
//! logging::init_from_settings(&settings);
//!
//! // Or configure by hand
//! logging::builder()
//!     .with_level(tracing::Level::TRACE)
//!     .crate_only()
//!     .pretty()
//!     .init();
//! ```

use serde::{Deserialize, Serialize};

#[cfg(feature = "logging")]
use crate::settings::{LogSettings, Settings};
#[cfg(feature = "logging")]
use tracing::Level;

/// Target of every event this crate emits.
pub const TARGET: &str = "route_injector";

/// Subscriber output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Pretty colorful output (development)
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Which source locations and thread details each event carries.
#[cfg(feature = "logging")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Decorations {
    file: bool,
    line_number: bool,
    thread_ids: bool,
    thread_names: bool,
}

/// Subscriber configuration for route-injector events.
///
/// Starts at `DEBUG` with JSON output and no target filter.
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    decorations: Decorations,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            decorations: Decorations::default(),
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take level and format from a `[logging]` settings section.
    ///
    /// An unrecognised level keeps the current one.
    pub fn with_settings(mut self, settings: &LogSettings) -> Self {
        if let Ok(level) = settings.level.parse::<Level>() {
            self.level = level;
        }
        self.format = settings.format;
        self
    }

    /// Lowest level that is recorded.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Record every provider call and cache hit.
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Record scope and decoration details.
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Record app creation and route registration only.
    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Record dropped scopes and worse.
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Record failed teardowns and 5xx responses only.
    pub fn error(self) -> Self {
        self.with_level(Level::ERROR)
    }

    /// Only show events from `target`.
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show route-injector events.
    pub fn crate_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Add the source file to each event.
    pub fn with_file(mut self) -> Self {
        self.decorations.file = true;
        self
    }

    /// Add the source line to each event.
    pub fn with_line_number(mut self) -> Self {
        self.decorations.line_number = true;
        self
    }

    /// Add the emitting thread's id, useful with concurrent requests.
    pub fn with_thread_ids(mut self) -> Self {
        self.decorations.thread_ids = true;
        self
    }

    /// Add the emitting thread's name.
    pub fn with_thread_names(mut self) -> Self {
        self.decorations.thread_names = true;
        self
    }

    /// One JSON object per event.
    pub fn json(self) -> Self {
        self.with_format(LogFormat::Json)
    }

    /// Multi-line, colored output.
    pub fn pretty(self) -> Self {
        self.with_format(LogFormat::Pretty)
    }

    /// Single-line output.
    pub fn compact(self) -> Self {
        self.with_format(LogFormat::Compact)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter_directive(&self) -> String {
        match self.target {
            Some(target) => format!("{}={}", target, self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the subscriber globally.
    ///
    /// Does nothing if a global subscriber is already set. JSON output falls
    /// back to the default text format without `logging-json`.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::new(self.filter_directive());
        let Decorations {
            file,
            line_number,
            thread_ids,
            thread_names,
        } = self.decorations;

        macro_rules! install {
            ($layer:expr) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(
                        $layer
                            .with_file(file)
                            .with_line_number(line_number)
                            .with_thread_ids(thread_ids)
                            .with_thread_names(thread_names)
                            .with_target(true),
                    )
                    .try_init()
            };
        }

        let result = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => install!(fmt::layer().json()),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => install!(fmt::layer()),
            LogFormat::Pretty => install!(fmt::layer().pretty()),
            LogFormat::Compact => install!(fmt::layer().compact()),
        };

        if let Err(e) = result {
            tracing::debug!(target: "route_injector", error = %e, "Subscriber already installed");
        }
    }

    /// No-op without a subscriber feature.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize logging with the default format for the enabled features.
#[cfg(feature = "logging")]
pub fn init() {
    #[cfg(feature = "logging-json")]
    {
        init_json();
    }
    #[cfg(not(feature = "logging-json"))]
    {
        init_pretty();
    }
}

/// JSON output at DEBUG.
///
/// # Example output
/// ```json
/// {"timestamp":"2026-01-01T00:00:00.000Z","level":"INFO","target":"route_injector","fields":{"message":"Route registered","method":"GET","path":"/items"}}
/// ```
#[cfg(feature = "logging")]
pub fn init_json() {
    builder().json().debug().init();
}

/// Human-readable output at DEBUG.
#[cfg(feature = "logging")]
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Only route-injector events, at DEBUG.
#[cfg(feature = "logging")]
pub fn init_crate_only() {
    builder().crate_only().debug().init();
}

/// Level and format from the application settings.
#[cfg(feature = "logging")]
pub fn init_from_settings(settings: &Settings) {
    builder().with_settings(&settings.logging).init();
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert!(builder.target.is_none());
        assert_eq!(builder.filter_directive(), "DEBUG");
    }

    #[test]
    fn test_builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .pretty()
            .with_file()
            .with_line_number()
            .crate_only();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.decorations.file);
        assert!(builder.decorations.line_number);
        assert!(!builder.decorations.thread_ids);
        assert_eq!(builder.target, Some("route_injector"));
        assert_eq!(builder.filter_directive(), "route_injector=TRACE");
    }

    #[test]
    fn test_builder_from_settings() {
        let settings = LogSettings {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        };
        let builder = LoggingBuilder::new().with_settings(&settings);
        assert_eq!(builder.level, Level::WARN);
        assert_eq!(builder.format, LogFormat::Compact);

        let settings = LogSettings {
            level: "loud".to_string(),
            format: LogFormat::Pretty,
        };
        let builder = LoggingBuilder::new().info().with_settings(&settings);
        assert_eq!(builder.level, Level::INFO);
        assert_eq!(builder.format, LogFormat::Pretty);
    }

    #[test]
    fn test_format_names() {
        let format: LogFormat = serde_json::from_str("\"compact\"").unwrap();
        assert_eq!(format, LogFormat::Compact);
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
    }
}
