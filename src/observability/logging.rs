//! Logging setup on top of `tracing-subscriber`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for development.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
    /// Single-line compact output.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level when `RUST_LOG` does not say otherwise.
    pub level: LevelFilter,
    /// Output format.
    pub format: LogFormat,
    /// Include the module target in each line.
    pub include_target: bool,
    /// Write to stderr instead of stdout. Stdio-based hosts need this.
    pub use_stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Pretty,
            include_target: true,
            use_stderr: true,
        }
    }
}

impl LoggingConfig {
    /// Creates a new logging configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum level.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets whether to include the module target.
    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    /// Sets whether to log to stderr.
    pub fn with_stderr(mut self, use_stderr: bool) -> Self {
        self.use_stderr = use_stderr;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy()
    }

    /// Installs the global subscriber. Call once at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.filter();
        let registry = tracing_subscriber::registry().with(filter);

        match (self.format, self.use_stderr) {
            (LogFormat::Pretty, true) => registry
                .with(fmt::layer().with_target(self.include_target).with_writer(std::io::stderr))
                .try_init()?,
            (LogFormat::Pretty, false) => registry
                .with(fmt::layer().with_target(self.include_target))
                .try_init()?,
            (LogFormat::Json, true) => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?,
            (LogFormat::Json, false) => registry.with(fmt::layer().json()).try_init()?,
            (LogFormat::Compact, true) => registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()?,
            (LogFormat::Compact, false) => registry.with(fmt::layer().compact()).try_init()?,
        }

        Ok(())
    }
}
