//! Gateway connection configuration.

use std::time::Duration;

/// Severity threshold for gateway log output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warning,
    /// Notices and above.
    Notice,
    /// Informational messages and above.
    Info,
    /// Everything, including frame-level traces.
    Debug,
}

/// Switches controlling the shape of each log line.
#[derive(Clone, Copy, Debug)]
pub struct LogFormat {
    /// Include timestamps.
    pub ts: bool,
    /// Include source file and line.
    pub location: bool,
    /// Include the emitting module path.
    pub function: bool,
    /// Include the thread id.
    pub thread: bool,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self {
            ts: true,
            location: false,
            function: true,
            thread: true,
        }
    }
}

/// Log level, format, and transport channel masks.
///
/// `transport_include` / `transport_exclude` are bit masks over the
/// transport log channels defined in [`crate::logging`]; they filter which
/// wire-level debug lines the transport emits.
#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    /// Severity threshold. Defaults to [`LogLevel::Info`].
    pub level: LogLevel,
    /// Per-line format switches.
    pub format: LogFormat,
    /// Optional include mask for transport logging.
    pub transport_include: Option<u32>,
    /// Optional exclude mask for transport logging.
    pub transport_exclude: Option<u32>,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

/// Configuration snapshotted by [`crate::gateway::Gateway::connect`].
#[derive(Clone, Debug)]
pub struct Config {
    /// WebSocket URL of the platform service.
    pub ws_url: String,
    /// How long a pending request may wait for its response.
    pub request_timeout: Duration,
    /// How often the watchdog scans for stale pending requests.
    pub watchdog_cycle: Duration,
    /// Logging settings.
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9998".to_string(),
            request_timeout: Duration::from_millis(3000),
            watchdog_cycle: Duration::from_millis(500),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Create a configuration pointing at the given URL.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the watchdog scan cycle.
    #[must_use]
    pub fn watchdog_cycle(mut self, cycle: Duration) -> Self {
        self.watchdog_cycle = cycle;
        self
    }

    /// Set the log level.
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log.level = level;
        self
    }

    /// Set the log format switches.
    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log.format = format;
        self
    }

    /// Set the transport log channel masks.
    #[must_use]
    pub fn transport_log_mask(mut self, include: Option<u32>, exclude: Option<u32>) -> Self {
        self.log.transport_include = include;
        self.log.transport_exclude = exclude;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.ws_url.is_empty() {
            return Err("WebSocket URL cannot be empty".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("Request timeout must be > 0".to_string());
        }
        if self.watchdog_cycle.is_zero() {
            return Err("Watchdog cycle must be > 0".to_string());
        }
        Ok(())
    }

    /// The URL actually dialed: the configured URL with `RPCv2=true`
    /// appended as a query parameter.
    pub fn connection_url(&self) -> String {
        let separator = if self.ws_url.contains('?') { '&' } else { '?' };
        format!("{}{}RPCv2=true", self.ws_url, separator)
    }
}
