//! Registry Configuration
//!
//! Configuration can be set programmatically or loaded from environment
//! variables.
//!
//! # Environment Variables
//!
//! All environment variables use the `CELLREG_` prefix:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CELLREG_INITIAL_CAPACITY` | Arena slots reserved up front | 16 |
//! | `CELLREG_MAX_OWNED_BYTES` | Ceiling on live registry-owned bytes (0 = unlimited) | 0 |
//! | `CELLREG_VERIFY` | Check links around each mutated cell ("true"/"false") | on in debug builds |
//! | `CELLREG_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | info |
//!
//! # Example
//!
//! ```rust
//! use cellreg::config::RegistryConfig;
//!
//! let config = RegistryConfig::builder()
//!     .initial_capacity(64)
//!     .max_owned_bytes(1024 * 1024)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.memory.initial_capacity, 64);
//! ```

use std::env;

use thiserror::Error;
use tracing::warn;

use crate::registry::MAX_CELLS;

/// Log level for registry diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// No logging.
    Off,
    /// Error messages only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages (default).
    #[default]
    Info,
    /// Debug messages.
    Debug,
    /// Trace-level messages.
    Trace,
}

impl LogLevel {
    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "none" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Convert to a string; doubles as a `tracing` filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Memory configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Arena slots reserved when the registry is created.
    /// Default: 16.
    pub initial_capacity: usize,

    /// Ceiling on live registry-owned bytes.
    /// 0 means unlimited (default).
    pub max_owned_bytes: usize,

    /// Check the links around each mutated cell after every structural
    /// mutation. The full [`CellRegistry::verify`](crate::CellRegistry::verify)
    /// walk stays an explicit call.
    /// Default: on in debug builds.
    pub verify_on_mutation: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            max_owned_bytes: 0, // Unlimited
            verify_on_mutation: cfg!(debug_assertions),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log level.
    /// Default: Info.
    pub level: LogLevel,
}

/// Complete registry configuration.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Memory configuration.
    pub memory: MemoryConfig,

    /// Logging configuration.
    pub log: LogConfig,
}

impl RegistryConfig {
    /// Create a new builder for RegistryConfig.
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their default values. Rejected values also keep
    /// the default and are reported with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = parse_env_usize("CELLREG_INITIAL_CAPACITY") {
            if val <= MAX_CELLS {
                config.memory.initial_capacity = val;
            } else {
                warn!(
                    var = "CELLREG_INITIAL_CAPACITY",
                    value = val,
                    max = MAX_CELLS,
                    "ignoring oversize value"
                );
            }
        }

        if let Some(val) = parse_env_usize("CELLREG_MAX_OWNED_BYTES") {
            config.memory.max_owned_bytes = val;
        }

        if let Some(val) = parse_env_bool("CELLREG_VERIFY") {
            config.memory.verify_on_mutation = val;
        }

        if let Ok(val) = env::var("CELLREG_LOG_LEVEL") {
            match LogLevel::parse(&val) {
                Some(level) => config.log.level = level,
                None => reject("CELLREG_LOG_LEVEL", &val),
            }
        }

        config
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.initial_capacity > MAX_CELLS {
            return Err(ConfigError::InvalidValue {
                field: "memory.initial_capacity".into(),
                message: format!("must be at most {}", MAX_CELLS),
            });
        }

        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("invalid configuration for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },
}

/// Builder for RegistryConfig.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of arena slots reserved up front.
    pub fn initial_capacity(mut self, slots: usize) -> Self {
        self.config.memory.initial_capacity = slots;
        self
    }

    /// Set the ceiling on live registry-owned bytes (0 = unlimited).
    pub fn max_owned_bytes(mut self, bytes: usize) -> Self {
        self.config.memory.max_owned_bytes = bytes;
        self
    }

    /// Enable or disable invariant checks after every mutation.
    pub fn verify_on_mutation(mut self, enabled: bool) -> Self {
        self.config.memory.verify_on_mutation = enabled;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log.level = level;
        self
    }

    /// Build the configuration.
    ///
    /// This validates the configuration and returns an error if invalid.
    pub fn build(self) -> Result<RegistryConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build the configuration without validation.
    pub fn build_unchecked(self) -> RegistryConfig {
        self.config
    }
}

fn reject(name: &str, value: &str) {
    warn!(var = name, value, "ignoring unparsable value");
}

/// Parse an environment variable as usize.
fn parse_env_usize(name: &str) -> Option<usize> {
    let raw = env::var(name).ok()?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        reject(name, &raw);
    }
    parsed
}

/// Parse an environment variable as bool.
fn parse_env_bool(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    let parsed = match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    };
    if parsed.is_none() {
        reject(name, &raw);
    }
    parsed
}
