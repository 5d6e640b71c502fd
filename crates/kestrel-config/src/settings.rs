//! Configuration file schema (kestrel.toml and ~/.kestrel/config.toml).
//!
//! Both files share one schema. Every field is optional so that a file only
//! needs to mention what it overrides.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of calls before a function is tiered up to optimized code.
pub const DEFAULT_OPTIMIZE_AFTER_CALLS: u32 = 8;
/// Default number of newly compiled functions that triggers a scavenge.
pub const DEFAULT_YOUNG_GENERATION_FUNCTIONS: usize = 64;
/// Default maximum depth of the script call stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;
/// Default initial capacity of the debugger command queue.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 16;
/// Default slice, in milliseconds, for blocking waits on the command queue.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 50;
/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "kestrel=info";

/// Contents of a Kestrel configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct KestrelConfig {
    /// Engine tuning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineSettings>,

    /// Debugger defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debugger: Option<DebuggerSettings>,

    /// Logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    /// Calls before a function is optimized (default: 8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_after_calls: Option<u32>,

    /// Newly compiled functions that trigger a scavenge (default: 64).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub young_generation_functions: Option<usize>,

    /// Maximum script call depth (default: 200).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,
}

/// `[debugger]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DebuggerSettings {
    /// Break on exceptions that a script handler will catch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_on_caught: Option<bool>,

    /// Break on exceptions no script handler will catch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_on_uncaught: Option<bool>,

    /// Initial capacity of the command queue (default: 16).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_queue_capacity: Option<usize>,

    /// Poll slice for blocking waits inside a break, in milliseconds (default: 50).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `"kestrel=debug"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl KestrelConfig {
    /// Load configuration from a file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: "<string>".into(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(engine) = &self.engine {
            if engine.optimize_after_calls == Some(0) {
                return Err(invalid("engine.optimize_after_calls", "must be at least 1"));
            }
            if engine.young_generation_functions == Some(0) {
                return Err(invalid(
                    "engine.young_generation_functions",
                    "must be at least 1",
                ));
            }
            if engine.max_call_depth == Some(0) {
                return Err(invalid("engine.max_call_depth", "must be at least 1"));
            }
        }

        if let Some(debugger) = &self.debugger {
            if debugger.command_queue_capacity == Some(0) {
                return Err(invalid(
                    "debugger.command_queue_capacity",
                    "must be at least 1",
                ));
            }
            if debugger.wait_timeout_ms == Some(0) {
                return Err(invalid("debugger.wait_timeout_ms", "must be at least 1"));
            }
        }

        if let Some(logging) = &self.logging {
            if let Some(filter) = &logging.filter {
                if filter.trim().is_empty() {
                    return Err(invalid("logging.filter", "must not be empty"));
                }
            }
        }

        Ok(())
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: KestrelConfig) -> KestrelConfig {
        KestrelConfig {
            engine: merge_section(self.engine, other.engine, |base, over| EngineSettings {
                optimize_after_calls: over.optimize_after_calls.or(base.optimize_after_calls),
                young_generation_functions: over
                    .young_generation_functions
                    .or(base.young_generation_functions),
                max_call_depth: over.max_call_depth.or(base.max_call_depth),
            }),
            debugger: merge_section(self.debugger, other.debugger, |base, over| {
                DebuggerSettings {
                    break_on_caught: over.break_on_caught.or(base.break_on_caught),
                    break_on_uncaught: over.break_on_uncaught.or(base.break_on_uncaught),
                    command_queue_capacity: over
                        .command_queue_capacity
                        .or(base.command_queue_capacity),
                    wait_timeout_ms: over.wait_timeout_ms.or(base.wait_timeout_ms),
                }
            }),
            logging: merge_section(self.logging, other.logging, |base, over| LoggingSettings {
                filter: over.filter.or(base.filter),
            }),
        }
    }
}

fn merge_section<T>(base: Option<T>, over: Option<T>, combine: impl FnOnce(T, T) -> T) -> Option<T> {
    match (base, over) {
        (Some(base), Some(over)) => Some(combine(base, over)),
        (base, None) => base,
        (None, over) => over,
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
