//! Kestrel Configuration System.
//!
//! Provides configuration for embedders of the Kestrel engine:
//! - Engine tuning (tier-up threshold, scavenge trigger, call depth)
//! - Debugger defaults (exception-break toggles, command queue sizing)
//! - Logging filter directives.
//!
//! # Configuration Hierarchy.
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.kestrel/config.toml)
//! 2. Project config (./kestrel.toml, searched upward)
//! 3. Environment variables (KESTREL_*)
//! 4. Embedder overrides (handled by caller).
//!
//! # Example.
//!
//! ```no_run
//! use kestrel_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! assert!(config.optimize_after_calls() > 0);
//! ```

pub mod loader;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use settings::{DebuggerSettings, EngineSettings, KestrelConfig, LoggingSettings};
