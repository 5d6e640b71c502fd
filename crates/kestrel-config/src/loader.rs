//! Configuration Loader.
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{
    KestrelConfig, DEFAULT_COMMAND_QUEUE_CAPACITY, DEFAULT_LOG_FILTER, DEFAULT_MAX_CALL_DEPTH,
    DEFAULT_OPTIMIZE_AFTER_CALLS, DEFAULT_WAIT_TIMEOUT_MS, DEFAULT_YOUNG_GENERATION_FUNCTIONS,
};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name.
pub const PROJECT_CONFIG_FILE: &str = "kestrel.toml";

/// Configuration loader.
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.kestrel/config.toml) - lowest priority
/// 2. Project config (./kestrel.toml) - overrides global
/// 3. Environment variables (KESTREL_*) - overrides project.
pub struct ConfigLoader {
    /// Cached global config path.
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Merged file configuration.
    pub settings: KestrelConfig,

    /// Directory where kestrel.toml was found.
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from an explicit path.
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory.
    ///
    /// Walks up the directory tree to find kestrel.toml, then merges it over
    /// the global config if one exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        let global = self.load_global_config()?;
        let settings = apply_env_overrides(global.merge(project))?;

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Load configuration from a specific project config file.
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = KestrelConfig::load_from_file(config_path)?;
        let global = self.load_global_config()?;
        let settings = apply_env_overrides(global.merge(project))?;

        Ok(Config {
            settings,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree.
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, KestrelConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project = KestrelConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, KestrelConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.kestrel/config.toml.
    fn load_global_config(&mut self) -> ConfigResult<KestrelConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match Self::global_config_dir() {
                Ok(dir) => {
                    let path = dir.join("config.toml");
                    self.global_config_path = Some(path.clone());
                    path
                }
                // No home directory means no global config
                Err(ConfigError::HomeNotFound) => return Ok(KestrelConfig::default()),
                Err(e) => return Err(e),
            },
        };

        // Global config is optional
        if !path.exists() {
            return Ok(KestrelConfig::default());
        }

        KestrelConfig::load_from_file(&path)
    }

    /// Get the global configuration directory (~/.kestrel).
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".kestrel"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides.
///
/// Recognized variables: `KESTREL_OPTIMIZE_AFTER`, `KESTREL_BREAK_ON_CAUGHT`,
/// `KESTREL_BREAK_ON_UNCAUGHT`, `KESTREL_LOG`.
fn apply_env_overrides(mut config: KestrelConfig) -> ConfigResult<KestrelConfig> {
    if let Ok(value) = env::var("KESTREL_OPTIMIZE_AFTER") {
        let calls: u32 = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: "KESTREL_OPTIMIZE_AFTER".to_string(),
            reason: format!("'{}' is not a number", value),
        })?;
        config.engine.get_or_insert_with(Default::default).optimize_after_calls = Some(calls);
    }

    if let Ok(value) = env::var("KESTREL_BREAK_ON_CAUGHT") {
        config.debugger.get_or_insert_with(Default::default).break_on_caught =
            Some(parse_flag(&value));
    }

    if let Ok(value) = env::var("KESTREL_BREAK_ON_UNCAUGHT") {
        config.debugger.get_or_insert_with(Default::default).break_on_uncaught =
            Some(parse_flag(&value));
    }

    if let Ok(filter) = env::var("KESTREL_LOG") {
        config.logging.get_or_insert_with(Default::default).filter = Some(filter);
    }

    config.validate()?;
    Ok(config)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    /// Effective tier-up threshold.
    pub fn optimize_after_calls(&self) -> u32 {
        self.settings
            .engine
            .as_ref()
            .and_then(|e| e.optimize_after_calls)
            .unwrap_or(DEFAULT_OPTIMIZE_AFTER_CALLS)
    }

    /// Effective scavenge trigger.
    pub fn young_generation_functions(&self) -> usize {
        self.settings
            .engine
            .as_ref()
            .and_then(|e| e.young_generation_functions)
            .unwrap_or(DEFAULT_YOUNG_GENERATION_FUNCTIONS)
    }

    /// Effective maximum call depth.
    pub fn max_call_depth(&self) -> usize {
        self.settings
            .engine
            .as_ref()
            .and_then(|e| e.max_call_depth)
            .unwrap_or(DEFAULT_MAX_CALL_DEPTH)
    }

    /// Initial break-on-caught toggle.
    pub fn break_on_caught(&self) -> bool {
        self.settings
            .debugger
            .as_ref()
            .and_then(|d| d.break_on_caught)
            .unwrap_or(false)
    }

    /// Initial break-on-uncaught toggle.
    pub fn break_on_uncaught(&self) -> bool {
        self.settings
            .debugger
            .as_ref()
            .and_then(|d| d.break_on_uncaught)
            .unwrap_or(false)
    }

    /// Initial command queue capacity.
    pub fn command_queue_capacity(&self) -> usize {
        self.settings
            .debugger
            .as_ref()
            .and_then(|d| d.command_queue_capacity)
            .unwrap_or(DEFAULT_COMMAND_QUEUE_CAPACITY)
    }

    /// Poll slice for blocking command waits.
    pub fn wait_timeout_ms(&self) -> u64 {
        self.settings
            .debugger
            .as_ref()
            .and_then(|d| d.wait_timeout_ms)
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_MS)
    }

    /// Tracing filter directive.
    pub fn log_filter(&self) -> &str {
        self.settings
            .logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }
}
