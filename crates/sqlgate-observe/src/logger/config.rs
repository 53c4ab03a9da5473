use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Filter directive for the global subscriber (`EnvFilter` syntax).
pub const LOG_LEVEL_VAR: &str = "SQLGATE_LOG";
/// Output format: `text`, `json` or `journald`.
pub const LOG_FORMAT_VAR: &str = "SQLGATE_LOG_FORMAT";
/// When truthy, the proxy's own output lines are logged regardless of the level filter.
pub const LOG_PROXY_VAR: &str = "SQLGATE_LOG_PROXY";

/// Target the proxy output pumps log under.
pub const PROXY_TARGET: &str = "sqlgate::proxy";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    pub proxy_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stderr().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
            proxy_output: false,
        }
    }
}

impl LoggerConfig {
    /// Build the config from the process environment.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup; blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = get(LOG_LEVEL_VAR) {
            cfg.level = level.trim().to_string();
        }
        if let Some(format) = get(LOG_FORMAT_VAR) {
            cfg.format = format.parse()?;
        }
        if let Some(flag) = get(LOG_PROXY_VAR) {
            cfg.proxy_output = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if cfg.format == LoggerFormat::Json {
            cfg.use_color = false;
        }
        Ok(cfg)
    }
}
