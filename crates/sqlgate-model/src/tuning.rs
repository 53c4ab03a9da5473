use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use crate::error::ConfigError;

pub const PROXY_BINARY_VAR: &str = "SQLGATE_PROXY_BINARY";
pub const PROXY_PORT_VAR: &str = "SQLGATE_PROXY_PORT";
pub const READY_TIMEOUT_VAR: &str = "SQLGATE_READY_TIMEOUT_SECS";
pub const KILL_GRACE_VAR: &str = "SQLGATE_KILL_GRACE_MS";
pub const READY_MARKER_VAR: &str = "SQLGATE_READY_MARKER";
pub const READY_STREAM_VAR: &str = "SQLGATE_READY_STREAM";
pub const MIGRATIONS_DIR_VAR: &str = "SQLGATE_MIGRATIONS_DIR";

/// Which of the tunnel's output streams is scanned for the readiness marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyStream {
    Stdout,
    Stderr,
    #[default]
    Both,
}

impl ReadyStream {
    pub fn scans_stdout(self) -> bool {
        matches!(self, ReadyStream::Stdout | ReadyStream::Both)
    }

    pub fn scans_stderr(self) -> bool {
        matches!(self, ReadyStream::Stderr | ReadyStream::Both)
    }
}

impl FromStr for ReadyStream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(ReadyStream::Stdout),
            "stderr" => Ok(ReadyStream::Stderr),
            "both" => Ok(ReadyStream::Both),
            _ => Err("expected stdout|stderr|both".to_string()),
        }
    }
}

impl fmt::Display for ReadyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadyStream::Stdout => "stdout",
            ReadyStream::Stderr => "stderr",
            ReadyStream::Both => "both",
        })
    }
}

/// Optional knobs; defaults reproduce the stock `cloud_sql_proxy` setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub proxy_binary: String,
    pub proxy_port: u16,
    pub ready_timeout: Duration,
    pub kill_grace: Duration,
    pub ready_marker: String,
    pub ready_stream: ReadyStream,
    pub migrations_dir: PathBuf,
}

impl Tuning {
    pub const DEFAULT_PROXY_BINARY: &'static str = "cloud_sql_proxy";
    pub const DEFAULT_PROXY_PORT: u16 = 5800;
    pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(3_000);
    pub const DEFAULT_READY_MARKER: &'static str = "Ready for new connections";
    pub const DEFAULT_MIGRATIONS_DIR: &'static str = "migrations";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut tuning = Self::default();

        if let Some(v) = get(PROXY_BINARY_VAR) {
            tuning.proxy_binary = v.trim().to_string();
        }
        if let Some(v) = get(PROXY_PORT_VAR) {
            tuning.proxy_port = match v.trim().parse::<u16>() {
                Ok(0) => return Err(ConfigError::invalid(PROXY_PORT_VAR, &v, "port must be non-zero")),
                Ok(port) => port,
                Err(e) => return Err(ConfigError::invalid(PROXY_PORT_VAR, &v, e)),
            };
        }
        if let Some(v) = get(READY_TIMEOUT_VAR) {
            let secs = parse_positive(READY_TIMEOUT_VAR, &v)?;
            tuning.ready_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get(KILL_GRACE_VAR) {
            let ms = v
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid(KILL_GRACE_VAR, &v, e))?;
            tuning.kill_grace = Duration::from_millis(ms);
        }
        // The marker is matched verbatim, surrounding whitespace included.
        if let Some(v) = get(READY_MARKER_VAR) {
            tuning.ready_marker = v;
        }
        if let Some(v) = get(READY_STREAM_VAR) {
            tuning.ready_stream = v
                .parse()
                .map_err(|e: String| ConfigError::invalid(READY_STREAM_VAR, &v, e))?;
        }
        if let Some(v) = get(MIGRATIONS_DIR_VAR) {
            tuning.migrations_dir = PathBuf::from(v.trim());
        }
        Ok(tuning)
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            proxy_binary: Self::DEFAULT_PROXY_BINARY.to_string(),
            proxy_port: Self::DEFAULT_PROXY_PORT,
            ready_timeout: Self::DEFAULT_READY_TIMEOUT,
            kill_grace: Self::DEFAULT_KILL_GRACE,
            ready_marker: Self::DEFAULT_READY_MARKER.to_string(),
            ready_stream: ReadyStream::default(),
            migrations_dir: PathBuf::from(Self::DEFAULT_MIGRATIONS_DIR),
        }
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(var, value, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::invalid(var, value, e)),
    }
}
