use sqlgate_model::{ConfigError, Settings, Tuning};

/// Everything a run needs, read from the environment up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub settings: Settings,
    pub tuning: Tuning,
}

impl RunConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            settings: Settings::from_lookup(&lookup)?,
            tuning: Tuning::from_lookup(&lookup)?,
        })
    }

    /// `-instances=<instance>=tcp:<port>`: the proxy's single argument.
    pub fn proxy_args(&self) -> Vec<String> {
        vec![format!(
            "-instances={}=tcp:{}",
            self.settings.instance_id, self.tuning.proxy_port
        )]
    }
}
