use std::{fmt, path::PathBuf};

use crate::error::ConfigError;

pub const CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const INSTANCE_ID_VAR: &str = "SQL_INSTANCE_ID";
pub const DB_NAME_VAR: &str = "DB_NAME";
pub const DB_USER_VAR: &str = "DB_USER";
pub const DB_PASS_VAR: &str = "DB_PASS";

/// Required variables, in the order they are reported when missing.
pub const REQUIRED_VARS: [&str; 5] = [
    CREDENTIALS_VAR,
    INSTANCE_ID_VAR,
    DB_NAME_VAR,
    DB_USER_VAR,
    DB_PASS_VAR,
];

/// Required settings read from the environment.
///
/// The credentials path is never opened here; the tunnel reads it through the inherited
/// environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub credentials_file: PathBuf,
    pub instance_id: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Every variable is checked; all absent (or empty) names are reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut take = |key: &'static str| match lookup(key) {
            Some(v) if !v.is_empty() => v,
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let credentials_file = take(CREDENTIALS_VAR);
        let instance_id = take(INSTANCE_ID_VAR);
        let db_name = take(DB_NAME_VAR);
        let db_user = take(DB_USER_VAR);
        let db_password = take(DB_PASS_VAR);

        if !missing.is_empty() {
            return Err(ConfigError::Missing { vars: missing });
        }

        Ok(Self {
            credentials_file: PathBuf::from(credentials_file),
            instance_id,
            db_name,
            db_user,
            db_password,
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("credentials_file", &self.credentials_file)
            .field("instance_id", &self.instance_id)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn full() -> HashMap<&'static str, String> {
        REQUIRED_VARS
            .iter()
            .map(|k| (*k, format!("{}-value", k.to_ascii_lowercase())))
            .collect()
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<Settings, ConfigError> {
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn loads_all_values() {
        let settings = load(&full()).unwrap();
        assert_eq!(settings.instance_id, "sql_instance_id-value");
        assert_eq!(settings.db_user, "db_user-value");
        assert_eq!(settings.db_password, "db_pass-value");
        assert_eq!(
            settings.credentials_file,
            PathBuf::from("google_application_credentials-value")
        );
    }

    #[test]
    fn each_missing_value_is_named() {
        for var in REQUIRED_VARS {
            let mut env = full();
            env.remove(var);
            match load(&env) {
                Err(ConfigError::Missing { vars }) => assert_eq!(vars, vec![var]),
                other => panic!("expected missing {var}, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut env = full();
        env.insert(DB_PASS_VAR, String::new());
        let err = load(&env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref vars } if vars == &[DB_PASS_VAR]));
    }

    #[test]
    fn reports_every_missing_value_in_order() {
        let err = load(&HashMap::new()).unwrap_err();
        match &err {
            ConfigError::Missing { vars } => assert_eq!(vars.as_slice(), REQUIRED_VARS),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "missing required environment: GOOGLE_APPLICATION_CREDENTIALS, SQL_INSTANCE_ID, DB_NAME, DB_USER, DB_PASS"
        );
    }

    #[test]
    fn debug_hides_password() {
        let settings = load(&full()).unwrap();
        let dbg = format!("{settings:?}");
        assert!(!dbg.contains("db_pass-value"));
        assert!(dbg.contains("***"));
    }
}
