//! Environment variable loader — applies the `APP_ENV, HOST, PORT, ORG_ID,
//! LOKI_URL, MONGO_*, DEBUG, DELAY_TICK_SECONDS` variables named at the
//! runtime's external boundary on top of [`AppConfig::default`].

use std::env;

use crate::{AppConfig, ConfigError};

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Ok(val) = env::var("APP_ENV") {
            config.app_env = val;
        }
        if let Ok(val) = env::var("HOST") {
            config.http.host = val;
        }
        if let Ok(val) = env::var("PORT") {
            config.http.port = val.parse().map_err(|_| ConfigError::Env(format!("PORT is not a valid port number: {val}")))?;
        }
        if let Ok(val) = env::var("ORG_ID") {
            config.org_id = Some(val);
        }
        if let Ok(val) = env::var("LOKI_URL") {
            config.loki_url = Some(val);
        }
        if let Ok(val) = env::var("DEBUG") {
            config.debug = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Ok(val) = env::var("WEBHOOK_SECRET") {
            config.webhook_secret = Some(val);
        }

        if let Ok(val) = env::var("MONGO_USERNAME") {
            config.mongodb.username = Some(val);
        }
        if let Ok(val) = env::var("MONGO_PASSWORD") {
            config.mongodb.password = Some(val);
        }
        if let Ok(val) = env::var("MONGO_HOST") {
            config.mongodb.host = val;
        }
        if let Ok(val) = env::var("MONGO_PORT") {
            config.mongodb.port = val.parse().map_err(|_| ConfigError::Env(format!("MONGO_PORT is not a valid port number: {val}")))?;
        }
        if let Ok(val) = env::var("MONGO_AUTH_SOURCE") {
            config.mongodb.auth_source = val;
        }

        if let Ok(val) = env::var("DELAY_TICK_SECONDS") {
            config.scheduler.tick_seconds = val
                .parse()
                .map_err(|_| ConfigError::Env(format!("DELAY_TICK_SECONDS is not a valid integer: {val}")))?;
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_spec_when_env_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in ["APP_ENV", "HOST", "PORT", "ORG_ID", "LOKI_URL", "DEBUG", "MONGO_USERNAME", "MONGO_PASSWORD", "MONGO_HOST", "MONGO_PORT", "MONGO_AUTH_SOURCE", "DELAY_TICK_SECONDS", "WEBHOOK_SECRET"] {
            env::remove_var(key);
        }
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.http.port, 8018);
        assert_eq!(config.scheduler.tick_seconds, 20);
        assert!(!config.debug);
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn webhook_secret_is_read_when_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("WEBHOOK_SECRET", "s3cr3t");
        let config = ConfigLoader::new().load().unwrap();
        env::remove_var("WEBHOOK_SECRET");
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn port_and_tick_seconds_are_overridden() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("PORT", "9000");
        env::set_var("DELAY_TICK_SECONDS", "5");
        env::set_var("DEBUG", "true");
        let config = ConfigLoader::new().load().unwrap();
        env::remove_var("PORT");
        env::remove_var("DELAY_TICK_SECONDS");
        env::remove_var("DEBUG");
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.scheduler.tick_seconds, 5);
        assert!(config.debug);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("PORT", "not-a-number");
        let err = ConfigLoader::new().load().unwrap_err();
        env::remove_var("PORT");
        assert!(matches!(err, ConfigError::Env(_)));
    }
}
