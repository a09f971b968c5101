use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

/// Longest session lifetime accepted from `CANTEEN_SESSION_HOURS`
pub const MAX_SESSION_HOURS: u64 = 24 * 366;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Upstream chat-completion service used by the message relay
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub session_ttl: Duration,
    /// Mark the session cookie `Secure`; only for deployments served over TLS
    pub secure_cookies: bool,
    /// Admin account created at startup when both parts are set
    pub admin: Option<(String, String)>,
    /// `None` disables the relay
    pub chat: Option<ChatConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            data_dir: PathBuf::from("database"),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            secure_cookies: false,
            admin: None,
            chat: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup, e.g. the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let session_hours: u64 = try_load(&lookup, "CANTEEN_SESSION_HOURS", "24")?;
        if session_hours == 0 || session_hours > MAX_SESSION_HOURS {
            warn!("Invalid CANTEEN_SESSION_HOURS value: {session_hours}");
            return Err(ConfigError::Invalid {
                key: "CANTEEN_SESSION_HOURS",
                value: session_hours.to_string(),
                reason: format!("must be between 1 and {MAX_SESSION_HOURS}"),
            });
        }

        let admin = match (
            lookup("CANTEEN_ADMIN_USERNAME"),
            lookup("CANTEEN_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some((username, password)),
            (None, None) => None,
            _ => {
                warn!("Only one of CANTEEN_ADMIN_USERNAME/CANTEEN_ADMIN_PASSWORD set, skipping admin bootstrap");
                None
            }
        };

        let chat = match lookup("CHAT_API_URL") {
            Some(url) => {
                let timeout_secs: u64 = try_load(&lookup, "CHAT_TIMEOUT_SECS", "30")?;
                Some(ChatConfig {
                    url,
                    api_key: lookup("CHAT_API_KEY").unwrap_or_default(),
                    model: try_load(&lookup, "CHAT_MODEL", "gpt-3.5-turbo")?,
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            None => {
                info!("CHAT_API_URL not set, message relay disabled");
                None
            }
        };

        Ok(Self {
            host: try_load(&lookup, "CANTEEN_HOST", "127.0.0.1")?,
            port: try_load(&lookup, "CANTEEN_PORT", "3000")?,
            data_dir: try_load(&lookup, "CANTEEN_DATA_DIR", "database")?,
            session_ttl: Duration::from_secs(session_hours * 60 * 60),
            secure_cookies: try_load(&lookup, "CANTEEN_SECURE_COOKIES", "false")?,
            admin,
            chat,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.address(), "127.0.0.1:3000");
        assert_eq!(config.data_dir, PathBuf::from("database"));
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert!(config.admin.is_none());
        assert!(config.chat.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CANTEEN_PORT", "8080"),
            ("CANTEEN_DATA_DIR", "/var/lib/canteen"),
            ("CANTEEN_SESSION_HOURS", "2"),
            ("CANTEEN_ADMIN_USERNAME", "root"),
            ("CANTEEN_ADMIN_PASSWORD", "secret"),
            ("CHAT_API_URL", "http://localhost:9000/v1/chat/completions"),
            ("CHAT_MODEL", "local-model"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/canteen"));
        assert_eq!(config.session_ttl, Duration::from_secs(7200));
        assert_eq!(config.admin, Some(("root".to_string(), "secret".to_string())));
        let chat = config.chat.unwrap();
        assert_eq!(chat.model, "local-model");
        assert_eq!(chat.api_key, "");
        assert_eq!(chat.timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_number_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("CANTEEN_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CANTEEN_PORT", .. }));
    }

    #[test]
    fn session_hours_are_bounded() {
        for hours in ["0", "8785", "18446744073709551615"] {
            let err = Config::from_lookup(lookup_from(&[("CANTEEN_SESSION_HOURS", hours)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "CANTEEN_SESSION_HOURS", .. }),
                "{hours}"
            );
        }

        let longest = MAX_SESSION_HOURS.to_string();
        let config =
            Config::from_lookup(lookup_from(&[("CANTEEN_SESSION_HOURS", longest.as_str())]))
                .unwrap();
        assert_eq!(config.session_ttl, Duration::from_secs(MAX_SESSION_HOURS * 3600));
    }

    #[test]
    fn secure_cookies_switch() {
        assert!(!Config::from_lookup(lookup_from(&[])).unwrap().secure_cookies);

        let config =
            Config::from_lookup(lookup_from(&[("CANTEEN_SECURE_COOKIES", "true")])).unwrap();
        assert!(config.secure_cookies);

        let err =
            Config::from_lookup(lookup_from(&[("CANTEEN_SECURE_COOKIES", "yes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CANTEEN_SECURE_COOKIES", .. }));
    }

    #[test]
    fn half_an_admin_is_ignored() {
        let config =
            Config::from_lookup(lookup_from(&[("CANTEEN_ADMIN_USERNAME", "root")])).unwrap();
        assert!(config.admin.is_none());
    }
}
