//! Environment-driven configuration.
//!
//! Missing required variables are a fatal boot error; everything else has a
//! strict default (auto-finalize off, noop notifications).

use escrowd_core::FinalizePolicy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid {
        var: &'static str,
        message: String,
    },
}

/// Notification driver selection (`NOTIFY_DRIVER`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyConfig {
    Noop,
    Dialect { key: String, base_url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub webhook_secret: String,
    pub actions_baseurl: Option<String>,
    pub rpc_url: Option<String>,
    pub worker_concurrency: usize,
    pub log_level: String,
    pub policy: FinalizePolicy,
    pub notify: NotifyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a config from a variable lookup (tests inject a map here).
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let redis_url = var("REDIS_URL").ok_or(ConfigError::Missing("REDIS_URL"))?;
        let webhook_secret =
            var("HELIUS_WEBHOOK_SECRET").ok_or(ConfigError::Missing("HELIUS_WEBHOOK_SECRET"))?;

        let worker_concurrency = match var("WORKER_CONCURRENCY") {
            None => 5,
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                message: format!("expected a positive integer, got {raw:?}"),
            })?,
        };
        if worker_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                message: "must be at least 1".into(),
            });
        }

        let log_level = var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let policy = FinalizePolicy::new(
            bool_flag(var("AUTO_FINALIZE_RELEASE").as_deref()),
            bool_flag(var("AUTO_FINALIZE_REFUND").as_deref()),
        );

        let notify = match var("NOTIFY_DRIVER").as_deref() {
            None | Some("noop") => NotifyConfig::Noop,
            Some("dialect") => {
                let key = var("NOTIFY_DIALECT_KEY")
                    .ok_or(ConfigError::Missing("NOTIFY_DIALECT_KEY"))?;
                let base_url = var("NOTIFY_DIALECT_BASEURL")
                    .ok_or(ConfigError::Missing("NOTIFY_DIALECT_BASEURL"))?;
                if !base_url.ends_with('/') {
                    return Err(ConfigError::Invalid {
                        var: "NOTIFY_DIALECT_BASEURL",
                        message: "must end with '/'".into(),
                    });
                }
                NotifyConfig::Dialect { key, base_url }
            }
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "NOTIFY_DRIVER",
                    message: format!("expected noop or dialect, got {other:?}"),
                })
            }
        };

        Ok(Self {
            redis_url,
            webhook_secret,
            actions_baseurl: var("ACTIONS_BASEURL"),
            rpc_url: var("RPC_URL"),
            worker_concurrency,
            log_level,
            policy,
            notify,
        })
    }
}

/// Parse a boolean flag: true/1/yes/on (case-insensitive) enable, anything
/// else leaves the strict default of false.
fn bool_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes") | Some("on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("REDIS_URL", "redis://127.0.0.1:6379"),
        ("HELIUS_WEBHOOK_SECRET", "shh"),
    ];

    #[test]
    fn missing_required_vars_fail() {
        let err = Config::from_vars(vars(&[("REDIS_URL", "redis://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("HELIUS_WEBHOOK_SECRET")));

        let err = Config::from_vars(vars(&[("HELIUS_WEBHOOK_SECRET", "s")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("REDIS_URL")));
    }

    #[test]
    fn defaults_are_strict() {
        let config = Config::from_vars(vars(REQUIRED)).unwrap();
        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.log_level, "info");
        assert!(!config.policy.auto_release);
        assert!(!config.policy.auto_refund);
        assert_eq!(config.notify, NotifyConfig::Noop);
        assert!(config.actions_baseurl.is_none());
        assert!(config.rpc_url.is_none());
    }

    #[test]
    fn bool_flags_accept_common_truthy_forms() {
        for form in ["true", "1", "yes", "on", "TRUE", "Yes", " on "] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("AUTO_FINALIZE_RELEASE", form));
            let config = Config::from_vars(vars(&pairs)).unwrap();
            assert!(config.policy.auto_release, "{form:?} should enable");
        }
        for form in ["false", "0", "off", "nope", ""] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("AUTO_FINALIZE_RELEASE", form));
            let config = Config::from_vars(vars(&pairs)).unwrap();
            assert!(!config.policy.auto_release, "{form:?} should stay off");
        }
    }

    #[test]
    fn worker_concurrency_must_be_a_positive_integer() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WORKER_CONCURRENCY", "8"));
        assert_eq!(Config::from_vars(vars(&pairs)).unwrap().worker_concurrency, 8);

        for bad in ["zero", "-1", "0"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("WORKER_CONCURRENCY", bad));
            assert!(Config::from_vars(vars(&pairs)).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn dialect_driver_requires_key_and_slash_terminated_baseurl() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("NOTIFY_DRIVER", "dialect"));
        assert!(matches!(
            Config::from_vars(vars(&pairs)).unwrap_err(),
            ConfigError::Missing("NOTIFY_DIALECT_KEY")
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("NOTIFY_DRIVER", "dialect"),
            ("NOTIFY_DIALECT_KEY", "k"),
            ("NOTIFY_DIALECT_BASEURL", "https://dialect.test/api"),
        ]);
        assert!(Config::from_vars(vars(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("NOTIFY_DRIVER", "dialect"),
            ("NOTIFY_DIALECT_KEY", "k"),
            ("NOTIFY_DIALECT_BASEURL", "https://dialect.test/api/"),
        ]);
        let config = Config::from_vars(vars(&pairs)).unwrap();
        assert_eq!(
            config.notify,
            NotifyConfig::Dialect {
                key: "k".into(),
                base_url: "https://dialect.test/api/".into(),
            }
        );
    }

    #[test]
    fn unknown_notify_driver_fails() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("NOTIFY_DRIVER", "carrier-pigeon"));
        assert!(Config::from_vars(vars(&pairs)).is_err());
    }
}
