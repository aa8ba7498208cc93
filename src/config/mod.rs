//! 환경 변수 기반 설정

use chrono::Duration;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://dkp-auction.db";
pub const DEFAULT_NOTIFICATION_TOPIC: &str = "auction-notifications";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
/// 종료 후 외부 핸들을 정리하기까지의 유예 시간
pub const DEFAULT_CLEANUP_GRACE_SECS: i64 = 600;
/// 수동 종료 확인 대기 시간
pub const DEFAULT_CONFIRM_TIMEOUT_SECS: i64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} 값이 올바르지 않습니다: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub kafka_brokers: Option<String>,
    pub notification_topic: String,
    pub listen_addr: String,
    pub cleanup_grace: Duration,
    pub confirm_timeout: Duration,
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            kafka_brokers: None,
            notification_topic: DEFAULT_NOTIFICATION_TOPIC.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            cleanup_grace: Duration::seconds(DEFAULT_CLEANUP_GRACE_SECS),
            confirm_timeout: Duration::seconds(DEFAULT_CONFIRM_TIMEOUT_SECS),
            catalog_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 조회 함수로 설정 구성 (테스트에서 환경 변수를 건드리지 않기 위함)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            kafka_brokers: lookup("KAFKA_BROKERS").filter(|b| !b.trim().is_empty()),
            notification_topic: lookup("NOTIFICATION_TOPIC")
                .unwrap_or(defaults.notification_topic),
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            cleanup_grace: seconds(&lookup, "CLEANUP_GRACE_SECS", defaults.cleanup_grace)?,
            confirm_timeout: seconds(&lookup, "CONFIRM_TIMEOUT_SECS", defaults.confirm_timeout)?,
            catalog_path: lookup("CATALOG_PATH").map(PathBuf::from),
        })
    }
}

fn seconds<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs >= 0)
            .and_then(Duration::try_seconds)
            .ok_or(ConfigError::InvalidNumber { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.kafka_brokers.is_none());
        assert_eq!(config.confirm_timeout, Duration::seconds(30));
        assert_eq!(config.cleanup_grace, Duration::seconds(600));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("KAFKA_BROKERS", "kafka:9092"),
            ("CLEANUP_GRACE_SECS", "60"),
            ("CATALOG_PATH", "/etc/dkp/catalog.json"),
        ]))
        .unwrap();
        assert_eq!(config.kafka_brokers.as_deref(), Some("kafka:9092"));
        assert_eq!(config.cleanup_grace, Duration::seconds(60));
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("/etc/dkp/catalog.json"))
        );
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = Config::from_lookup(lookup(&[("CONFIRM_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                name: "CONFIRM_TIMEOUT_SECS",
                ..
            }
        ));

        let huge = i64::MAX.to_string();
        let err =
            Config::from_lookup(lookup(&[("CLEANUP_GRACE_SECS", huge.as_str())])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                name: "CLEANUP_GRACE_SECS",
                ..
            }
        ));
    }
}
