//! TallyConfig - 起動時に 1 回だけ作る設定オブジェクト
//!
//! グローバルな接続は持たず、ここから各コンポーネントのコンストラクタに渡します。

use super::retry::RetryPolicy;
use crate::domain::{Choice, ChoiceSet};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// データベース名と認証情報は固定
pub const DATABASE_NAME: &str = "postgres";
pub const DATABASE_USER: &str = "postgres";
pub const DATABASE_PASSWORD: &str = "postgres";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TallyConfig {
    pub redis_host: String,
    pub redis_port: u16,
    pub queue_name: String,
    pub postgres_host: String,
    pub dequeue_timeout: Duration,
    pub retry: RetryPolicy,
    pub startup_delay: Duration,
    pub startup_attempts: u32,
    pub choices: ChoiceSet,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            redis_host: "redis".to_string(),
            redis_port: 6379,
            queue_name: "votes".to_string(),
            postgres_host: "db".to_string(),
            dequeue_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            startup_delay: Duration::from_secs(5),
            startup_attempts: 6,
            choices: ChoiceSet::default(),
        }
    }
}

impl TallyConfig {
    /// プロセスの環境変数から読む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `lookup` で値を引く。未設定のキーはデフォルト値。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backoff_ms: u64 = parse_or(&lookup, "TALLY_BACKOFF_MS", 1000)?;
        let backoff = Duration::from_millis(backoff_ms);
        let retry = match parse_opt::<u64, _>(&lookup, "TALLY_BACKOFF_MAX_MS")? {
            Some(max_ms) => RetryPolicy::exponential(backoff, Duration::from_millis(max_ms)),
            None => RetryPolicy::fixed(backoff),
        };

        let option_a = lookup("OPTION_A").unwrap_or_else(|| ChoiceSet::DEFAULT_OPTION_A.to_string());
        let option_b = lookup("OPTION_B").unwrap_or_else(|| ChoiceSet::DEFAULT_OPTION_B.to_string());

        Ok(Self {
            redis_host: lookup("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: parse_or(&lookup, "REDIS_PORT", defaults.redis_port)?,
            queue_name: lookup("TALLY_QUEUE").unwrap_or(defaults.queue_name),
            postgres_host: lookup("POSTGRES_HOST").unwrap_or(defaults.postgres_host),
            dequeue_timeout: Duration::from_secs(parse_or(&lookup, "TALLY_DEQUEUE_TIMEOUT_SECS", 5)?),
            retry,
            startup_delay: Duration::from_secs(parse_or(&lookup, "TALLY_STARTUP_DELAY_SECS", 5)?),
            startup_attempts: parse_or(&lookup, "TALLY_STARTUP_ATTEMPTS", defaults.startup_attempts)?,
            choices: ChoiceSet::new(vec![Choice::new(option_a), Choice::new(option_b)]),
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{DATABASE_USER}:{DATABASE_PASSWORD}@{}/{DATABASE_NAME}",
            self.postgres_host
        )
    }
}

fn parse_opt<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match parse_opt(lookup, key)? {
        Some(value) => Ok(value),
        None => {
            debug!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
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
    fn empty_environment_gives_defaults() {
        let config = TallyConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, TallyConfig::default());
        assert_eq!(config.redis_url(), "redis://redis:6379/");
        assert_eq!(config.database_url(), "postgres://postgres:postgres@db/postgres");
        assert_eq!(config.dequeue_timeout, Duration::from_secs(5));
    }

    #[test]
    fn hosts_and_options_are_overridable() {
        let config = TallyConfig::from_lookup(lookup_from(&[
            ("REDIS_HOST", "queue.internal"),
            ("POSTGRES_HOST", "pg.internal"),
            ("OPTION_A", "Tea"),
            ("OPTION_B", "Coffee"),
        ]))
        .unwrap();

        assert_eq!(config.redis_host, "queue.internal");
        assert_eq!(config.postgres_host, "pg.internal");
        assert!(config.choices.contains(&Choice::new("Tea")));
        assert!(!config.choices.contains(&Choice::new("Cats")));
    }

    #[test]
    fn backoff_max_switches_to_exponential() {
        let config = TallyConfig::from_lookup(lookup_from(&[
            ("TALLY_BACKOFF_MS", "100"),
            ("TALLY_BACKOFF_MAX_MS", "1000"),
        ]))
        .unwrap();

        assert_eq!(
            config.retry,
            RetryPolicy::exponential(Duration::from_millis(100), Duration::from_millis(1000))
        );
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let err = TallyConfig::from_lookup(lookup_from(&[("REDIS_PORT", "many")])).unwrap_err();
        let ConfigError::Invalid { key, value, .. } = err;
        assert_eq!(key, "REDIS_PORT");
        assert_eq!(value, "many");
    }
}
