//! Client configuration.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CONFIGURATION                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Field            Env var                        Default                │
//! │  ─────────────    ───────────────────────────    ──────────────────     │
//! │  api_base_url     PARLEY_API_URL                 localhost:3001/api     │
//! │  signaling_url    PARLEY_SIGNALING_URL           ws://localhost:8080    │
//! │  poll_interval    PARLEY_POLL_INTERVAL_MS        3000 ms                │
//! │  match_delay      PARLEY_MATCH_DELAY_MS          1000 ms                │
//! │  tick_interval    PARLEY_TICK_INTERVAL_MS        1000 ms                │
//! │  report_timeout   PARLEY_REPORT_TIMEOUT_MS       5000 ms                │
//! │  durations        PARLEY_{BEGINNER,INTERMEDIATE,ADVANCED}_SECS          │
//! │                                                  300 / 600 / 600 s      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::DurationTable;

/// Longest call budget accepted for any level (one day).
pub const MAX_CALL_SECS: u64 = 24 * 60 * 60;

/// Longest poll, delay, tick or report interval accepted (one hour).
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the call client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Session service base URL, including the `/api` prefix
    pub api_base_url: String,
    /// Signaling relay base URL (`ws://` or `wss://`)
    pub signaling_url: String,
    /// Interval between session lookups while searching
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Pause between finding a partner and entering the call
    #[serde(with = "millis")]
    pub match_delay: Duration,
    /// Countdown refresh interval
    #[serde(with = "millis")]
    pub tick_interval: Duration,
    /// Upper bound on the end-of-call report
    #[serde(with = "millis")]
    pub report_timeout: Duration,
    /// Call length per level
    pub durations: DurationTable,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3001/api".to_string(),
            signaling_url: "ws://localhost:8080".to_string(),
            poll_interval: Duration::from_millis(3000),
            match_delay: Duration::from_millis(1000),
            tick_interval: Duration::from_millis(1000),
            report_timeout: Duration::from_millis(5000),
            durations: DurationTable::default(),
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by `PARLEY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("PARLEY_API_URL") {
            config.api_base_url = url;
        }
        if let Some(url) = lookup("PARLEY_SIGNALING_URL") {
            config.signaling_url = url;
        }

        let set_millis = |key: &str, slot: &mut Duration| -> Result<()> {
            if let Some(raw) = lookup(key) {
                *slot = Duration::from_millis(parse_positive(key, &raw)?);
            }
            Ok(())
        };
        set_millis("PARLEY_POLL_INTERVAL_MS", &mut config.poll_interval)?;
        set_millis("PARLEY_MATCH_DELAY_MS", &mut config.match_delay)?;
        set_millis("PARLEY_TICK_INTERVAL_MS", &mut config.tick_interval)?;
        set_millis("PARLEY_REPORT_TIMEOUT_MS", &mut config.report_timeout)?;

        let set_secs = |key: &str, slot: &mut u64| -> Result<()> {
            if let Some(raw) = lookup(key) {
                *slot = parse_positive(key, &raw)?;
            }
            Ok(())
        };
        set_secs("PARLEY_BEGINNER_SECS", &mut config.durations.beginner)?;
        set_secs("PARLEY_INTERMEDIATE_SECS", &mut config.durations.intermediate)?;
        set_secs("PARLEY_ADVANCED_SECS", &mut config.durations.advanced)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject URLs with the wrong scheme, and intervals or budgets that are
    /// zero or above [`MAX_INTERVAL`] / [`MAX_CALL_SECS`].
    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api_base_url must be http(s): {}",
                self.api_base_url
            )));
        }
        if !(self.signaling_url.starts_with("ws://") || self.signaling_url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "signaling_url must be ws(s): {}",
                self.signaling_url
            )));
        }

        for (name, interval) in [
            ("poll_interval", self.poll_interval),
            ("tick_interval", self.tick_interval),
            ("report_timeout", self.report_timeout),
        ] {
            if interval.is_zero() {
                return Err(Error::Config(format!("{} must be non-zero", name)));
            }
        }
        for (name, interval) in [
            ("poll_interval", self.poll_interval),
            ("match_delay", self.match_delay),
            ("tick_interval", self.tick_interval),
            ("report_timeout", self.report_timeout),
        ] {
            if interval > MAX_INTERVAL {
                return Err(Error::Config(format!(
                    "{} must be at most {}s, got {}ms",
                    name,
                    MAX_INTERVAL.as_secs(),
                    interval.as_millis()
                )));
            }
        }

        for (name, secs) in [
            ("beginner", self.durations.beginner),
            ("intermediate", self.durations.intermediate),
            ("advanced", self.durations.advanced),
        ] {
            if secs == 0 || secs > MAX_CALL_SECS {
                return Err(Error::Config(format!(
                    "{} call budget must be 1..={}s, got {}",
                    name, MAX_CALL_SECS, secs
                )));
            }
        }
        Ok(())
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(Error::Config(format!("{} must be greater than zero", key))),
        Ok(value) => Ok(value),
        Err(e) => Err(Error::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
