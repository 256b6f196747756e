//! Coordinator configuration
//!
//! All timing constants are overridable. Defaults mirror what the network's
//! reference client uses.
//!
//! # Environment Variables
//!
//! - `CC_LISTENER_TIMEOUT_MS`: per-peer commit wait (default: 60000)
//! - `CC_JOIN_SETTLE_DELAY_MS`: delay joined with the peer join call (default: 10000)
//! - `CC_PROPOSAL_TIMEOUT_MS`: instantiate/upgrade proposal timeout (default: 300000)

use crate::error::{CoordinatorError, CoordinatorResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const ENV_LISTENER_TIMEOUT_MS: &str = "CC_LISTENER_TIMEOUT_MS";
pub const ENV_JOIN_SETTLE_DELAY_MS: &str = "CC_JOIN_SETTLE_DELAY_MS";
pub const ENV_PROPOSAL_TIMEOUT_MS: &str = "CC_PROPOSAL_TIMEOUT_MS";

/// Coordinator timing configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long each commit listener waits before reporting `REQUEST_TIMEOUT`
    #[serde(with = "duration_ms")]
    pub listener_timeout: Duration,
    /// Settle delay awaited alongside the peer join call
    #[serde(with = "duration_ms")]
    pub join_settle_delay: Duration,
    /// Upper bound for the instantiate/upgrade proposal round-trip
    #[serde(with = "duration_ms")]
    pub proposal_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listener_timeout: Duration::from_secs(60),
            join_settle_delay: Duration::from_secs(10),
            proposal_timeout: Duration::from_secs(300),
        }
    }
}

impl CoordinatorConfig {
    /// Build configuration from defaults plus environment overrides.
    pub fn from_env() -> CoordinatorResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Used by [`from_env`](Self::from_env); tests pass a closure over a map
    /// instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> CoordinatorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_ms(&lookup, ENV_LISTENER_TIMEOUT_MS)? {
            config.listener_timeout = ms;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_JOIN_SETTLE_DELAY_MS)? {
            config.join_settle_delay = ms;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_PROPOSAL_TIMEOUT_MS)? {
            config.proposal_timeout = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject timeouts that would make every wait fail immediately.
    ///
    /// A zero settle delay is allowed.
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.listener_timeout.is_zero() {
            return Err(CoordinatorError::Config {
                reason: "listener_timeout must be greater than zero".to_string(),
            });
        }
        if self.proposal_timeout.is_zero() {
            return Err(CoordinatorError::Config {
                reason: "proposal_timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_ms<F>(lookup: &F, key: &str) -> CoordinatorResult<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|e| CoordinatorError::Config {
            reason: format!("{key}={raw:?} is not a millisecond count: {e}"),
        })
}

mod duration_ms {
    use serde::{ser, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).map_err(|_| {
            ser::Error::custom(format!("{value:?} does not fit in a u64 millisecond count"))
        })?;
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
