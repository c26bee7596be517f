use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::warn;

use crate::channel::ReconnectPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub relay_url: String,
    pub api_url: String,
    pub reconnect: ReconnectPolicy,
    pub ack_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:3000/ws".to_string(),
            api_url: "http://localhost:3000/api".to_string(),
            reconnect: ReconnectPolicy::default(),
            ack_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or invalid values fall back to the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            relay_url: lookup("MEDTRACK_RELAY_URL").unwrap_or(defaults.relay_url),
            api_url: lookup("MEDTRACK_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            reconnect: ReconnectPolicy {
                attempts: parse_or(
                    &lookup,
                    "MEDTRACK_RECONNECT_ATTEMPTS",
                    defaults.reconnect.attempts,
                ),
                delay: Duration::from_millis(parse_or(
                    &lookup,
                    "MEDTRACK_RECONNECT_DELAY_MS",
                    defaults.reconnect.delay.as_millis() as u64,
                )),
            },
            ack_timeout: Duration::from_secs(parse_or(
                &lookup,
                "MEDTRACK_ACK_TIMEOUT_SECS",
                defaults.ack_timeout.as_secs(),
            )),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
    }
}
