use crate::bluesky::client::DEFAULT_SERVICE;
use crate::bluesky::Credentials;
use crate::pipeline::DEFAULT_MAX_IN_FLIGHT;
use std::env;
use std::str::FromStr;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const BLUESKY_USERNAME: &str = "BLUESKY_USERNAME";
    pub const BLUESKY_PASSWORD: &str = "BLUESKY_PASSWORD";
    pub const BLUESKY_SERVICE: &str = "BLUESKY_SERVICE";
    pub const MEME_API_ENDPOINT: &str = "MEME_API_ENDPOINT";
    pub const PORT: &str = "PORT";
    pub const REPLY_SCHEDULE: &str = "REPLY_SCHEDULE";
    pub const REPLY_SCHEDULER_ENABLED: &str = "REPLY_SCHEDULER_ENABLED";
    pub const REPLY_MAX_IN_FLIGHT: &str = "REPLY_MAX_IN_FLIGHT";
    pub const REPLY_BATCH_TIMEOUT_SECS: &str = "REPLY_BATCH_TIMEOUT_SECS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 3000;
    /// Every minute, on the minute (cron with seconds field)
    pub const REPLY_SCHEDULE: &str = "0 * * * * *";
    pub const REPLY_BATCH_TIMEOUT_SECS: u64 = 300;
}

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub service_url: String,
    pub meme_api_endpoint: String,
    pub port: u16,
    pub reply_schedule: String,
    pub scheduler_enabled: bool,
    pub max_in_flight: usize,
    pub batch_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (env in production, a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| format!("{} must be set", key));

        let identifier = require(env_vars::BLUESKY_USERNAME)?;
        let password = require(env_vars::BLUESKY_PASSWORD)?;
        let meme_api_endpoint = require(env_vars::MEME_API_ENDPOINT)?;

        let port = match get(env_vars::PORT) {
            Some(v) => v
                .parse()
                .map_err(|_| format!("{} must be a valid port number, got {:?}", env_vars::PORT, v))?,
            None => defaults::PORT,
        };

        let reply_schedule =
            get(env_vars::REPLY_SCHEDULE).unwrap_or_else(|| defaults::REPLY_SCHEDULE.to_string());
        cron::Schedule::from_str(&reply_schedule).map_err(|e| {
            format!("{} is not a valid cron expression ({:?}): {}", env_vars::REPLY_SCHEDULE, reply_schedule, e)
        })?;

        let scheduler_enabled = get(env_vars::REPLY_SCHEDULER_ENABLED)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        let max_in_flight = get(env_vars::REPLY_MAX_IN_FLIGHT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT)
            .max(1);

        let batch_timeout_secs = get(env_vars::REPLY_BATCH_TIMEOUT_SECS)
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults::REPLY_BATCH_TIMEOUT_SECS);

        Ok(Self {
            credentials: Credentials::new(identifier, password),
            service_url: get(env_vars::BLUESKY_SERVICE).unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            meme_api_endpoint,
            port,
            reply_schedule,
            scheduler_enabled,
            max_in_flight,
            batch_timeout_secs,
        })
    }
}
