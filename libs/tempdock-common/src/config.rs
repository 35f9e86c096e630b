// Provisioner configuration
use crate::types::ReadinessStrategy;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_STEP: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Tunables of a provisioner
///
/// **Wait budgets:**
/// - `start_timeout` bounds the wait for the engine to report the container running
/// - `reachable_timeout` bounds the wait for the published port to accept connections
/// - both phases poll every `step`; worst case is the sum of both budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Host address external ports are bound on and probed at
    pub address: IpAddr,
    pub step: Duration,
    pub start_timeout: Duration,
    pub reachable_timeout: Duration,
    pub readiness: ReadinessStrategy,
    /// Force-remove a created container when provisioning fails after create
    pub cleanup_on_failure: bool,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            step: DEFAULT_STEP,
            start_timeout: DEFAULT_MAX_WAIT,
            reachable_timeout: DEFAULT_MAX_WAIT,
            readiness: ReadinessStrategy::FirstPort,
            cleanup_on_failure: true,
        }
    }
}

impl ProvisionerConfig {
    /// Load overrides from `TEMPDOCK_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("TEMPDOCK_ADDRESS") {
            config.address = value
                .trim()
                .parse()
                .map_err(|e: std::net::AddrParseError| invalid("TEMPDOCK_ADDRESS", &value, e.to_string()))?;
        }
        if let Some(value) = lookup("TEMPDOCK_STEP_MS") {
            config.step = millis("TEMPDOCK_STEP_MS", &value)?;
        }
        if let Some(value) = lookup("TEMPDOCK_START_TIMEOUT_MS") {
            config.start_timeout = millis("TEMPDOCK_START_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("TEMPDOCK_REACHABLE_TIMEOUT_MS") {
            config.reachable_timeout = millis("TEMPDOCK_REACHABLE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("TEMPDOCK_READINESS") {
            config.readiness = value
                .parse()
                .map_err(|reason| invalid("TEMPDOCK_READINESS", &value, reason))?;
        }
        if let Some(value) = lookup("TEMPDOCK_CLEANUP_ON_FAILURE") {
            config.cleanup_on_failure = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(invalid(
                        "TEMPDOCK_CLEANUP_ON_FAILURE",
                        &value,
                        "expected true or false".to_string(),
                    ))
                }
            };
        }

        if config.step.is_zero() {
            return Err(invalid("TEMPDOCK_STEP_MS", "0", "step must be positive".to_string()));
        }

        Ok(config)
    }
}

fn invalid(key: &str, value: &str, reason: String) -> ConfigError {
    ConfigError {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| invalid(key, value, e.to_string()))
}
