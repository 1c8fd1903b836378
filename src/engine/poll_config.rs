// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device poll configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::Credentials;

/// Configuration of one polled device.
///
/// Deserializable from the host's configuration store; every field except
/// `address` has a default. Call [`validate`](Self::validate) before use
/// ([`PollEngine`](crate::engine::PollEngine) does it for you).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pollsync_lib::engine::PollConfig;
///
/// let config = PollConfig::new("192.168.1.50")
///     .with_credentials("admin", "secret")
///     .with_poll_interval(Duration::from_secs(10))
///     .with_failure_threshold(5);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.poll_interval(), Duration::from_secs(10));
///
/// let config: PollConfig = serde_json::from_str(r#"{"address": "airq.local"}"#).unwrap();
/// assert_eq!(config.poll_interval(), Duration::from_secs(60));
/// assert_eq!(config.first_poll_delay(), Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Device address handed to the transport (host, URL, topic).
    pub address: String,
    /// Optional credentials handed to the transport.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Base poll interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Delay before the first poll after start, in milliseconds.
    #[serde(default = "default_first_poll_delay_ms")]
    pub first_poll_delay_ms: u64,
    /// Upper bound for one fetch, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Consecutive transient failures before the device is reported offline.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Upper bound of the backed-off interval, in seconds.
    #[serde(default = "default_backoff_ceiling_secs")]
    pub backoff_ceiling_secs: u64,
    /// Factor applied to the interval after each transient failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Treat authentication failures as transient instead of stopping.
    ///
    /// Useful for cloud APIs whose tokens expire and renew on their own.
    #[serde(default)]
    pub recoverable_auth: bool,
}

fn default_poll_interval_secs() -> u64 {
    PollConfig::DEFAULT_POLL_INTERVAL_SECS
}

fn default_first_poll_delay_ms() -> u64 {
    PollConfig::DEFAULT_FIRST_POLL_DELAY_MS
}

fn default_request_timeout_ms() -> u64 {
    PollConfig::DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_failure_threshold() -> u32 {
    PollConfig::DEFAULT_FAILURE_THRESHOLD
}

fn default_backoff_ceiling_secs() -> u64 {
    PollConfig::DEFAULT_BACKOFF_CEILING_SECS
}

fn default_backoff_multiplier() -> f64 {
    PollConfig::DEFAULT_BACKOFF_MULTIPLIER
}

impl PollConfig {
    /// Default base poll interval.
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
    /// Default delay before the first poll.
    pub const DEFAULT_FIRST_POLL_DELAY_MS: u64 = 500;
    /// Default fetch timeout.
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
    /// Default failure threshold.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
    /// Default backoff ceiling.
    pub const DEFAULT_BACKOFF_CEILING_SECS: u64 = 600;
    /// Default backoff multiplier.
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
            poll_interval_secs: Self::DEFAULT_POLL_INTERVAL_SECS,
            first_poll_delay_ms: Self::DEFAULT_FIRST_POLL_DELAY_MS,
            request_timeout_ms: Self::DEFAULT_REQUEST_TIMEOUT_MS,
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
            backoff_ceiling_secs: Self::DEFAULT_BACKOFF_CEILING_SECS,
            backoff_multiplier: Self::DEFAULT_BACKOFF_MULTIPLIER,
            recoverable_auth: false,
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Sets the base poll interval (whole seconds).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    /// Sets the delay before the first poll.
    #[must_use]
    pub fn with_first_poll_delay(mut self, delay: Duration) -> Self {
        self.first_poll_delay_ms = duration_to_millis(delay);
        self
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// Sets the number of consecutive failures before reporting offline.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the backoff ceiling (whole seconds).
    #[must_use]
    pub fn with_backoff_ceiling(mut self, ceiling: Duration) -> Self {
        self.backoff_ceiling_secs = ceiling.as_secs();
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Treats authentication failures as transient.
    #[must_use]
    pub fn with_recoverable_auth(mut self) -> Self {
        self.recoverable_auth = true;
        self
    }

    /// Returns the base poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the delay before the first poll.
    #[must_use]
    pub fn first_poll_delay(&self) -> Duration {
        Duration::from_millis(self.first_poll_delay_ms)
    }

    /// Returns the fetch timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the backoff ceiling.
    #[must_use]
    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_secs(self.backoff_ceiling_secs)
    }

    /// Computes the interval following a transient failure.
    ///
    /// Grows `current` by the multiplier and caps it at the ceiling.
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        let ceiling = self.backoff_ceiling();
        // Saturates on overflow; the ceiling caps it anyway
        let grown = Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(ceiling);
        grown.min(ceiling)
    }

    /// Checks the configuration for values the scheduler cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        if self.backoff_ceiling_secs < self.poll_interval_secs {
            return Err(ConfigError::CeilingBelowInterval {
                ceiling_secs: self.backoff_ceiling_secs,
                interval_secs: self.poll_interval_secs,
            });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidMultiplier(
                self.backoff_multiplier.to_string(),
            ));
        }
        Ok(())
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PollConfig::new("192.168.1.50");
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.first_poll_delay(), Duration::from_millis(500));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.backoff_ceiling(), Duration::from_secs(600));
        assert!(!config.recoverable_auth);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: PollConfig = serde_json::from_str(
            r#"{"address": "10.0.0.2", "poll_interval_secs": 15, "credentials": {"username": "u", "password": "p"}}"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.credentials, Some(Credentials::new("u", "p")));
    }

    #[test]
    fn next_interval_grows_and_caps() {
        let config = PollConfig::new("host")
            .with_poll_interval(Duration::from_secs(10))
            .with_backoff_ceiling(Duration::from_secs(60));

        let mut interval = config.poll_interval();
        let mut seen = Vec::new();
        for _ in 0..5 {
            interval = config.next_interval(interval);
            seen.push(interval.as_secs());
        }
        assert_eq!(seen, vec![20, 40, 60, 60, 60]);
    }

    #[test]
    fn next_interval_with_fractional_multiplier() {
        let config = PollConfig::new("host")
            .with_poll_interval(Duration::from_secs(10))
            .with_backoff_multiplier(1.5);
        assert_eq!(
            config.next_interval(Duration::from_secs(10)),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn next_interval_survives_overflow() {
        let config = PollConfig::new("host").with_backoff_multiplier(f64::MAX);
        assert_eq!(
            config.next_interval(Duration::from_secs(60)),
            config.backoff_ceiling()
        );
    }

    #[test]
    fn validate_rejects_empty_address() {
        assert_eq!(
            PollConfig::new("  ").validate(),
            Err(ConfigError::EmptyAddress)
        );
    }

    #[test]
    fn validate_rejects_zero_values() {
        let config = PollConfig::new("host").with_poll_interval(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));

        let config = PollConfig::new("host").with_request_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));

        let config = PollConfig::new("host").with_failure_threshold(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroThreshold));
    }

    #[test]
    fn validate_rejects_ceiling_below_interval() {
        let config = PollConfig::new("host")
            .with_poll_interval(Duration::from_secs(120))
            .with_backoff_ceiling(Duration::from_secs(60));
        assert_eq!(
            config.validate(),
            Err(ConfigError::CeilingBelowInterval {
                ceiling_secs: 60,
                interval_secs: 120
            })
        );
    }

    #[test]
    fn validate_rejects_shrinking_multiplier() {
        let config = PollConfig::new("host").with_backoff_multiplier(0.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMultiplier(_))
        ));

        let config = PollConfig::new("host").with_backoff_multiplier(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_flat_multiplier() {
        let config = PollConfig::new("host").with_backoff_multiplier(1.0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMultiplier("1".to_string()))
        );

        let config = PollConfig::new("host").with_backoff_multiplier(1.1);
        assert!(config.validate().is_ok());
    }
}
