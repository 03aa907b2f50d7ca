//! Payment lifecycle configuration

use std::time::Duration;

use serde::Deserialize;

use crate::application::sweeper::ExpirySweeperConfig;
use crate::application::{PaymentSettings, RetryPolicy};

use super::error::ValidationError;

/// Timeouts, reconciliation and sweeping behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Minutes a pending payment stays payable
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,

    /// Seconds after which an open payment is re-checked with the gateway
    #[serde(default = "default_freshness")]
    pub freshness_secs: i64,

    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Payments expired per sweep
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch_size: usize,

    /// Attempts for status polls, first included
    #[serde(default = "default_status_attempts")]
    pub status_check_attempts: u32,

    /// Initial backoff between status poll attempts, in milliseconds
    #[serde(default = "default_status_backoff")]
    pub status_check_backoff_ms: u64,

    /// Compare-and-swap attempts per transition
    #[serde(default = "default_transition_attempts")]
    pub transition_attempts: u32,
}

impl PaymentConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ttl_minutes)
    }

    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs)
    }

    pub fn sweeper_config(&self) -> ExpirySweeperConfig {
        ExpirySweeperConfig::default()
            .with_interval(Duration::from_secs(self.sweep_interval_secs))
            .with_batch_size(self.sweep_batch_size)
    }

    pub fn status_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.status_check_attempts,
            Duration::from_millis(self.status_check_backoff_ms),
        )
    }

    /// Handler tunables for `PaymentServices`.
    pub fn settings(&self) -> PaymentSettings {
        PaymentSettings {
            ttl: self.ttl(),
            freshness: self.freshness(),
            status_retry: self.status_retry(),
        }
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=24 * 60).contains(&self.ttl_minutes) {
            return Err(ValidationError::OutOfRange("PAYMENT__TTL_MINUTES"));
        }
        if self.freshness_secs < 0 {
            return Err(ValidationError::OutOfRange("PAYMENT__FRESHNESS_SECS"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::OutOfRange("PAYMENT__SWEEP_INTERVAL_SECS"));
        }
        if !(1..=1000).contains(&self.sweep_batch_size) {
            return Err(ValidationError::OutOfRange("PAYMENT__SWEEP_BATCH_SIZE"));
        }
        if !(1..=10).contains(&self.status_check_attempts) {
            return Err(ValidationError::OutOfRange("PAYMENT__STATUS_CHECK_ATTEMPTS"));
        }
        if !(1..=10).contains(&self.transition_attempts) {
            return Err(ValidationError::OutOfRange("PAYMENT__TRANSITION_ATTEMPTS"));
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            freshness_secs: default_freshness(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch(),
            status_check_attempts: default_status_attempts(),
            status_check_backoff_ms: default_status_backoff(),
            transition_attempts: default_transition_attempts(),
        }
    }
}

fn default_ttl_minutes() -> i64 {
    30
}

fn default_freshness() -> i64 {
    60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_batch() -> usize {
    100
}

fn default_status_attempts() -> u32 {
    3
}

fn default_status_backoff() -> u64 {
    200
}

fn default_transition_attempts() -> u32 {
    3
}
