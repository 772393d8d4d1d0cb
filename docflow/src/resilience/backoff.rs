//! Backoff schedules for rate-limit and network retries.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PipelineConfig;

/// Jitter applied on top of a computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Exact delays.
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

impl JitterStrategy {
    /// Applies the jitter to `delay`.
    #[must_use]
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let jittered = match self {
            Self::None => millis,
            Self::Full => {
                if millis == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=millis)
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    millis
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };
        Duration::from_millis(jittered)
    }
}

/// Retry schedule derived from [`PipelineConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// First rate-limit delay.
    pub rate_limit_base: Duration,
    /// Growth factor between rate-limit delays.
    pub rate_limit_multiplier: u32,
    /// Rate-limit retries before `BackoffExhausted`.
    pub rate_limit_max_retries: u32,
    /// Step of the linear network backoff.
    pub network_base: Duration,
    /// Network retries before the error is final.
    pub network_max_retries: u32,
    /// Longest server `Retry-After` hint honored.
    pub max_retry_after: Duration,
    /// Jitter applied to every delay.
    pub jitter: JitterStrategy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl BackoffPolicy {
    /// Builds the policy from pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            rate_limit_base: config.backoff_base(),
            rate_limit_multiplier: config.backoff_multiplier,
            rate_limit_max_retries: config.backoff_max_attempts,
            network_base: config.network_backoff_base(),
            network_max_retries: config.network_max_attempts,
            max_retry_after: config.max_retry_after(),
            jitter: config.jitter,
        }
    }

    /// Delay before rate-limit retry number `retry` (0-based):
    /// `base * multiplier^retry`, then jitter.
    #[must_use]
    pub fn rate_limit_delay(&self, retry: u32) -> Duration {
        let factor = self.rate_limit_multiplier.saturating_pow(retry);
        self.jitter.apply(self.rate_limit_base.saturating_mul(factor))
    }

    /// Delay before a rate-limit retry given an optional server hint.
    /// The hint is clamped to `max_retry_after` and only ever lengthens
    /// the computed delay.
    #[must_use]
    pub fn rate_limit_delay_with_hint(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let computed = self.rate_limit_delay(retry);
        hint.map_or(computed, |hint| hint.min(self.max_retry_after).max(computed))
    }

    /// Delay before network retry number `retry` (0-based):
    /// `base * (retry + 1)`, then jitter.
    #[must_use]
    pub fn network_delay(&self, retry: u32) -> Duration {
        self.jitter
            .apply(self.network_base.saturating_mul(retry.saturating_add(1)))
    }
}
