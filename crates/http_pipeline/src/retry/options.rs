// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::Backoff;
use super::backoff::{BackoffOptions, Rnd};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(800);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Configuration of the [`RetryPolicy`][super::RetryPolicy].
///
/// With the `serde` feature, the options can be loaded from configuration files. Durations
/// use the standard `{ "secs": .., "nanos": .. }` representation and missing fields take
/// their default values.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct RetryOptions {
    max_retries: u32,
    backoff: Backoff,
    base_delay: Duration,
    max_delay: Option<Duration>,
    use_jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: Some(DEFAULT_MAX_DELAY),
            use_jitter: true,
        }
    }
}

impl RetryOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many times a request may be resent after the original attempt.
    ///
    /// `0` disables retries.
    ///
    /// **Default**: 3
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets how the delay grows between retries.
    ///
    /// **Default**: [`Backoff::Exponential`]
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the delay the backoff starts from.
    ///
    /// **Default**: 800 milliseconds
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Caps every delay, including delays requested by the server. `None` removes the cap.
    ///
    /// **Default**: 60 seconds
    #[must_use]
    pub fn max_delay(mut self, delay: impl Into<Option<Duration>>) -> Self {
        self.max_delay = delay.into();
        self
    }

    /// Enables or disables randomization of backoff delays.
    ///
    /// **Default**: `true`
    #[must_use]
    pub fn use_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Returns the maximum number of resends.
    #[must_use]
    pub fn get_max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the backoff type.
    #[must_use]
    pub fn get_backoff(&self) -> Backoff {
        self.backoff
    }

    /// Returns the base delay.
    #[must_use]
    pub fn get_base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the delay cap.
    #[must_use]
    pub fn get_max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Returns whether jitter is applied.
    #[must_use]
    pub fn get_use_jitter(&self) -> bool {
        self.use_jitter
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub(crate) fn backoff_options(&self) -> BackoffOptions {
        BackoffOptions {
            backoff_type: self.backoff,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            use_jitter: self.use_jitter,
            rnd: Rnd::default(),
        }
    }
}
