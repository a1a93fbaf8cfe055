// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cmp::min;
use std::fmt::Debug;
use std::time::Duration;

/// The factor used to determine the range of jitter applied to delays.
const JITTER_FACTOR: f64 = 0.5;

/// The factor used for exponential backoff.
const EXPONENTIAL_FACTOR: f64 = 2.0;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum Backoff {
    /// The base delay before every retry.
    Constant,
    /// `base_delay × n` before the n-th retry.
    Linear,
    /// `base_delay × 2^(n-1)` before the n-th retry.
    #[default]
    Exponential,
}

#[derive(Debug, Clone)]
pub(crate) struct BackoffOptions {
    pub backoff_type: Backoff,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
    pub use_jitter: bool,
    pub rnd: Rnd,
}

impl BackoffOptions {
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + use<> {
        DelaysIter {
            props: self.clone(),
            attempt: 0,
        }
    }

    pub fn clamp(&self, delay: Duration) -> Duration {
        self.max_delay.map_or(delay, |max| min(delay, max))
    }
}

#[derive(Debug)]
struct DelaysIter {
    props: BackoffOptions,
    attempt: u32,
}

impl Iterator for DelaysIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        // zero base delay => always zero
        if self.props.base_delay.is_zero() {
            return Some(Duration::ZERO);
        }

        let next_attempt = self.attempt.saturating_add(1);
        let delay = match self.props.backoff_type {
            Backoff::Constant => self.props.base_delay,
            Backoff::Linear => self.props.base_delay.saturating_mul(next_attempt),
            Backoff::Exponential => duration_mul_pow2(self.props.base_delay, self.attempt),
        };
        let delay = if self.props.use_jitter {
            apply_jitter(delay, &self.props.rnd)
        } else {
            delay
        };

        self.attempt = next_attempt;
        Some(self.props.clamp(delay))
    }
}

fn duration_mul_pow2(base: Duration, attempt: u32) -> Duration {
    let factor = EXPONENTIAL_FACTOR.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
    secs_to_duration_saturating(base.as_secs_f64() * factor)
}

/// Adds a symmetric, uniform jitter around the given delay.
///
/// With `JITTER_FACTOR = 0.5`, the result lies in `[0.75*delay, 1.25*delay]`.
fn apply_jitter(delay: Duration, rnd: &Rnd) -> Duration {
    let ms = delay.as_secs_f64() * 1000.0;
    let offset = (ms * JITTER_FACTOR) / 2.0;
    let random_delay = (ms * JITTER_FACTOR).mul_add(rnd.next_f64(), -offset);

    secs_to_duration_saturating((ms + random_delay) / 1000.0)
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Non-cryptographic randomness for jitter.
#[derive(Clone, Default)]
pub(crate) enum Rnd {
    #[default]
    Real,

    #[cfg(test)]
    Test(std::sync::Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl Debug for Rnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            #[cfg(test)]
            Self::Test(_) => write!(f, "Test"),
        }
    }
}

impl Rnd {
    #[cfg(test)]
    pub fn new_fixed(value: f64) -> Self {
        Self::Test(std::sync::Arc::new(move || value))
    }

    pub fn next_f64(&self) -> f64 {
        match self {
            Self::Real => fastrand::f64(),
            #[cfg(test)]
            Self::Test(generator) => generator(),
        }
    }
}
