// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use http::StatusCode;
use http::header::{HeaderMap, HeaderName, RETRY_AFTER};

use crate::{Error, Response, Result};

const RETRY_AFTER_MS: HeaderName = HeaderName::from_static("retry-after-ms");
const X_MS_RETRY_AFTER_MS: HeaderName = HeaderName::from_static("x-ms-retry-after-ms");

/// Whether an outcome should be retried, and optionally after which delay.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use http_pipeline::retry::{RecoveryInfo, RecoveryKind};
///
/// let info = RecoveryInfo::retry().delay(Duration::from_secs(2));
/// assert_eq!(info.kind(), RecoveryKind::Retry);
/// assert_eq!(info.get_delay(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecoveryInfo {
    kind: RecoveryKind,
    delay: Option<Duration>,
}

impl RecoveryInfo {
    /// Nothing is known about the outcome. It is not retried.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::new(RecoveryKind::Unknown)
    }

    /// The outcome is final.
    #[must_use]
    pub const fn never() -> Self {
        Self::new(RecoveryKind::Never)
    }

    /// The outcome is transient and the request may be sent again.
    #[must_use]
    pub const fn retry() -> Self {
        Self::new(RecoveryKind::Retry)
    }

    /// Sets the delay to wait before the next attempt. It takes precedence over the backoff.
    #[must_use]
    pub const fn delay(self, delay: Duration) -> Self {
        Self {
            kind: self.kind,
            delay: Some(delay),
        }
    }

    /// Returns the recovery kind.
    #[must_use]
    pub const fn kind(&self) -> RecoveryKind {
        self.kind
    }

    /// Returns the delay requested by the outcome, if any.
    #[must_use]
    pub const fn get_delay(&self) -> Option<Duration> {
        self.delay
    }

    const fn new(kind: RecoveryKind) -> Self {
        Self { kind, delay: None }
    }
}

/// The recovery classification of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RecoveryKind {
    /// Nothing is known about the outcome.
    Unknown,
    /// The request may be sent again.
    Retry,
    /// The outcome is final.
    Never,
}

/// Types that can tell whether they represent a recoverable outcome.
pub trait Recovery {
    /// Classifies this outcome.
    fn recovery(&self) -> RecoveryInfo;
}

impl Recovery for Response {
    /// Retries 408, 429, 500, 502, 503 and 504, honoring `Retry-After` and its
    /// millisecond variants.
    fn recovery(&self) -> RecoveryInfo {
        match self.status() {
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                let info = RecoveryInfo::retry();
                match retry_after(self.headers()) {
                    Some(delay) => info.delay(delay),
                    None => info,
                }
            }
            _ => RecoveryInfo::never(),
        }
    }
}

impl Recovery for Error {
    fn recovery(&self) -> RecoveryInfo {
        match self.transport_kind() {
            Some(kind) if kind.is_transient() => RecoveryInfo::retry(),
            Some(_) => RecoveryInfo::never(),
            None => RecoveryInfo::unknown(),
        }
    }
}

impl Recovery for Result<Response> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Ok(response) => response.recovery(),
            Err(error) => error.recovery(),
        }
    }
}

/// Reads the server-requested delay from response headers.
///
/// Millisecond headers take precedence over `Retry-After`, which is read as whole seconds.
/// HTTP-date values are ignored.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header_u64 = |name: &HeaderName| headers.get(name)?.to_str().ok()?.trim().parse::<u64>().ok();

    header_u64(&RETRY_AFTER_MS)
        .or_else(|| header_u64(&X_MS_RETRY_AFTER_MS))
        .map(Duration::from_millis)
        .or_else(|| header_u64(&RETRY_AFTER).map(Duration::from_secs))
}
