// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Request and response logging through `tracing`.
//!
//! The [`LoggingPolicy`] runs right before the transport, once per attempt. It emits
//! `http_pipeline.request` and `http_pipeline.response` at `INFO` and `http_pipeline.error`
//! at `WARN`. URLs are redacted the same way as in the instrumentation, and header values
//! that are not allow-listed are logged as `REDACTED`.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use http::HeaderMap;

use crate::instrumentation::{REDACTED, redact_url};
use crate::{Next, Request, ResendCount, Response, Result};

const DEFAULT_ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "cache-control",
    "content-length",
    "content-type",
    "date",
    "etag",
    "retry-after",
    "traceparent",
    "user-agent",
    "x-client-request-id",
];

/// How much of each exchange is logged.
///
/// Insert a level into the request context to override the policy's level for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum HttpLogLevel {
    /// Nothing is logged.
    None,
    /// Method, URL, attempt, status and elapsed time.
    #[default]
    Basic,
    /// Like [`Basic`][Self::Basic] plus request and response headers.
    Headers,
}

/// Configuration of the [`LoggingPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct LoggingOptions {
    level: HttpLogLevel,
    allowed_headers: Vec<String>,
    allowed_query_params: Vec<String>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: HttpLogLevel::default(),
            allowed_headers: DEFAULT_ALLOWED_HEADERS.iter().map(|&h| h.to_owned()).collect(),
            allowed_query_params: Vec::new(),
        }
    }
}

impl LoggingOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level.
    ///
    /// **Default**: [`HttpLogLevel::Basic`]
    #[must_use]
    pub fn level(mut self, level: HttpLogLevel) -> Self {
        self.level = level;
        self
    }

    /// Adds a header whose value is logged as is. Names are compared case-insensitively.
    ///
    /// **Default**: a small set of headers that never carry secrets, such as `content-type`.
    #[must_use]
    pub fn allowed_header(mut self, name: impl Into<String>) -> Self {
        self.allowed_headers.push(name.into());
        self
    }

    /// Adds a query parameter whose value is logged as is.
    ///
    /// **Default**: empty
    #[must_use]
    pub fn allowed_query_param(mut self, name: impl Into<String>) -> Self {
        self.allowed_query_params.push(name.into());
        self
    }

    /// Returns the log level.
    #[must_use]
    pub fn get_level(&self) -> HttpLogLevel {
        self.level
    }

    /// Returns the allow-listed header names.
    #[must_use]
    pub fn allowed_header_names(&self) -> &[String] {
        &self.allowed_headers
    }

    /// Returns the allow-listed query parameter names.
    #[must_use]
    pub fn allowed_query_param_names(&self) -> &[String] {
        &self.allowed_query_params
    }
}

/// Logs every attempt through `tracing`.
///
/// # Examples
///
/// ```
/// use http_pipeline::logging::{HttpLogLevel, LoggingOptions, LoggingPolicy};
///
/// let logging = LoggingPolicy::new(
///     LoggingOptions::new()
///         .level(HttpLogLevel::Headers)
///         .allowed_header("x-ms-request-id"),
/// );
/// # drop(logging);
/// ```
#[derive(Clone, Debug, Default)]
pub struct LoggingPolicy {
    options: Arc<LoggingOptions>,
}

impl LoggingPolicy {
    /// Creates a logging policy.
    #[must_use]
    pub fn new(options: LoggingOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Returns the options of this policy.
    #[must_use]
    pub fn options(&self) -> &LoggingOptions {
        &self.options
    }

    pub(crate) fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        let level = request.context().get::<HttpLogLevel>().copied().unwrap_or(self.options.level);
        if level == HttpLogLevel::None {
            return next.process(request);
        }

        async move {
            let url = redact_url(request.uri(), &self.options.allowed_query_params);
            let method = request.method().clone();
            let resend_count = request.context().get::<ResendCount>().map_or(0, |c| c.0);

            if level == HttpLogLevel::Headers {
                tracing::event!(
                    name: "http_pipeline.request",
                    tracing::Level::INFO,
                    http.request.method = %method,
                    url.full = %url,
                    http.request.resend_count = resend_count,
                    http.request.headers = %self.format_headers(request.headers()),
                );
            } else {
                tracing::event!(
                    name: "http_pipeline.request",
                    tracing::Level::INFO,
                    http.request.method = %method,
                    url.full = %url,
                    http.request.resend_count = resend_count,
                );
            }

            let start = Instant::now();
            let outcome = next.process(request).await;
            let elapsed = start.elapsed().as_secs_f64();

            match &outcome {
                Ok(response) if level == HttpLogLevel::Headers => tracing::event!(
                    name: "http_pipeline.response",
                    tracing::Level::INFO,
                    http.request.method = %method,
                    url.full = %url,
                    http.response.status_code = response.status().as_u16(),
                    http.response.headers = %self.format_headers(response.headers()),
                    elapsed,
                ),
                Ok(response) => tracing::event!(
                    name: "http_pipeline.response",
                    tracing::Level::INFO,
                    http.request.method = %method,
                    url.full = %url,
                    http.response.status_code = response.status().as_u16(),
                    elapsed,
                ),
                Err(error) => tracing::event!(
                    name: "http_pipeline.error",
                    tracing::Level::WARN,
                    http.request.method = %method,
                    url.full = %url,
                    error.type_name = error.type_name(),
                    error.message = %error,
                    elapsed,
                ),
            }

            outcome
        }
        .boxed()
    }

    fn format_headers(&self, headers: &HeaderMap) -> String {
        let mut formatted = String::new();

        for (name, value) in headers {
            let allowed = self
                .options
                .allowed_headers
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(name.as_str()));
            let value = match value.to_str() {
                Ok(value) if allowed => value,
                _ => REDACTED,
            };

            if !formatted.is_empty() {
                formatted.push_str(", ");
            }
            _ = write!(formatted, "{name}: {value}");
        }

        formatted
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};

    use super::*;

    #[test]
    fn defaults() {
        let options = LoggingOptions::default();

        assert_eq!(options.get_level(), HttpLogLevel::Basic);
        assert!(options.allowed_header_names().iter().any(|h| h == "content-type"));
        assert!(options.allowed_query_param_names().is_empty());
    }

    #[test]
    fn format_headers_redacts_unlisted() {
        let policy = LoggingPolicy::new(LoggingOptions::new().allowed_header("X-Custom"));
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert("x-custom", HeaderValue::from_static("visible"));

        let formatted = policy.format_headers(&headers);

        assert!(formatted.contains("content-type: application/json"));
        assert!(formatted.contains("authorization: REDACTED"));
        assert!(formatted.contains("x-custom: visible"));
        assert!(!formatted.contains("secret"));
    }

    #[test]
    fn format_headers_empty() {
        let policy = LoggingPolicy::default();

        assert_eq!(policy.format_headers(&HeaderMap::new()), "");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_level() {
        let options: LoggingOptions = serde_json::from_str(r#"{ "level": "headers" }"#).unwrap();

        assert_eq!(options.get_level(), HttpLogLevel::Headers);
        assert_eq!(options.allowed_header_names(), LoggingOptions::default().allowed_header_names());
    }
}
