// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;

/// Configuration of the [`InstrumentationPolicy`][super::InstrumentationPolicy].
///
/// Tracing and metrics are enabled by default. Both still need a backend on the policy
/// builder to have any effect.
///
/// With the `serde` feature, the options can be loaded from configuration files. Missing
/// fields take their default values:
///
/// ```json
/// {
///     "tracing_enabled": true,
///     "metrics_enabled": false,
///     "allowed_query_params": ["api-version"],
///     "request_header_attributes": { "x-ms-client-request-id": "az.client_request_id" },
///     "response_header_attributes": {}
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct InstrumentationOptions {
    tracing_enabled: bool,
    metrics_enabled: bool,
    allowed_query_params: Vec<String>,
    request_header_attributes: BTreeMap<String, String>,
    response_header_attributes: BTreeMap<String, String>,
}

impl Default for InstrumentationOptions {
    fn default() -> Self {
        Self {
            tracing_enabled: true,
            metrics_enabled: true,
            allowed_query_params: Vec::new(),
            request_header_attributes: BTreeMap::new(),
            response_header_attributes: BTreeMap::new(),
        }
    }
}

impl InstrumentationOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables tracing for every request sent through the policy.
    ///
    /// Individual requests can still opt out with [`DisableTracing`][crate::DisableTracing].
    ///
    /// **Default**: `true`
    #[must_use]
    pub fn tracing_enabled(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    /// Enables or disables the duration metric.
    ///
    /// **Default**: `true`
    #[must_use]
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Adds a query parameter whose value is recorded unredacted in `url.full`.
    ///
    /// Names are compared case-insensitively.
    ///
    /// **Default**: empty, every non-empty query value is redacted.
    #[must_use]
    pub fn allowed_query_param(mut self, name: impl Into<String>) -> Self {
        self.allowed_query_params.push(name.into());
        self
    }

    /// Adds several allow-listed query parameters.
    #[must_use]
    pub fn allowed_query_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_query_params.extend(names.into_iter().map(Into::into));
        self
    }

    /// Records the value of request header `header` as span attribute `attribute` when the
    /// header is present.
    #[must_use]
    pub fn request_header_attribute(mut self, header: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.request_header_attributes.insert(header.into(), attribute.into());
        self
    }

    /// Records the value of response header `header` as span attribute `attribute` when the
    /// header is present.
    #[must_use]
    pub fn response_header_attribute(mut self, header: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.response_header_attributes.insert(header.into(), attribute.into());
        self
    }

    /// Returns whether tracing is enabled.
    #[must_use]
    pub fn is_tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }

    /// Returns whether the duration metric is enabled.
    #[must_use]
    pub fn is_metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }

    /// Returns the allow-listed query parameter names.
    #[must_use]
    pub fn allowed_query_param_names(&self) -> &[String] {
        &self.allowed_query_params
    }

    /// Returns the request header to attribute map.
    #[must_use]
    pub fn request_header_attributes(&self) -> &BTreeMap<String, String> {
        &self.request_header_attributes
    }

    /// Returns the response header to attribute map.
    #[must_use]
    pub fn response_header_attributes(&self) -> &BTreeMap<String, String> {
        &self.response_header_attributes
    }
}
