// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Attribute names written by the instrumentation policy, following the OpenTelemetry HTTP
//! client semantic conventions.

/// HTTP request method.
pub const HTTP_REQUEST_METHOD: &str = "http.request.method";

/// Full request URL with non-allow-listed query values redacted.
pub const URL_FULL: &str = "url.full";

/// Host of the request URL.
pub const SERVER_ADDRESS: &str = "server.address";

/// Port of the request URL, or the scheme default.
pub const SERVER_PORT: &str = "server.port";

/// Value of the `user-agent` request header.
pub const USER_AGENT_ORIGINAL: &str = "user_agent.original";

/// Response status code.
pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";

/// Classification of a failed attempt.
pub const ERROR_TYPE: &str = "error.type";

/// Number of sends before this attempt. Set on spans only, never on metrics.
pub const HTTP_REQUEST_RESEND_COUNT: &str = "http.request.resend_count";

/// `error.type` of an attempt that was dropped before it completed.
pub const CANCELLED: &str = "cancelled";
