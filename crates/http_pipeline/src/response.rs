// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use http::header::{AsHeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

use crate::ResponseBody;

/// An HTTP response produced by a [`Transport`][crate::Transport].
///
/// Status and headers are available without touching the body. The body is released when the
/// response is dropped, which is how the retry policy discards responses it retries past.
#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    /// Creates a response with the given status, no headers and an empty body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::empty(),
        }
    }

    /// Creates a response from all of its parts.
    #[must_use]
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self { status, headers, body }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns `true` for 2xx status codes.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the response headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the value of a header, if present.
    #[must_use]
    pub fn header(&self, name: impl AsHeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Returns the value of a header as a string, if present and visible ASCII.
    #[must_use]
    pub fn header_str(&self, name: impl AsHeaderName) -> Option<&str> {
        self.header(name).and_then(|value| value.to_str().ok())
    }

    /// Sets the body and returns the updated response.
    #[must_use]
    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    /// Returns the body without consuming the response.
    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Consumes the response and returns its body.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}
