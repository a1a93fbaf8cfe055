// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-call policies that shape request headers.
//!
//! All policies in this module run once per logical call, outside the retry loop, so every
//! attempt of a call carries the same headers.

use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

use crate::{Next, Policy, PolicyPosition, Request, RequestId, Response, Result};

/// The header [`RequestIdPolicy`] uses unless configured otherwise.
pub const CLIENT_REQUEST_ID: HeaderName = HeaderName::from_static("x-client-request-id");

/// Tags each call with a unique identifier.
///
/// If the request already carries the header, its value is kept. Otherwise a random UUID is
/// generated. Either way the identifier is stored in the context as a [`RequestId`].
#[derive(Debug, Clone)]
pub struct RequestIdPolicy {
    header: HeaderName,
}

impl Default for RequestIdPolicy {
    fn default() -> Self {
        Self { header: CLIENT_REQUEST_ID }
    }
}

impl RequestIdPolicy {
    /// Creates a policy that uses the `x-client-request-id` header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `header` instead of `x-client-request-id`.
    #[must_use]
    pub fn header_name(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }
}

impl Policy for RequestIdPolicy {
    fn position(&self) -> PolicyPosition {
        PolicyPosition::PerCall
    }

    fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        let existing = request.header_str(&self.header).map(ToOwned::to_owned);

        let id = match existing {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                match HeaderValue::try_from(id.as_str()) {
                    Ok(value) => request.insert_header(self.header.clone(), value),
                    Err(e) => return futures::future::ready(Err(e.into())).boxed(),
                }
                id
            }
        };

        _ = request.context_mut().insert(RequestId(id));
        next.process(request)
    }
}

/// Sets the `user-agent` header unless the request already has one.
///
/// The value is `http_pipeline/{version}`, optionally prefixed by an application id.
///
/// # Examples
///
/// ```
/// use http_pipeline::policies::UserAgentPolicy;
///
/// let policy = UserAgentPolicy::new().application_id("inventory-sync")?;
/// assert!(policy.value().starts_with("inventory-sync http_pipeline/"));
/// # Ok::<(), http_pipeline::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct UserAgentPolicy {
    value: HeaderValue,
}

impl Default for UserAgentPolicy {
    fn default() -> Self {
        Self {
            value: HeaderValue::from_static(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))),
        }
    }
}

impl UserAgentPolicy {
    /// Creates a policy with the library's own user agent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes the user agent with an application id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderValue`][crate::Error::InvalidHeaderValue] if the id
    /// contains characters that are not allowed in header values.
    pub fn application_id(self, application_id: &str) -> Result<Self> {
        let value = format!("{application_id} {}", self.value());

        Ok(Self {
            value: HeaderValue::try_from(value)?,
        })
    }

    /// Returns the user agent this policy sets.
    #[must_use]
    pub fn value(&self) -> &str {
        // only built from valid UTF-8 strings
        self.value.to_str().unwrap_or_default()
    }
}

impl Policy for UserAgentPolicy {
    fn position(&self) -> PolicyPosition {
        PolicyPosition::PerCall
    }

    fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        if request.header(USER_AGENT).is_none() {
            request.insert_header(USER_AGENT, self.value.clone());
        }

        next.process(request)
    }
}

/// Adds a fixed set of headers to every call, replacing values already present.
///
/// # Examples
///
/// ```
/// use http::header::HeaderName;
/// use http_pipeline::policies::AddHeadersPolicy;
///
/// let policy = AddHeadersPolicy::new().header(HeaderName::from_static("x-api-version"), "2024-05-01")?;
/// # drop(policy);
/// # Ok::<(), http_pipeline::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct AddHeadersPolicy {
    headers: HeaderMap,
}

impl AddHeadersPolicy {
    /// Creates a policy without headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value. Adding the same name twice sends both values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderValue`][crate::Error::InvalidHeaderValue] if `value`
    /// contains characters that are not allowed in header values.
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        self.headers.append(name, HeaderValue::try_from(value)?);
        Ok(self)
    }
}

impl From<HeaderMap> for AddHeadersPolicy {
    fn from(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

impl Policy for AddHeadersPolicy {
    fn position(&self) -> PolicyPosition {
        PolicyPosition::PerCall
    }

    fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        for name in self.headers.keys() {
            _ = request.headers_mut().remove(name);
        }

        for (name, value) in &self.headers {
            request.append_header(name.clone(), value.clone());
        }

        next.process(request)
    }
}
