// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use http::header::{AsHeaderName, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};

use crate::{Body, Context, Error, Result};

/// An outgoing HTTP request.
///
/// A request is created once per logical call and then mutated in place while it travels
/// down the pipeline: policies add headers, the instrumentation policy injects trace
/// context and the retry policy updates the [`Context`]. Policies must not assume that the
/// request they see is the one the caller built.
///
/// # Examples
///
/// ```
/// use http::Method;
/// use http::header::ACCEPT;
/// use http_pipeline::Request;
///
/// let request = Request::new(Method::GET, "https://example.com/items?page=2")?
///     .with_header(ACCEPT, "application/json")?;
///
/// assert_eq!(request.uri().host(), Some("example.com"));
/// # Ok::<(), http_pipeline::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
    context: Context,
}

impl Request {
    /// Creates a request by parsing `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URI cannot be parsed or is not an absolute
    /// `http` or `https` URI.
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri = uri.parse::<Uri>().map_err(|e| Error::invalid_request(format!("invalid URI: {e}")))?;
        Self::from_uri(method, uri)
    }

    /// Creates a request for an already parsed URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the URI is not an absolute `http` or `https` URI.
    pub fn from_uri(method: Method, uri: Uri) -> Result<Self> {
        match uri.scheme_str() {
            Some("http" | "https") => {}
            Some(other) => return Err(Error::invalid_request(format!("unsupported URI scheme '{other}'"))),
            None => return Err(Error::invalid_request("request URI must be absolute")),
        }

        if uri.host().is_none_or(str::is_empty) {
            return Err(Error::invalid_request("request URI has no host"));
        }

        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Body::Empty,
            context: Context::new(),
        })
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the target URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the request headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the value of a header, if present.
    ///
    /// When the header has several values, the first one is returned.
    #[must_use]
    pub fn header(&self, name: impl AsHeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Returns the value of a header as a string, if present and visible ASCII.
    #[must_use]
    pub fn header_str(&self, name: impl AsHeaderName) -> Option<&str> {
        self.header(name).and_then(|value| value.to_str().ok())
    }

    /// Sets a header, replacing all previous values of the same name.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Adds a header value without removing existing values of the same name.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Sets a header and returns the updated request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderValue`] if `value` is not a valid header value.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        self.insert_header(name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    /// Returns the request body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Replaces the request body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Replaces the request body and returns the updated request.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.set_body(body);
        self
    }

    /// Returns the per-call context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Returns the per-call context for modification.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Inserts a context value and returns the updated request.
    #[must_use]
    pub fn with_context<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.context.insert(value);
        self
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use http::header::{ACCEPT, USER_AGENT};
    use rstest::rstest;

    use super::*;
    use crate::DisableTracing;

    #[rstest]
    #[case("https://example.com")]
    #[case("http://example.com:8080/path?x=1")]
    #[case("https://127.0.0.1/")]
    fn accepts_absolute_http_uris(#[case] uri: &str) {
        Request::new(Method::GET, uri).unwrap();
    }

    #[rstest]
    #[case("/relative/path")]
    #[case("ftp://example.com/file")]
    #[case("not a uri")]
    fn rejects_other_uris(#[case] uri: &str) {
        let error = Request::new(Method::GET, uri).unwrap_err();

        assert!(matches!(error, Error::InvalidRequest(_)), "{error}");
    }

    #[test]
    fn header_names_are_case_insensitive_and_last_write_wins() {
        let mut request = Request::new(Method::GET, "https://example.com").unwrap();
        request.insert_header(HeaderName::from_static("x-custom"), HeaderValue::from_static("one"));
        request.insert_header(HeaderName::from_static("x-custom"), HeaderValue::from_static("two"));

        assert_eq!(request.header_str("X-Custom"), Some("two"));
        assert_eq!(request.headers().get_all("x-custom").iter().count(), 1);
    }

    #[test]
    fn append_keeps_all_values() {
        let mut request = Request::new(Method::GET, "https://example.com").unwrap();
        request.append_header(ACCEPT, HeaderValue::from_static("text/plain"));
        request.append_header(ACCEPT, HeaderValue::from_static("application/json"));

        let values: Vec<_> = request.headers().get_all(ACCEPT).iter().collect();
        assert_eq!(values.len(), 2);
        assert_eq!(request.header_str(ACCEPT), Some("text/plain"));
    }

    #[test]
    fn missing_header_is_none() {
        let request = Request::new(Method::GET, "https://example.com").unwrap();

        assert_eq!(request.header(USER_AGENT), None);
        assert_eq!(request.header_str("x-missing"), None);
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let error = Request::new(Method::GET, "https://example.com")
            .unwrap()
            .with_header(ACCEPT, "line\nbreak")
            .unwrap_err();

        assert!(matches!(error, Error::InvalidHeaderValue(_)));
    }

    #[test]
    fn builder_style_helpers() {
        let request = Request::new(Method::POST, "https://example.com")
            .unwrap()
            .with_body("payload")
            .with_context(DisableTracing);

        assert_eq!(request.body().as_bytes(), b"payload");
        assert!(request.context().contains::<DisableTracing>());
    }
}
