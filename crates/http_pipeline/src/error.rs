// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use thiserror::Error;

/// A specialized `Result` for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the pipeline, its policies and its transport.
///
/// HTTP responses with an error status code are not errors. They are returned as regular
/// [`Response`][crate::Response] values and only classified as failures by telemetry.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport failed before a response was received.
    ///
    /// Use [`Error::transport`] to create this variant so that the type name of the
    /// underlying error is captured for telemetry.
    #[error("{message}")]
    Transport {
        /// What went wrong, as far as retry classification is concerned.
        kind: TransportErrorKind,
        /// The fully qualified type name of the underlying error.
        type_name: &'static str,
        /// The display message of the underlying error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request could not be constructed, e.g. because the URI is not absolute.
    #[error("invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    /// A header value contains characters that are not allowed in HTTP headers.
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// A configured header name is not a valid HTTP header name.
    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// A request or response body could not be produced or consumed.
    #[error("body error: {0}")]
    Body(Cow<'static, str>),

    /// The runtime driving a blocking send could not be created.
    #[error("failed to create the blocking runtime")]
    Runtime(#[source] std::io::Error),
}

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The host name could not be resolved.
    Dns,
    /// The operation timed out.
    Timeout,
    /// The connection was reset or closed mid-flight.
    ConnectionReset,
    /// Some other I/O failure.
    Io,
    /// A failure that will not go away by sending the request again.
    Other,
}

impl TransportErrorKind {
    /// Returns `true` if sending the same request again might succeed.
    #[must_use]
    pub fn is_transient(self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl Error {
    /// Wraps a transport failure, capturing the type name and message of `error`.
    #[must_use]
    pub fn transport<E>(kind: TransportErrorKind, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            kind,
            type_name: std::any::type_name::<E>(),
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates an [`Error::InvalidRequest`] with the given message.
    #[must_use]
    pub fn invalid_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns the fully qualified type name that identifies this error in telemetry.
    ///
    /// For transport failures this is the type of the underlying error, for all other
    /// variants it is the type of the value carried by the variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Transport { type_name, .. } => type_name,
            Self::InvalidHeaderValue(_) => std::any::type_name::<http::header::InvalidHeaderValue>(),
            Self::InvalidHeaderName(_) => std::any::type_name::<http::header::InvalidHeaderName>(),
            Self::Runtime(_) => std::any::type_name::<std::io::Error>(),
            Self::InvalidRequest(_) | Self::Body(_) => std::any::type_name::<Self>(),
        }
    }

    /// Returns the transport failure kind, if this is a transport error.
    #[must_use]
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match error.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => {
                TransportErrorKind::ConnectionReset
            }
            ErrorKind::TimedOut => TransportErrorKind::Timeout,
            ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::Unsupported => TransportErrorKind::Other,
            _ => TransportErrorKind::Io,
        };

        Self::transport(kind, error)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn transport_captures_type_name_and_message() {
        let error = Error::transport(TransportErrorKind::Dns, std::io::Error::other("no such host"));

        assert_eq!(error.type_name(), "std::io::error::Error");
        assert_eq!(error.to_string(), "no such host");
        assert_eq!(error.transport_kind(), Some(TransportErrorKind::Dns));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn io_error_kinds_are_classified() {
        let cases = [
            (ErrorKind::ConnectionRefused, TransportErrorKind::Connect),
            (ErrorKind::ConnectionReset, TransportErrorKind::ConnectionReset),
            (ErrorKind::TimedOut, TransportErrorKind::Timeout),
            (ErrorKind::InvalidData, TransportErrorKind::Other),
            (ErrorKind::PermissionDenied, TransportErrorKind::Io),
        ];

        for (io_kind, expected) in cases {
            let error = Error::from(std::io::Error::new(io_kind, "boom"));
            assert_eq!(error.transport_kind(), Some(expected), "{io_kind:?}");
        }
    }

    #[test]
    fn only_other_is_permanent() {
        assert!(TransportErrorKind::Connect.is_transient());
        assert!(TransportErrorKind::Timeout.is_transient());
        assert!(!TransportErrorKind::Other.is_transient());
    }

    #[test]
    fn non_transport_errors_have_no_transport_kind() {
        let error = Error::invalid_request("relative URI");

        assert_eq!(error.transport_kind(), None);
        assert_eq!(error.to_string(), "invalid request: relative URI");
        assert_eq!(error.type_name(), "http_pipeline::error::Error");
    }
}
