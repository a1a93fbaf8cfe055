// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Formatter};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::{BoxStream, Stream};

use crate::{Error, Result};

/// The body of a [`Request`][crate::Request].
///
/// Request bodies are buffered so that the retry policy can send the same request again.
/// Cloning a body is cheap because [`Bytes`] is reference counted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// A buffered body.
    Bytes(Bytes),
}

impl Body {
    /// Serializes `value` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Body`] if the value cannot be serialized.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(|bytes| Self::Bytes(Bytes::from(bytes)))
            .map_err(|e| Error::Body(e.to_string().into()))
    }

    /// Returns the body content.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Returns the length of the body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if the body has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

/// The body of a [`Response`][crate::Response].
///
/// A response body is either buffered or a stream of chunks produced by the transport.
/// Dropping the body releases whatever the transport holds for it; consuming methods such as
/// [`collect`][Self::collect] drain it first.
pub struct ResponseBody {
    inner: Inner,
}

enum Inner {
    Buffered(Bytes),
    Stream(BoxStream<'static, Result<Bytes>>),
}

impl ResponseBody {
    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A buffered body.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            inner: Inner::Buffered(bytes.into()),
        }
    }

    /// A streamed body.
    #[must_use]
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Inner::Stream(stream.boxed()),
        }
    }

    /// Returns `true` if the whole body is already in memory.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        matches!(self.inner, Inner::Buffered(_))
    }

    /// Reads the remaining body into memory.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the underlying stream.
    pub async fn collect(self) -> Result<Bytes> {
        match self.inner {
            Inner::Buffered(bytes) => Ok(bytes),
            Inner::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            }
        }
    }

    /// Reads the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Body`] if the body is not valid UTF-8, or any stream error.
    pub async fn text(self) -> Result<String> {
        let bytes = self.collect().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Body(e.to_string().into()))
    }

    /// Reads the body and deserializes it from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Body`] if the body is not valid JSON for `T`, or any stream error.
    #[cfg(feature = "json")]
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let bytes = self.collect().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Body(e.to_string().into()))
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for ResponseBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Inner::Buffered(bytes) => f.debug_struct("ResponseBody").field("len", &bytes.len()).finish(),
            Inner::Stream(_) => f.debug_struct("ResponseBody").field("streaming", &true).finish(),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::stream;

    use super::*;

    #[test]
    fn body_conversions() {
        assert!(Body::default().is_empty());
        assert_eq!(Body::from("abc").len(), 3);
        assert_eq!(Body::from(vec![1_u8, 2]).as_bytes(), &[1, 2]);
        assert_eq!(Body::from("abc".to_string()), Body::from(Bytes::from_static(b"abc")));
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_body() {
        let body = Body::json(&serde_json::json!({ "name": "value" })).unwrap();

        assert_eq!(body.as_bytes(), br#"{"name":"value"}"#);
    }

    #[test]
    fn collect_stream_concatenates_chunks() {
        let body = ResponseBody::from_stream(stream::iter(vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))]));
        assert!(!body.is_buffered());

        let text = block_on(body.text()).unwrap();

        assert_eq!(text, "hello world");
    }

    #[test]
    fn collect_stream_surfaces_errors() {
        let body = ResponseBody::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::Body("stream broken".into())),
        ]));

        let error = block_on(body.collect()).unwrap_err();

        assert_eq!(error.to_string(), "body error: stream broken");
    }

    #[test]
    fn invalid_utf8_is_body_error() {
        let body = ResponseBody::from_bytes(vec![0xff_u8, 0xfe]);

        let error = block_on(body.text()).unwrap_err();

        assert!(matches!(error, Error::Body(_)));
    }

    #[test]
    fn debug_does_not_dump_content() {
        let body = ResponseBody::from_bytes("secret");

        assert_eq!(format!("{body:?}"), "ResponseBody { len: 6 }");
    }
}
