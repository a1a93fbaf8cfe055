// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::{Request, Response, Result};

/// Performs the actual HTTP exchange at the end of a [`Pipeline`][crate::Pipeline].
///
/// The transport sees the request after every policy has processed it, so headers such as
/// `traceparent` are already in place. Transports must be safe to call concurrently.
pub trait Transport: Send + Sync + Debug {
    /// Sends `request` and returns the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`][crate::Error::Transport] when no response could be
    /// obtained. HTTP error statuses are returned as responses, not errors.
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
        (**self).send(request)
    }
}

/// Adapts a closure into a [`Transport`].
///
/// The closure receives the request by reference and returns a future that owns whatever it
/// needs from it.
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use http_pipeline::{FnTransport, Response};
///
/// let transport = FnTransport::new(|_request| async { Ok(Response::new(StatusCode::OK)) });
/// # let _ = transport;
/// ```
pub struct FnTransport<F> {
    send: F,
}

impl<F> FnTransport<F> {
    /// Creates a transport that delegates to `send`.
    pub fn new<Fut>(send: F) -> Self
    where
        F: Fn(&Request) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self { send }
    }
}

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(&Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
        (self.send)(request).boxed()
    }
}

impl<F> Debug for FnTransport<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransport").finish_non_exhaustive()
    }
}
