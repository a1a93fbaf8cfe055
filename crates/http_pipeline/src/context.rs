// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http::Extensions;
use opentelemetry::KeyValue;
use opentelemetry::trace::SpanContext;

use crate::telemetry::AttemptSpan;

/// A typed bag of per-call values that travels with a [`Request`][crate::Request].
///
/// Policies use the context to exchange cross-cutting data without widening the request
/// type: the retry policy publishes the [`ResendCount`], the instrumentation publishes the
/// [`ActiveSpan`] of each attempt, callers switch tracing off with
/// [`DisableTracing`], pass an [`ExplicitParent`][crate::propagation::ExplicitParent] or
/// override the log level with [`HttpLogLevel`][crate::logging::HttpLogLevel].
///
/// Values are keyed by their type, so each type can be stored at most once.
///
/// # Examples
///
/// ```
/// use http_pipeline::{Context, DisableTracing};
///
/// let mut context = Context::new();
/// context.insert(DisableTracing);
///
/// assert!(context.contains::<DisableTracing>());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Context {
    values: Extensions,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value)
    }

    /// Inserts a value and returns the updated context.
    #[must_use]
    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.insert(value);
        self
    }

    /// Returns the value of type `T`, if present.
    #[must_use]
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>()
    }

    /// Removes and returns the value of type `T`, if present.
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.values.remove::<T>()
    }

    /// Returns `true` if a value of type `T` is present.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: Send + Sync + 'static,
    {
        self.get::<T>().is_some()
    }
}

/// Switches tracing off for a single call.
///
/// Independent of the instance-wide switch on the instrumentation policy. Duration metrics
/// are still recorded when metrics are enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisableTracing;

/// Number of times the request has already been sent before the current attempt.
///
/// Only the retry policy writes this value. It is absent on the first attempt and is removed
/// again when the call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResendCount(pub u32);

/// Handle on the span of the attempt in flight.
///
/// The instrumentation policy publishes it for the duration of each traced attempt, so
/// policies placed after the instrumentation can read the span identity or enrich the span.
/// The handle is removed again once the attempt resolves. The span itself is ended by the
/// instrumentation, attributes set after that are ignored.
///
/// # Examples
///
/// ```
/// use futures::future::BoxFuture;
/// use http_pipeline::{ActiveSpan, Next, Policy, PolicyPosition, Request, Response, Result};
/// use opentelemetry::KeyValue;
///
/// #[derive(Debug)]
/// struct Tenant;
///
/// impl Policy for Tenant {
///     fn position(&self) -> PolicyPosition {
///         PolicyPosition::AfterInstrumentation
///     }
///
///     fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
///         if let Some(span) = request.context().get::<ActiveSpan>() {
///             span.set_attribute(KeyValue::new("tenant.id", "contoso"));
///         }
///         next.process(request)
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ActiveSpan {
    span: Arc<Mutex<Box<dyn AttemptSpan>>>,
}

impl ActiveSpan {
    pub(crate) fn new(span: Box<dyn AttemptSpan>) -> Self {
        Self {
            span: Arc::new(Mutex::new(span)),
        }
    }

    /// The identity of the attempt span.
    #[must_use]
    pub fn span_context(&self) -> SpanContext {
        self.lock().span_context()
    }

    /// Adds or replaces an attribute on the attempt span.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.lock().set_attribute(attribute);
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn AttemptSpan>> {
        self.span.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identifier attached to a logical call by the
/// [`RequestIdPolicy`][crate::policies::RequestIdPolicy].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);
