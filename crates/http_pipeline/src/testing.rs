// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory doubles for the transport and the telemetry backend.
//!
//! Available with the `test-util` feature.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use opentelemetry::trace::{SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState};
use opentelemetry::{KeyValue, Value};

use crate::telemetry::{AttemptSpan, DurationRecorder, SpanStart, TracingBackend};
use crate::{Error, Request, Response, Result, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a Value> {
    attributes.iter().find(|kv| kv.key.as_str() == key).map(|kv| &kv.value)
}

/// A span recorded by [`InMemoryTelemetry`] when it ended.
#[derive(Clone, Debug)]
pub struct FinishedSpan {
    /// The span name.
    pub name: String,
    /// The span identity.
    pub span_context: SpanContext,
    /// The parent the span was started with.
    pub parent: Option<SpanContext>,
    /// The span kind.
    pub kind: SpanKind,
    /// Final attributes, in the order they were first set.
    pub attributes: Vec<KeyValue>,
    /// Final status.
    pub status: Status,
}

impl FinishedSpan {
    /// Returns the value of an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        find(&self.attributes, key)
    }
}

/// A duration sample recorded by [`InMemoryTelemetry`].
#[derive(Clone, Debug)]
pub struct Measurement {
    /// Duration in seconds.
    pub seconds: f64,
    /// Dimension attributes.
    pub attributes: Vec<KeyValue>,
    /// The sampled span the sample is linked to.
    pub exemplar: Option<SpanContext>,
}

impl Measurement {
    /// Returns the value of an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        find(&self.attributes, key)
    }
}

/// A tracing backend and duration recorder that keeps everything in memory.
///
/// Clones share the same storage, so one instance can be handed to the instrumentation policy
/// and inspected afterwards. Unsampled spans get valid IDs but are not recorded, mirroring a
/// non-recording span of a real SDK.
#[derive(Clone, Debug)]
pub struct InMemoryTelemetry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sampled: bool,
    spans: Mutex<Vec<FinishedSpan>>,
    measurements: Mutex<Vec<Measurement>>,
}

impl InMemoryTelemetry {
    /// Creates a backend that samples every span.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sampling(true)
    }

    /// Creates a backend that samples no span.
    #[must_use]
    pub fn unsampled() -> Self {
        Self::with_sampling(false)
    }

    fn with_sampling(sampled: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                sampled,
                spans: Mutex::default(),
                measurements: Mutex::default(),
            }),
        }
    }

    /// Returns the spans that ended so far, in the order they ended.
    #[must_use]
    pub fn spans(&self) -> Vec<FinishedSpan> {
        lock(&self.inner.spans).clone()
    }

    /// Returns the duration samples recorded so far.
    #[must_use]
    pub fn measurements(&self) -> Vec<Measurement> {
        lock(&self.inner.measurements).clone()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        lock(&self.inner.spans).clear();
        lock(&self.inner.measurements).clear();
    }
}

impl Default for InMemoryTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingBackend for InMemoryTelemetry {
    fn start_span(&self, start: SpanStart) -> Box<dyn AttemptSpan> {
        let kind = start.kind();
        let (name, parent, attributes) = start.into_parts();

        let (trace_id, trace_state) = parent.as_ref().map_or_else(
            || (TraceId::from_bytes(fastrand::u128(1..).to_be_bytes()), TraceState::default()),
            |parent| (parent.trace_id(), parent.trace_state().clone()),
        );
        let flags = if self.inner.sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        let span_context = SpanContext::new(trace_id, SpanId::from_bytes(fastrand::u64(1..).to_be_bytes()), flags, false, trace_state);

        Box::new(InMemorySpan {
            inner: Arc::clone(&self.inner),
            span: FinishedSpan {
                name: name.into_owned(),
                span_context,
                parent,
                kind,
                attributes,
                status: Status::Unset,
            },
            ended: false,
        })
    }
}

impl DurationRecorder for InMemoryTelemetry {
    fn record(&self, seconds: f64, attributes: &[KeyValue], exemplar: Option<&SpanContext>) {
        lock(&self.inner.measurements).push(Measurement {
            seconds,
            attributes: attributes.to_vec(),
            exemplar: exemplar.cloned(),
        });
    }
}

#[derive(Debug)]
struct InMemorySpan {
    inner: Arc<Inner>,
    span: FinishedSpan,
    ended: bool,
}

impl AttemptSpan for InMemorySpan {
    fn span_context(&self) -> SpanContext {
        self.span.span_context.clone()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        match self.span.attributes.iter_mut().find(|kv| kv.key == attribute.key) {
            Some(existing) => *existing = attribute,
            None => self.span.attributes.push(attribute),
        }
    }

    fn set_status(&mut self, status: Status) {
        self.span.status = status;
    }

    fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        if self.span.span_context.is_sampled() {
            lock(&self.inner.spans).push(self.span.clone());
        }
    }
}

/// What a [`MockTransport`] does for one request.
#[derive(Debug)]
#[non_exhaustive]
pub enum MockOutcome {
    /// Responds with the given response.
    Respond(Response),
    /// Fails with the given I/O error, converted through `Error::from`.
    Fail(std::io::Error),
    /// Never completes.
    Hang,
}

/// A scripted [`Transport`] that records every request it receives.
///
/// Outcomes are consumed in order; once the script is exhausted every request gets a `200 OK`.
/// Clones share the script and the recorded requests.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

#[derive(Debug, Default)]
struct MockInner {
    script: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    /// Creates a transport that answers `200 OK` to everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome.
    #[must_use]
    pub fn then(self, outcome: MockOutcome) -> Self {
        lock(&self.inner.script).push_back(outcome);
        self
    }

    /// Queues an empty response with `status`.
    #[must_use]
    pub fn then_status(self, status: StatusCode) -> Self {
        self.then(MockOutcome::Respond(Response::new(status)))
    }

    /// Queues a response.
    #[must_use]
    pub fn then_respond(self, response: Response) -> Self {
        self.then(MockOutcome::Respond(response))
    }

    /// Queues an I/O failure.
    #[must_use]
    pub fn then_fail(self, error: std::io::Error) -> Self {
        self.then(MockOutcome::Fail(error))
    }

    /// Queues a request that never completes.
    #[must_use]
    pub fn then_hang(self) -> Self {
        self.then(MockOutcome::Hang)
    }

    /// Returns copies of the requests received so far, as they looked at the transport.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.inner.requests).clone()
    }

    /// Returns the number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.inner.requests).len()
    }
}

impl Transport for MockTransport {
    fn send<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
        lock(&self.inner.requests).push(request.clone());
        let outcome = lock(&self.inner.script).pop_front();

        async move {
            match outcome {
                None => Ok(Response::new(StatusCode::OK)),
                Some(MockOutcome::Respond(response)) => Ok(response),
                Some(MockOutcome::Fail(error)) => Err(Error::from(error)),
                Some(MockOutcome::Hang) => futures::future::pending().await,
            }
        }
        .boxed()
    }
}

/// Returns the string form of an attribute value, for compact assertions.
#[must_use]
pub fn value_str(value: Option<&Value>) -> Option<String> {
    value.map(|value| value.as_str().into_owned())
}

/// Returns `true` if `attributes` contain `key`.
#[must_use]
pub fn has_key(attributes: &[KeyValue], key: &str) -> bool {
    attributes.iter().any(|kv| kv.key.as_str() == key)
}
