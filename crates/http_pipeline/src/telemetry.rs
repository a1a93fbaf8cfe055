// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The boundary between the instrumentation policy and a tracing/metrics backend.
//!
//! The policy only needs to start a span with a name, parent and attributes, mutate and end
//! it, and record one duration sample per attempt. [`otel`][crate::otel] implements these
//! traits on top of the OpenTelemetry API.

use std::borrow::Cow;
use std::fmt::Debug;

use opentelemetry::KeyValue;
use opentelemetry::trace::{SpanContext, SpanKind, Status};

/// Name of the per-attempt duration histogram.
pub const DURATION_METRIC_NAME: &str = "http.client.request.duration";

/// Unit of the per-attempt duration histogram.
pub const DURATION_METRIC_UNIT: &str = "s";

/// Description of the per-attempt duration histogram.
pub const DURATION_METRIC_DESCRIPTION: &str = "Duration of HTTP client requests.";

/// Explicit bucket boundaries of the per-attempt duration histogram, in seconds.
pub const DURATION_BUCKET_BOUNDARIES: [f64; 14] = [0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0];

/// Everything a backend needs to start an attempt span.
#[derive(Clone, Debug)]
pub struct SpanStart {
    name: Cow<'static, str>,
    parent: Option<SpanContext>,
    attributes: Vec<KeyValue>,
}

impl SpanStart {
    /// Describes a new span.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, parent: Option<SpanContext>, attributes: Vec<KeyValue>) -> Self {
        Self {
            name: name.into(),
            parent,
            attributes,
        }
    }

    /// The span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent, or `None` for a new trace.
    #[must_use]
    pub fn parent(&self) -> Option<&SpanContext> {
        self.parent.as_ref()
    }

    /// Attributes known when the span starts.
    #[must_use]
    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    /// Attempt spans are always client spans.
    #[must_use]
    pub fn kind(&self) -> SpanKind {
        SpanKind::Client
    }

    /// Splits the description into name, parent and attributes.
    #[must_use]
    pub fn into_parts(self) -> (Cow<'static, str>, Option<SpanContext>, Vec<KeyValue>) {
        (self.name, self.parent, self.attributes)
    }
}

/// Creates attempt spans.
pub trait TracingBackend: Send + Sync + Debug {
    /// Starts a span. The span must carry a valid span context even when it is not sampled.
    fn start_span(&self, start: SpanStart) -> Box<dyn AttemptSpan>;
}

/// A started attempt span.
pub trait AttemptSpan: Send + Debug {
    /// The identity of the span, used for header injection and exemplars.
    fn span_context(&self) -> SpanContext;

    /// Adds or replaces an attribute.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Sets the terminal status.
    fn set_status(&mut self, status: Status);

    /// Ends the span. Called exactly once.
    fn end(&mut self);

    /// An OpenTelemetry context carrying this span as the current span.
    ///
    /// When present, the rest of the chain runs with this context attached, so code below
    /// the instrumentation sees the attempt span through `opentelemetry::Context::current()`.
    fn otel_context(&self) -> Option<opentelemetry::Context> {
        None
    }
}

/// Records per-attempt durations.
pub trait DurationRecorder: Send + Sync + Debug {
    /// Records one sample, optionally linked to a sampled span.
    fn record(&self, seconds: f64, attributes: &[KeyValue], exemplar: Option<&SpanContext>);
}
