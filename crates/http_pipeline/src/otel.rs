// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OpenTelemetry implementations of the telemetry backend traits.

use std::fmt::{Debug, Formatter};

use opentelemetry::metrics::{Histogram, Meter, MeterProvider};
use opentelemetry::trace::{SpanContext, SpanKind, Status, TraceContextExt, Tracer, TracerProvider};
use opentelemetry::{InstrumentationScope, KeyValue};

use crate::telemetry::{
    AttemptSpan, DURATION_BUCKET_BOUNDARIES, DURATION_METRIC_DESCRIPTION, DURATION_METRIC_NAME, DURATION_METRIC_UNIT, DurationRecorder,
    SpanStart, TracingBackend,
};

const SCOPE_NAME: &str = "http_pipeline";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

fn scope() -> InstrumentationScope {
    InstrumentationScope::builder(SCOPE_NAME)
        .with_version(VERSION)
        .with_schema_url(SCHEMA_URL)
        .build()
}

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(scope())
}

/// A [`TracingBackend`] that starts spans with an OpenTelemetry [`Tracer`].
pub struct OtelTracing<T> {
    tracer: T,
}

impl<T: Tracer> OtelTracing<T> {
    /// Uses `tracer` to start spans.
    #[must_use]
    pub fn new(tracer: T) -> Self {
        Self { tracer }
    }
}

impl<T> OtelTracing<T> {
    /// Creates a tracer with this crate's instrumentation scope from `provider`.
    #[must_use]
    pub fn from_provider<P>(provider: &P) -> Self
    where
        P: TracerProvider<Tracer = T>,
    {
        Self {
            tracer: provider.tracer_with_scope(scope()),
        }
    }
}

impl<T> TracingBackend for OtelTracing<T>
where
    T: Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    fn start_span(&self, start: SpanStart) -> Box<dyn AttemptSpan> {
        let (name, parent, attributes) = start.into_parts();
        let parent_context = match parent {
            Some(parent) => opentelemetry::Context::new().with_remote_span_context(parent),
            None => opentelemetry::Context::new(),
        };

        let span = self
            .tracer
            .span_builder(name)
            .with_kind(SpanKind::Client)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, &parent_context);

        Box::new(OtelSpan {
            context: parent_context.with_span(span),
        })
    }
}

impl<T> Debug for OtelTracing<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelTracing").finish_non_exhaustive()
    }
}

// The span lives inside an OpenTelemetry context so the rest of the chain can run with it
// attached as the current span.
struct OtelSpan {
    context: opentelemetry::Context,
}

impl AttemptSpan for OtelSpan {
    fn span_context(&self) -> SpanContext {
        self.context.span().span_context().clone()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.context.span().set_attribute(attribute);
    }

    fn set_status(&mut self, status: Status) {
        self.context.span().set_status(status);
    }

    fn end(&mut self) {
        self.context.span().end();
    }

    fn otel_context(&self) -> Option<opentelemetry::Context> {
        Some(self.context.clone())
    }
}

impl Debug for OtelSpan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelSpan")
            .field("span_context", self.context.span().span_context())
            .finish()
    }
}

/// A [`DurationRecorder`] backed by an OpenTelemetry `f64` histogram named
/// `http.client.request.duration`.
///
/// Samples linked to a sampled span are recorded while a context carrying that span is
/// attached, so an SDK with exemplar support can link the sample to the trace.
pub struct OtelDurationHistogram {
    histogram: Histogram<f64>,
}

impl OtelDurationHistogram {
    /// Creates the histogram from `meter_provider`.
    #[must_use]
    pub fn new(meter_provider: &dyn MeterProvider) -> Self {
        let meter = create_meter(meter_provider);

        Self {
            histogram: meter
                .f64_histogram(DURATION_METRIC_NAME)
                .with_unit(DURATION_METRIC_UNIT)
                .with_description(DURATION_METRIC_DESCRIPTION)
                .with_boundaries(DURATION_BUCKET_BOUNDARIES.to_vec())
                .build(),
        }
    }
}

impl DurationRecorder for OtelDurationHistogram {
    fn record(&self, seconds: f64, attributes: &[KeyValue], exemplar: Option<&SpanContext>) {
        match exemplar {
            Some(span_context) if span_context.is_sampled() => {
                let _guard = opentelemetry::Context::new()
                    .with_remote_span_context(span_context.clone())
                    .attach();
                self.histogram.record(seconds, attributes);
            }
            _ => self.histogram.record(seconds, attributes),
        }
    }
}

impl Debug for OtelDurationHistogram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelDurationHistogram").field("name", &DURATION_METRIC_NAME).finish()
    }
}
