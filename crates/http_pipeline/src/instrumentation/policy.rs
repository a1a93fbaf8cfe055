// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use opentelemetry::metrics::MeterProvider;
use opentelemetry::trace::{FutureExt as _, SpanContext, Status, Tracer, TracerProvider};
use opentelemetry::{Key, KeyValue};

use super::attributes::{
    CANCELLED, ERROR_TYPE, HTTP_REQUEST_METHOD, HTTP_REQUEST_RESEND_COUNT, HTTP_RESPONSE_STATUS_CODE, SERVER_ADDRESS, SERVER_PORT,
    URL_FULL, USER_AGENT_ORIGINAL,
};
use super::{InstrumentationOptions, redact_url};
use crate::otel::{OtelDurationHistogram, OtelTracing};
use crate::propagation::{AmbientContext, NoAmbientContext, TRACEPARENT, TRACESTATE, format_traceparent, resolve_parent};
use crate::telemetry::{DurationRecorder, SpanStart, TracingBackend};
use crate::{ActiveSpan, DisableTracing, Next, Request, ResendCount, Response, Result};

/// Wraps every attempt in a client span and records its duration.
///
/// For each attempt that passes through it, the policy:
///
/// - starts a span named after the HTTP method, parented on the
///   [`ExplicitParent`][crate::propagation::ExplicitParent] of the request or else on the
///   ambient context,
/// - writes the span's `traceparent` (and the parent's `tracestate`, if any) onto the request,
/// - publishes the span as [`ActiveSpan`] in the request context while the rest of the chain
///   runs; with an OpenTelemetry backend the span is also the current OpenTelemetry span there,
/// - records the response status, or the error type and message when the attempt fails,
/// - ends the span and records one `http.client.request.duration` sample.
///
/// The policy sits inside the retry loop, so a call with two retries produces three spans that
/// are siblings under the same parent. Retried attempts carry `http.request.resend_count`.
///
/// Dropping an attempt before it completes ends its span with `error.type = "cancelled"` and
/// still records the duration sample.
///
/// # Examples
///
/// ```
/// use http_pipeline::instrumentation::{InstrumentationOptions, InstrumentationPolicy};
/// use opentelemetry_sdk::metrics::SdkMeterProvider;
/// use opentelemetry_sdk::trace::SdkTracerProvider;
///
/// let tracer_provider = SdkTracerProvider::builder().build();
/// let meter_provider = SdkMeterProvider::builder().build();
///
/// let policy = InstrumentationPolicy::builder()
///     .options(InstrumentationOptions::new().allowed_query_param("api-version"))
///     .otel_tracing(&tracer_provider)
///     .otel_metrics(&meter_provider)
///     .build()?;
/// # let _ = policy;
/// # Ok::<(), http_pipeline::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct InstrumentationPolicy {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    options: InstrumentationOptions,
    request_headers: Vec<(HeaderName, Key)>,
    response_headers: Vec<(HeaderName, Key)>,
    tracing: Option<Arc<dyn TracingBackend>>,
    metrics: Option<Arc<dyn DurationRecorder>>,
    ambient: Arc<dyn AmbientContext>,
}

impl InstrumentationPolicy {
    /// Starts building a policy.
    #[must_use]
    pub fn builder() -> InstrumentationPolicyBuilder {
        InstrumentationPolicyBuilder::default()
    }

    /// Returns the options the policy was built with.
    #[must_use]
    pub fn options(&self) -> &InstrumentationOptions {
        &self.shared.options
    }

    pub(crate) fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        let shared = &*self.shared;
        let tracing = shared.tracing_for(request);
        let metrics = shared.metrics();

        if tracing.is_none() && metrics.is_none() {
            return next.process(request);
        }

        async move {
            let attributes = shared.request_attributes(request);
            let resend_count = request.context().get::<ResendCount>().map_or(0, |count| count.0);

            // a handle left behind by a cancelled attempt must not leak into this one
            _ = request.context_mut().remove::<ActiveSpan>();

            let span = tracing.map(|backend| {
                let parent = resolve_parent(request.context(), shared.ambient.as_ref());
                let span = backend.start_span(SpanStart::new(
                    request.method().as_str().to_owned(),
                    parent.span_context().cloned(),
                    attributes.clone(),
                ));
                inject_trace_context(request, &span.span_context());
                ActiveSpan::new(span)
            });

            let otel_context = span.as_ref().and_then(|span| span.lock().otel_context());
            if let Some(span) = &span {
                _ = request.context_mut().insert(span.clone());
            }

            let mut attempt = AttemptGuard {
                span,
                metrics,
                attributes,
                resend_count,
                started: Instant::now(),
                finished: false,
            };

            // policies build their futures eagerly, so the context is attached for the call too
            let outcome = match otel_context {
                Some(context) => {
                    let attempt_future = {
                        let _attached = context.clone().attach();
                        next.process(request)
                    };
                    attempt_future.with_context(context).await
                }
                None => next.process(request).await,
            };

            _ = request.context_mut().remove::<ActiveSpan>();
            attempt.finish(&outcome, &shared.response_headers);
            outcome
        }
        .boxed()
    }
}

impl Shared {
    fn tracing_for(&self, request: &Request) -> Option<&dyn TracingBackend> {
        if !self.options.is_tracing_enabled() || request.context().contains::<DisableTracing>() {
            return None;
        }

        self.tracing.as_deref()
    }

    fn metrics(&self) -> Option<&dyn DurationRecorder> {
        if !self.options.is_metrics_enabled() {
            return None;
        }

        self.metrics.as_deref()
    }

    fn request_attributes(&self, request: &Request) -> Vec<KeyValue> {
        let uri = request.uri();
        let mut attributes = Vec::with_capacity(6 + self.request_headers.len());

        attributes.push(KeyValue::new(HTTP_REQUEST_METHOD, request.method().as_str().to_owned()));
        attributes.push(KeyValue::new(URL_FULL, redact_url(uri, self.options.allowed_query_param_names())));

        if let Some(host) = uri.host() {
            attributes.push(KeyValue::new(SERVER_ADDRESS, host.to_owned()));
        }

        let port = uri.port_u16().or_else(|| match uri.scheme_str() {
            Some("https") => Some(443),
            Some("http") => Some(80),
            _ => None,
        });
        if let Some(port) = port {
            attributes.push(KeyValue::new(SERVER_PORT, i64::from(port)));
        }

        if let Some(user_agent) = request.header_str(USER_AGENT) {
            attributes.push(KeyValue::new(USER_AGENT_ORIGINAL, user_agent.to_owned()));
        }

        for (header, key) in &self.request_headers {
            if let Some(value) = request.header_str(header) {
                attributes.push(KeyValue::new(key.clone(), value.to_owned()));
            }
        }

        attributes
    }
}

fn inject_trace_context(request: &mut Request, span_context: &SpanContext) {
    if let Ok(traceparent) = HeaderValue::try_from(format_traceparent(span_context)) {
        request.insert_header(TRACEPARENT, traceparent);
    }

    let trace_state = span_context.trace_state().header();
    match HeaderValue::try_from(trace_state) {
        Ok(value) if !value.is_empty() => request.insert_header(TRACESTATE, value),
        _ => {
            request.headers_mut().remove(TRACESTATE);
        }
    }
}

/// Per-attempt state that closes the span and records the metric exactly once, also when the
/// attempt future is dropped mid-flight.
struct AttemptGuard<'a> {
    span: Option<ActiveSpan>,
    metrics: Option<&'a dyn DurationRecorder>,
    attributes: Vec<KeyValue>,
    resend_count: u32,
    started: Instant,
    finished: bool,
}

impl AttemptGuard<'_> {
    fn finish(&mut self, outcome: &Result<Response>, response_headers: &[(HeaderName, Key)]) {
        match outcome {
            Ok(response) => {
                let status = response.status();
                self.add_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16())));

                for (header, key) in response_headers {
                    if let Some(value) = response.header_str(header) {
                        self.add_attribute(KeyValue::new(key.clone(), value.to_owned()));
                    }
                }

                if status.as_u16() >= 400 {
                    self.add_attribute(KeyValue::new(ERROR_TYPE, status.as_str().to_owned()));
                    self.set_status(Status::error(""));
                }
            }
            Err(error) => {
                self.add_attribute(KeyValue::new(ERROR_TYPE, error.type_name()));
                self.set_status(Status::error(error.to_string()));
            }
        }

        self.complete();
    }

    fn add_attribute(&mut self, attribute: KeyValue) {
        if let Some(span) = &self.span {
            span.set_attribute(attribute.clone());
        }
        self.attributes.push(attribute);
    }

    fn set_status(&mut self, status: Status) {
        if let Some(span) = &self.span {
            span.lock().set_status(status);
        }
    }

    fn complete(&mut self) {
        self.finished = true;
        let seconds = self.started.elapsed().as_secs_f64();

        let exemplar = self.span.as_ref().and_then(|span| {
            let mut span = span.lock();
            if self.resend_count > 0 {
                span.set_attribute(KeyValue::new(HTTP_REQUEST_RESEND_COUNT, i64::from(self.resend_count)));
            }
            let span_context = span.span_context();
            span.end();
            span_context.is_sampled().then_some(span_context)
        });

        if let Some(metrics) = self.metrics {
            metrics.record(seconds, &self.attributes, exemplar.as_ref());
        }
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        self.add_attribute(KeyValue::new(ERROR_TYPE, CANCELLED));
        self.set_status(Status::error("request cancelled before a response was received"));
        self.complete();
    }
}

/// Builder for [`InstrumentationPolicy`].
#[derive(Debug, Default)]
pub struct InstrumentationPolicyBuilder {
    options: InstrumentationOptions,
    tracing: Option<Arc<dyn TracingBackend>>,
    metrics: Option<Arc<dyn DurationRecorder>>,
    ambient: Option<Arc<dyn AmbientContext>>,
}

impl InstrumentationPolicyBuilder {
    /// Sets the options.
    #[must_use]
    pub fn options(mut self, options: InstrumentationOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates spans with `backend`. Without a tracing backend no spans are created.
    #[must_use]
    pub fn tracing_backend(mut self, backend: impl TracingBackend + 'static) -> Self {
        self.tracing = Some(Arc::new(backend));
        self
    }

    /// Creates spans with a tracer obtained from an OpenTelemetry tracer provider.
    #[must_use]
    pub fn otel_tracing<P>(self, provider: &P) -> Self
    where
        P: TracerProvider,
        P::Tracer: Send + Sync + 'static,
        <P::Tracer as Tracer>::Span: Send + Sync + 'static,
    {
        self.tracing_backend(OtelTracing::from_provider(provider))
    }

    /// Records durations with `recorder`. Without a recorder no metrics are recorded.
    #[must_use]
    pub fn duration_recorder(mut self, recorder: impl DurationRecorder + 'static) -> Self {
        self.metrics = Some(Arc::new(recorder));
        self
    }

    /// Records durations in a histogram created from an OpenTelemetry meter provider.
    #[must_use]
    pub fn otel_metrics(self, meter_provider: &dyn MeterProvider) -> Self {
        self.duration_recorder(OtelDurationHistogram::new(meter_provider))
    }

    /// Sets the source of the parent span for requests without an explicit parent.
    ///
    /// **Default**: [`NoAmbientContext`], such requests start a new trace.
    #[must_use]
    pub fn ambient_context(mut self, ambient: impl AmbientContext + 'static) -> Self {
        self.ambient = Some(Arc::new(ambient));
        self
    }

    /// Builds the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeaderName`][crate::Error::InvalidHeaderName] if a header in
    /// the header-to-attribute maps is not a valid header name.
    pub fn build(self) -> Result<InstrumentationPolicy> {
        let request_headers = parse_header_attributes(self.options.request_header_attributes())?;
        let response_headers = parse_header_attributes(self.options.response_header_attributes())?;

        Ok(InstrumentationPolicy {
            shared: Arc::new(Shared {
                options: self.options,
                request_headers,
                response_headers,
                tracing: self.tracing,
                metrics: self.metrics,
                ambient: self.ambient.unwrap_or_else(|| Arc::new(NoAmbientContext)),
            }),
        })
    }
}

fn parse_header_attributes<'a>(map: impl IntoIterator<Item = (&'a String, &'a String)>) -> Result<Vec<(HeaderName, Key)>> {
    map.into_iter()
        .map(|(header, attribute)| -> Result<(HeaderName, Key)> {
            Ok((HeaderName::from_bytes(header.as_bytes())?, Key::from(attribute.clone())))
        })
        .collect()
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use http::Method;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Error;
    use crate::testing::InMemoryTelemetry;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(InstrumentationPolicy: Send, Sync, Clone);
    }

    #[test]
    fn invalid_header_name_fails_build() {
        let error = InstrumentationPolicy::builder()
            .options(InstrumentationOptions::new().request_header_attribute("bad header", "attr"))
            .build()
            .unwrap_err();

        assert!(matches!(error, Error::InvalidHeaderName(_)));
    }

    #[test]
    fn request_attributes_default_ports() {
        let policy = InstrumentationPolicy::builder().build().unwrap();

        let https = Request::new(Method::GET, "https://example.com/a").unwrap();
        let http = Request::new(Method::GET, "http://example.com/a").unwrap();
        let explicit = Request::new(Method::GET, "http://example.com:8080/a").unwrap();

        let port = |request: &Request| {
            policy
                .shared
                .request_attributes(request)
                .into_iter()
                .find(|kv| kv.key.as_str() == SERVER_PORT)
                .map(|kv| kv.value)
        };

        assert_eq!(port(&https), Some(443_i64.into()));
        assert_eq!(port(&http), Some(80_i64.into()));
        assert_eq!(port(&explicit), Some(8080_i64.into()));
    }

    #[test]
    fn disabled_options_switch_off_backends() {
        let telemetry = InMemoryTelemetry::new();
        let policy = InstrumentationPolicy::builder()
            .options(InstrumentationOptions::new().tracing_enabled(false).metrics_enabled(false))
            .tracing_backend(telemetry.clone())
            .duration_recorder(telemetry)
            .build()
            .unwrap();
        let request = Request::new(Method::GET, "https://example.com").unwrap();

        assert!(policy.shared.tracing_for(&request).is_none());
        assert!(policy.shared.metrics().is_none());
    }

    #[test]
    fn disable_tracing_flag_only_affects_tracing() {
        let telemetry = InMemoryTelemetry::new();
        let policy = InstrumentationPolicy::builder()
            .tracing_backend(telemetry.clone())
            .duration_recorder(telemetry)
            .build()
            .unwrap();
        let request = Request::new(Method::GET, "https://example.com").unwrap().with_context(DisableTracing);

        assert!(policy.shared.tracing_for(&request).is_none());
        assert!(policy.shared.metrics().is_some());
    }
}
