// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Parent selection and W3C trace-context headers.
//!
//! The instrumentation policy chooses the parent of each attempt span from two sources: an
//! [`ExplicitParent`] stored in the request [`Context`], and an [`AmbientContext`] injected when
//! the policy is built. The explicit parent always wins. Invalid span contexts from either
//! source are ignored, and when neither yields a valid context the span starts a new trace.
//!
//! The policy writes the `traceparent` and `tracestate` headers itself using
//! [`format_traceparent`]; it does not go through a pluggable text-map propagator.

use std::fmt::Debug;
use std::str::FromStr;

use http::HeaderMap;
use http::header::HeaderName;
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};

use crate::Context;

/// The W3C `traceparent` header.
pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");

/// The W3C `tracestate` header.
pub const TRACESTATE: HeaderName = HeaderName::from_static("tracestate");

const SUPPORTED_VERSION: u8 = 0;
const INVALID_VERSION: u8 = 0xff;

/// A parent span supplied by the caller for a single request.
///
/// Store it in the request context to make the attempt spans children of `0`, regardless of
/// what the ambient context reports.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplicitParent(pub SpanContext);

impl ExplicitParent {
    /// Extracts a remote parent from incoming `traceparent` and `tracestate` headers.
    ///
    /// Returns `None` when `traceparent` is missing or malformed. A malformed `tracestate` is
    /// dropped while the `traceparent` is kept.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let traceparent = headers.get(TRACEPARENT)?.to_str().ok()?;
        let trace_state = headers
            .get(TRACESTATE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| TraceState::from_str(value).ok())
            .unwrap_or_default();

        parse_traceparent_with_state(traceparent, trace_state).map(Self)
    }
}

/// Source of the parent span when the request carries no [`ExplicitParent`].
///
/// Implementations are consulted once per attempt, on the task that runs the attempt.
pub trait AmbientContext: Send + Sync + Debug {
    /// Returns the current span context, if any.
    fn current(&self) -> Option<SpanContext>;
}

/// An ambient source that never reports a parent. Every span without an explicit parent
/// starts a new trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAmbientContext;

impl AmbientContext for NoAmbientContext {
    fn current(&self) -> Option<SpanContext> {
        None
    }
}

/// An ambient source that always reports the same span context.
///
/// Useful when the caller already knows the parent for every request sent through a
/// pipeline, e.g. a pipeline created per incoming server request.
#[derive(Clone, Debug)]
pub struct FixedAmbientContext(SpanContext);

impl FixedAmbientContext {
    /// Creates a source that reports `span_context`.
    #[must_use]
    pub fn new(span_context: SpanContext) -> Self {
        Self(span_context)
    }
}

impl AmbientContext for FixedAmbientContext {
    fn current(&self) -> Option<SpanContext> {
        Some(self.0.clone())
    }
}

/// An ambient source that reads the active span of the current OpenTelemetry
/// [`Context`][opentelemetry::Context].
#[derive(Clone, Copy, Debug, Default)]
pub struct OtelAmbientContext;

impl AmbientContext for OtelAmbientContext {
    fn current(&self) -> Option<SpanContext> {
        let context = opentelemetry::Context::current();
        let span = context.span();
        let span_context = span.span_context();

        span_context.is_valid().then(|| span_context.clone())
    }
}

/// Which parent an attempt span was given.
#[derive(Clone, Debug, PartialEq)]
pub enum ParentSelection {
    /// The [`ExplicitParent`] from the request context.
    Explicit(SpanContext),
    /// The span context reported by the [`AmbientContext`].
    Ambient(SpanContext),
    /// No valid parent; the span starts a new trace.
    Root,
}

impl ParentSelection {
    /// Returns the selected parent, or `None` for a new root.
    #[must_use]
    pub fn span_context(&self) -> Option<&SpanContext> {
        match self {
            Self::Explicit(span_context) | Self::Ambient(span_context) => Some(span_context),
            Self::Root => None,
        }
    }
}

/// Chooses the parent for a new attempt span.
#[must_use]
pub fn resolve_parent(context: &Context, ambient: &dyn AmbientContext) -> ParentSelection {
    if let Some(ExplicitParent(parent)) = context.get::<ExplicitParent>()
        && parent.is_valid()
    {
        return ParentSelection::Explicit(parent.clone());
    }

    match ambient.current() {
        Some(parent) if parent.is_valid() => ParentSelection::Ambient(parent),
        _ => ParentSelection::Root,
    }
}

/// Formats a `traceparent` header value: `00-{trace-id}-{span-id}-{flags}`.
///
/// Only the sampled bit of the trace flags is written, so unsampled spans produce `00`.
#[must_use]
pub fn format_traceparent(span_context: &SpanContext) -> String {
    format!(
        "{SUPPORTED_VERSION:02x}-{}-{}-{:02x}",
        span_context.trace_id(),
        span_context.span_id(),
        (span_context.trace_flags() & TraceFlags::SAMPLED).to_u8()
    )
}

/// Parses a `traceparent` header value into a remote span context.
///
/// Returns `None` for version `ff`, wrong field lengths, non-hex or upper-case digits, and
/// all-zero trace or span IDs.
#[must_use]
pub fn parse_traceparent(value: &str) -> Option<SpanContext> {
    parse_traceparent_with_state(value, TraceState::default())
}

fn parse_traceparent_with_state(value: &str, trace_state: TraceState) -> Option<SpanContext> {
    let mut parts = value.trim().split('-');
    let version = parse_hex_field(parts.next()?, 2)?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parse_hex_field(parts.next()?, 2)?;

    let version = u8::from_str_radix(version, 16).ok()?;
    if version == INVALID_VERSION {
        return None;
    }

    // Version 00 has exactly four fields; later versions may append more.
    if version == SUPPORTED_VERSION && parts.next().is_some() {
        return None;
    }

    let trace_id = TraceId::from_hex(parse_hex_field(trace_id, 32)?).ok()?;
    let span_id = SpanId::from_hex(parse_hex_field(span_id, 16)?).ok()?;
    let flags = u8::from_str_radix(flags, 16).ok()?;

    let span_context = SpanContext::new(trace_id, span_id, TraceFlags::new(flags) & TraceFlags::SAMPLED, true, trace_state);

    span_context.is_valid().then_some(span_context)
}

fn parse_hex_field(field: &str, len: usize) -> Option<&str> {
    (field.len() == len && field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))).then_some(field)
}
