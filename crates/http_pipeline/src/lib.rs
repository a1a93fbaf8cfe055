// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A composable HTTP request pipeline with per-attempt tracing, duration metrics and retries.
//!
//! A [`Pipeline`] is an ordered chain of [`Policy`] stages that ends in a [`Transport`]. Each
//! stage receives the mutable [`Request`] and a [`Next`] handle on the rest of the chain, so it
//! can change the request, call the rest of the chain any number of times and inspect the
//! outcome. The pipeline is built once, shared freely between threads and reused for any
//! number of calls.
//!
//! # Built-in stages
//!
//! - [`RetryPolicy`][retry::RetryPolicy] resends requests whose outcome is transient, with
//!   constant, linear or exponential backoff, and records the resend count in the request
//!   [`Context`].
//! - [`InstrumentationPolicy`][instrumentation::InstrumentationPolicy] opens one client span
//!   and records one `http.client.request.duration` sample per attempt, propagates the trace
//!   through the `traceparent` header and redacts query values in `url.full`.
//! - [`LoggingPolicy`][logging::LoggingPolicy] logs every attempt through `tracing`.
//! - The [`policies`] module holds per-call header policies, such as a request id and a
//!   user agent.
//!
//! # Example
//!
//! ```
//! use http::{Method, StatusCode};
//! use http_pipeline::instrumentation::InstrumentationPolicy;
//! use http_pipeline::policies::{RequestIdPolicy, UserAgentPolicy};
//! use http_pipeline::retry::RetryPolicy;
//! use http_pipeline::{FnTransport, Pipeline, Request, Response};
//!
//! # async fn example() -> http_pipeline::Result<()> {
//! let pipeline = Pipeline::builder()
//!     .policy(RequestIdPolicy::new())
//!     .policy(UserAgentPolicy::new())
//!     .retry(RetryPolicy::default())
//!     .instrumentation(InstrumentationPolicy::builder().build()?)
//!     .transport(FnTransport::new(|_: &Request| async { Ok(Response::new(StatusCode::OK)) }))
//!     .build();
//!
//! let mut request = Request::new(Method::GET, "https://example.com/items?page=2")?;
//! let response = pipeline.send(&mut request).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! # Telemetry backends
//!
//! The instrumentation talks to [`telemetry::TracingBackend`] and
//! [`telemetry::DurationRecorder`]. The [`otel`] module adapts both to the OpenTelemetry API.
//! With the `test-util` feature, [`testing::InMemoryTelemetry`] records spans and samples in
//! memory for assertions.
//!
//! # Features
//!
//! - `serde`: `Serialize` and `Deserialize` for the option types.
//! - `json`: JSON request and response bodies.
//! - `test-util`: the [`testing`] module with an in-memory telemetry backend and a scripted
//!   transport.

mod body;
mod context;
mod error;
mod pipeline;
mod policy;
mod request;
mod response;
mod transport;

pub mod instrumentation;
pub mod logging;
pub mod otel;
pub mod policies;
pub mod propagation;
pub mod retry;
pub mod telemetry;

#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;

pub use body::{Body, ResponseBody};
pub use context::{ActiveSpan, Context, DisableTracing, RequestId, ResendCount};
pub use error::{Error, Result, TransportErrorKind};
pub use pipeline::{NotSet, Pipeline, PipelineBuilder, Set};
pub use policy::{Next, Policy, PolicyPosition};
pub use request::Request;
pub use response::Response;
pub use transport::{FnTransport, Transport};
