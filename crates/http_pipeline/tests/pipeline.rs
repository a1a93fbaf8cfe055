// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for stage ordering and the blocking entry point.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use http::{Method, StatusCode};
use http_pipeline::instrumentation::InstrumentationPolicy;
use http_pipeline::logging::LoggingPolicy;
use http_pipeline::policies::{CLIENT_REQUEST_ID, RequestIdPolicy};
use http_pipeline::retry::{RetryOptions, RetryPolicy};
use http_pipeline::testing::{InMemoryTelemetry, MockTransport};
use http_pipeline::{Error, FnTransport, Next, Pipeline, Policy, PolicyPosition, Request, RequestId, Response, Result};

type Journal = Arc<Mutex<Vec<&'static str>>>;

#[derive(Debug)]
struct Record {
    name: &'static str,
    position: PolicyPosition,
    journal: Journal,
}

impl Record {
    fn new(name: &'static str, position: PolicyPosition, journal: &Journal) -> Self {
        Self {
            name,
            position,
            journal: Arc::clone(journal),
        }
    }
}

impl Policy for Record {
    fn name(&self) -> &'static str {
        self.name
    }

    fn position(&self) -> PolicyPosition {
        self.position
    }

    fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        self.journal.lock().unwrap().push(self.name);
        next.process(request)
    }
}

fn retry() -> RetryPolicy {
    RetryPolicy::new(RetryOptions::new().base_delay(Duration::ZERO))
}

fn get() -> Request {
    Request::new(Method::GET, "https://example.com/items").unwrap()
}

#[test]
fn stages_follow_fixed_order() {
    let journal = Journal::default();
    let telemetry = InMemoryTelemetry::new();

    // Added out of order on purpose; placement depends on position only.
    let pipeline = Pipeline::builder()
        .policy(Record::new("after", PolicyPosition::AfterInstrumentation, &journal))
        .logging(LoggingPolicy::default())
        .policy(Record::new("per_retry", PolicyPosition::PerRetry, &journal))
        .instrumentation(
            InstrumentationPolicy::builder()
                .tracing_backend(telemetry.clone())
                .build()
                .unwrap(),
        )
        .policy(Record::new("before", PolicyPosition::BeforeInstrumentation, &journal))
        .retry(retry())
        .policy(Record::new("per_call", PolicyPosition::PerCall, &journal))
        .transport(MockTransport::new())
        .build();

    assert_eq!(
        pipeline.stage_names(),
        ["per_call", "retry", "per_retry", "before", "instrumentation", "after", "logging"]
    );

    pipeline.send_blocking(&mut get()).unwrap();

    assert_eq!(*journal.lock().unwrap(), ["per_call", "per_retry", "before", "after"]);
}

#[test]
fn per_call_runs_once_across_retries() {
    let journal = Journal::default();
    let transport = MockTransport::new()
        .then_status(StatusCode::SERVICE_UNAVAILABLE)
        .then_status(StatusCode::SERVICE_UNAVAILABLE)
        .then_status(StatusCode::OK);

    let pipeline = Pipeline::builder()
        .per_call(Record::new("per_call", PolicyPosition::PerRetry, &journal))
        .retry(retry())
        .per_retry(Record::new("per_retry", PolicyPosition::PerCall, &journal))
        .transport(transport.clone())
        .build();

    let response = pipeline.send_blocking(&mut get()).unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.request_count(), 3);
    assert_eq!(
        *journal.lock().unwrap(),
        ["per_call", "per_retry", "per_retry", "per_retry"]
    );
}

#[test]
fn request_id_is_stable_across_retries() {
    let transport = MockTransport::new().then_status(StatusCode::BAD_GATEWAY);
    let pipeline = Pipeline::builder()
        .policy(RequestIdPolicy::new())
        .retry(retry())
        .transport(transport.clone())
        .build();
    let mut request = get();

    pipeline.send_blocking(&mut request).unwrap();

    let sent = transport.requests();
    assert_eq!(sent.len(), 2);
    let first = sent[0].header_str(CLIENT_REQUEST_ID).unwrap();
    assert_eq!(sent[1].header_str(CLIENT_REQUEST_ID), Some(first));
    assert_eq!(request.context().get::<RequestId>().map(|id| id.0.as_str()), Some(first));
}

#[test]
fn without_policies_transport_outcome_is_returned() {
    let transport = MockTransport::new()
        .then_status(StatusCode::NOT_FOUND)
        .then_fail(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
    let pipeline = Pipeline::builder().transport(transport.clone()).build();

    assert!(pipeline.stage_names().is_empty());
    assert_eq!(pipeline.send_blocking(&mut get()).unwrap().status(), StatusCode::NOT_FOUND);
    assert!(matches!(pipeline.send_blocking(&mut get()), Err(Error::Transport { .. })));
    assert_eq!(transport.request_count(), 2);
}

#[test]
fn send_blocking_drives_socket_transports() {
    let transport = FnTransport::new(|_: &Request| async {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let (connected, accepted) = tokio::join!(tokio::net::TcpStream::connect(address), listener.accept());
        drop(connected?);
        drop(accepted?);
        Ok::<_, Error>(Response::new(StatusCode::NO_CONTENT))
    });
    let pipeline = Pipeline::builder().retry(retry()).transport(transport).build();

    let response = pipeline.send_blocking(&mut get()).unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn send_blocking_inside_runtime_fails() {
    let transport = MockTransport::new();
    let pipeline = Pipeline::builder().transport(transport.clone()).build();

    let result = pipeline.send_blocking(&mut get());

    assert!(matches!(result, Err(Error::Runtime(_))));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn blocking_and_async_send_agree() {
    let transport = MockTransport::new()
        .then_status(StatusCode::TOO_MANY_REQUESTS)
        .then_status(StatusCode::ACCEPTED)
        .then_status(StatusCode::TOO_MANY_REQUESTS)
        .then_status(StatusCode::ACCEPTED);
    let pipeline = Pipeline::builder().retry(retry()).transport(transport.clone()).build();

    let async_status = pipeline.send(&mut get()).await.unwrap().status();
    let blocking = pipeline.clone();
    let blocking_status = tokio::task::spawn_blocking(move || blocking.send_blocking(&mut get()).map(|r| r.status()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(async_status, StatusCode::ACCEPTED);
    assert_eq!(blocking_status, async_status);
    assert_eq!(transport.request_count(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_share_pipeline() {
    let telemetry = InMemoryTelemetry::new();
    let transport = MockTransport::new();
    let pipeline = Pipeline::builder()
        .retry(retry())
        .instrumentation(
            InstrumentationPolicy::builder()
                .tracing_backend(telemetry.clone())
                .duration_recorder(telemetry.clone())
                .build()
                .unwrap(),
        )
        .transport(transport.clone())
        .build();

    let calls = (0..16).map(|_| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.send(&mut get()).await.map(|r| r.status()) })
    });

    for call in futures::future::join_all(calls).await {
        assert_eq!(call.unwrap().unwrap(), StatusCode::OK);
    }

    assert_eq!(transport.request_count(), 16);
    assert_eq!(telemetry.spans().len(), 16);
    assert_eq!(telemetry.measurements().len(), 16);

    let mut trace_ids: Vec<_> = telemetry.spans().iter().map(|s| s.span_context.trace_id()).collect();
    trace_ids.sort_unstable_by_key(|id| id.to_bytes());
    trace_ids.dedup();
    assert_eq!(trace_ids.len(), 16);
}

#[test]
fn custom_policy_can_short_circuit() {
    #[derive(Debug)]
    struct Reject;

    impl Policy for Reject {
        fn process<'a>(&'a self, _request: &'a mut Request, _next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
            async { Err(Error::invalid_request("rejected")) }.boxed()
        }
    }

    let transport = MockTransport::new();
    let pipeline = Pipeline::builder()
        .retry(retry())
        .policy(Reject)
        .transport(transport.clone())
        .build();

    let error = pipeline.send_blocking(&mut get()).unwrap_err();

    assert!(matches!(error, Error::InvalidRequest(_)));
    assert_eq!(transport.request_count(), 0);
}
