// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::instrumentation::InstrumentationPolicy;
use crate::logging::LoggingPolicy;
use crate::retry::RetryPolicy;
use crate::{Error, Next, Policy, PolicyPosition, Request, Response, Result, Transport};

/// An immutable chain of policies ending in a [`Transport`].
///
/// A pipeline is built once and then shared: it is cheap to clone and can serve any number of
/// concurrent calls. Each call runs the stages in this order, outermost first:
///
/// 1. per-call policies
/// 2. [`RetryPolicy`]
/// 3. per-retry policies
/// 4. before-instrumentation policies
/// 5. [`InstrumentationPolicy`]
/// 6. after-instrumentation policies
/// 7. [`LoggingPolicy`]
/// 8. the transport
///
/// Stages that were not configured are skipped. The pipeline itself never retries and never
/// converts errors; whatever the outermost stage returns is returned to the caller.
///
/// # Examples
///
/// ```
/// use http::{Method, StatusCode};
/// use http_pipeline::retry::RetryPolicy;
/// use http_pipeline::{FnTransport, Pipeline, Request, Response};
///
/// let pipeline = Pipeline::builder()
///     .retry(RetryPolicy::default())
///     .transport(FnTransport::new(|_: &Request| async { Ok(Response::new(StatusCode::OK)) }))
///     .build();
///
/// let mut request = Request::new(Method::GET, "https://example.com")?;
/// let response = pipeline.send_blocking(&mut request)?;
///
/// assert_eq!(response.status(), StatusCode::OK);
/// # Ok::<(), http_pipeline::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Pipeline {
    stages: Arc<[Stage]>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder<NotSet> {
        PipelineBuilder::new()
    }

    /// Sends `request` through every stage and the transport.
    ///
    /// The request is modified in place by the policies, so after the call it reflects what
    /// was sent on the last attempt.
    ///
    /// # Errors
    ///
    /// Returns whatever error the stages or the transport produced for the last attempt.
    pub async fn send(&self, request: &mut Request) -> Result<Response> {
        Next::new(&self.stages, self.transport.as_ref()).process(request).await
    }

    /// Sends `request` and blocks the current thread until the call completes.
    ///
    /// The call runs the same stages as [`send`][Self::send] on a private single-threaded
    /// runtime that lives for the duration of the call. The runtime has the I/O and time
    /// drivers enabled, so transports built on Tokio sockets work unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if called from within an async runtime or if the private
    /// runtime cannot be created, otherwise the same errors as [`send`][Self::send].
    pub fn send_blocking(&self, request: &mut Request) -> Result<Response> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::Runtime(std::io::Error::other(
                "send_blocking must not be called from within an async runtime",
            )));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        runtime.block_on(self.send(request))
    }

    /// Names of the configured stages, outermost first. The transport is not included.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }
}

/// A flag indicating that the transport has not been configured yet.
#[non_exhaustive]
#[derive(Debug)]
#[doc(hidden)]
pub struct NotSet;

/// A flag indicating that the transport has been configured.
#[derive(Debug)]
#[doc(hidden)]
pub struct Set {
    transport: Arc<dyn Transport>,
}

/// Builder for [`Pipeline`].
///
/// Created by [`Pipeline::builder`]. The builder only offers [`build`][Self::build] once a
/// transport has been supplied, so a pipeline without a transport does not compile.
#[derive(Debug)]
pub struct PipelineBuilder<S = Set> {
    per_call: Vec<Arc<dyn Policy>>,
    retry: Option<RetryPolicy>,
    per_retry: Vec<Arc<dyn Policy>>,
    before_instrumentation: Vec<Arc<dyn Policy>>,
    instrumentation: Option<InstrumentationPolicy>,
    after_instrumentation: Vec<Arc<dyn Policy>>,
    logging: Option<LoggingPolicy>,
    state: S,
}

impl PipelineBuilder<NotSet> {
    fn new() -> Self {
        Self {
            per_call: Vec::new(),
            retry: None,
            per_retry: Vec::new(),
            before_instrumentation: Vec::new(),
            instrumentation: None,
            after_instrumentation: Vec::new(),
            logging: None,
            state: NotSet,
        }
    }
}

impl<S> PipelineBuilder<S> {
    /// Adds a policy at the position it reports through [`Policy::position`].
    #[must_use]
    pub fn policy(self, policy: impl Policy + 'static) -> Self {
        self.policy_arc(Arc::new(policy))
    }

    /// Adds a shared policy at the position it reports through [`Policy::position`].
    #[must_use]
    pub fn policy_arc(mut self, policy: Arc<dyn Policy>) -> Self {
        match policy.position() {
            PolicyPosition::PerCall => self.per_call.push(policy),
            PolicyPosition::PerRetry => self.per_retry.push(policy),
            PolicyPosition::BeforeInstrumentation => self.before_instrumentation.push(policy),
            PolicyPosition::AfterInstrumentation => self.after_instrumentation.push(policy),
        }
        self
    }

    /// Adds a policy that runs once per call, regardless of its reported position.
    #[must_use]
    pub fn per_call(mut self, policy: impl Policy + 'static) -> Self {
        self.per_call.push(Arc::new(policy));
        self
    }

    /// Adds a policy that runs once per attempt, regardless of its reported position.
    #[must_use]
    pub fn per_retry(mut self, policy: impl Policy + 'static) -> Self {
        self.per_retry.push(Arc::new(policy));
        self
    }

    /// Sets the retry policy. A later call replaces an earlier one.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the instrumentation policy. A later call replaces an earlier one.
    #[must_use]
    pub fn instrumentation(mut self, instrumentation: InstrumentationPolicy) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    /// Sets the logging policy. A later call replaces an earlier one.
    #[must_use]
    pub fn logging(mut self, logging: LoggingPolicy) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Sets the transport that terminates the pipeline.
    #[must_use]
    pub fn transport(self, transport: impl Transport + 'static) -> PipelineBuilder<Set> {
        self.transport_arc(Arc::new(transport))
    }

    /// Sets a shared transport that terminates the pipeline.
    #[must_use]
    pub fn transport_arc(self, transport: Arc<dyn Transport>) -> PipelineBuilder<Set> {
        PipelineBuilder {
            per_call: self.per_call,
            retry: self.retry,
            per_retry: self.per_retry,
            before_instrumentation: self.before_instrumentation,
            instrumentation: self.instrumentation,
            after_instrumentation: self.after_instrumentation,
            logging: self.logging,
            state: Set { transport },
        }
    }
}

impl PipelineBuilder<Set> {
    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let stages = self
            .per_call
            .into_iter()
            .map(Stage::Custom)
            .chain(self.retry.map(Stage::Retry))
            .chain(self.per_retry.into_iter().map(Stage::Custom))
            .chain(self.before_instrumentation.into_iter().map(Stage::Custom))
            .chain(self.instrumentation.map(Stage::Instrumentation))
            .chain(self.after_instrumentation.into_iter().map(Stage::Custom))
            .chain(self.logging.map(Stage::Logging))
            .collect();

        Pipeline {
            stages,
            transport: self.state.transport,
        }
    }
}

/// One link of the chain. Built-in stages are distinct variants rather than trait objects.
#[derive(Debug)]
pub(crate) enum Stage {
    Custom(Arc<dyn Policy>),
    Retry(RetryPolicy),
    Instrumentation(InstrumentationPolicy),
    Logging(LoggingPolicy),
}

impl Stage {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Custom(policy) => policy.name(),
            Self::Retry(_) => "retry",
            Self::Instrumentation(_) => "instrumentation",
            Self::Logging(_) => "logging",
        }
    }

    pub(crate) fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        match self {
            Self::Custom(policy) => policy.process(request, next),
            Self::Retry(retry) => retry.process(request, next),
            Self::Instrumentation(instrumentation) => instrumentation.process(request, next),
            Self::Logging(logging) => logging.process(request, next),
        }
    }
}
