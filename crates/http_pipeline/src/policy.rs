// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Formatter};

use futures::future::BoxFuture;

use crate::pipeline::Stage;
use crate::{Request, Response, Result, Transport};

/// Where a custom [`Policy`] runs relative to the built-in stages.
///
/// Stages run outermost first in this order: per-call policies, retry, per-retry policies,
/// before-instrumentation policies, instrumentation, after-instrumentation policies, logging
/// and finally the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PolicyPosition {
    /// Runs once per logical call, outside the retry loop.
    PerCall,
    /// Runs once per attempt, inside the retry loop.
    #[default]
    PerRetry,
    /// Runs once per attempt, just outside the instrumentation span.
    BeforeInstrumentation,
    /// Runs once per attempt, inside the instrumentation span.
    AfterInstrumentation,
}

/// A unit of request processing in a [`Pipeline`][crate::Pipeline].
///
/// A policy receives the request and a [`Next`] handle on the rest of the chain. It may modify
/// the request, call `next` zero or more times and inspect or replace the outcome. Policies are
/// shared between concurrent calls and must not keep per-request state in `self`.
///
/// # Examples
///
/// ```
/// use futures::future::BoxFuture;
/// use http::HeaderValue;
/// use http::header::HeaderName;
/// use http_pipeline::{Next, Policy, PolicyPosition, Request, Response, Result};
///
/// #[derive(Debug)]
/// struct Tenant(HeaderValue);
///
/// impl Policy for Tenant {
///     fn position(&self) -> PolicyPosition {
///         PolicyPosition::PerCall
///     }
///
///     fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
///         request.insert_header(HeaderName::from_static("x-tenant"), self.0.clone());
///         next.process(request)
///     }
/// }
/// ```
pub trait Policy: Send + Sync + Debug {
    /// Name used in diagnostics such as [`Pipeline::stage_names`][crate::Pipeline::stage_names].
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Where the policy is placed when added through
    /// [`PipelineBuilder::policy`][crate::PipelineBuilder::policy].
    fn position(&self) -> PolicyPosition {
        PolicyPosition::PerRetry
    }

    /// Processes `request`, usually by delegating to `next`.
    fn process<'a>(&'a self, request: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>>;
}

/// The remainder of the chain after the current stage.
///
/// `Next` is `Copy`, so a policy can invoke it more than once. Each invocation runs every
/// remaining stage and the transport again.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Stage],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Stage], transport: &'a dyn Transport) -> Self {
        Self { stages, transport }
    }

    /// Runs the rest of the chain for `request`.
    pub fn process<'r>(self, request: &'r mut Request) -> BoxFuture<'r, Result<Response>>
    where
        'a: 'r,
    {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.process(request, Next::new(rest, self.transport)),
            None => self.transport.send(request),
        }
    }

    /// Number of stages left before the transport.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

impl Debug for Next<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("stages", &self.stages.iter().map(Stage::name).collect::<Vec<_>>())
            .field("transport", &self.transport)
            .finish()
    }
}
