// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resending requests whose outcome is transient.
//!
//! The [`RetryPolicy`] sits between the per-call and the per-retry policies. It runs the rest
//! of the pipeline once per attempt and records how many times the request was resent in the
//! request context as a [`ResendCount`][crate::ResendCount]. Each retry is logged as a
//! `http_pipeline.retry` warning event.
//!
//! Delays between attempts follow the configured [`Backoff`], optionally with jitter, and are
//! capped by the maximum delay. Classification is pluggable through
//! [`RetryPolicy::recovery_with`]; the default implementation is the [`Recovery`] trait on
//! `Result<Response>`.

mod attempt;
mod backoff;
mod options;
mod policy;
mod recovery;

pub use attempt::Attempt;
pub use backoff::Backoff;
pub use options::RetryOptions;
pub use policy::RetryPolicy;
pub use recovery::{Recovery, RecoveryInfo, RecoveryKind, retry_after};
