// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-attempt tracing spans and duration metrics.
//!
//! The [`InstrumentationPolicy`] records one span and one `http.client.request.duration`
//! sample per attempt. Query values in `url.full` are redacted unless their parameter is
//! allow-listed in [`InstrumentationOptions`].
//!
//! # Attributes
//!
//! | Attribute | Span | Metric | When |
//! |-----------|------|--------|------|
//! | `http.request.method` | yes | yes | always |
//! | `url.full` | yes | yes | always, redacted |
//! | `server.address` | yes | yes | always |
//! | `server.port` | yes | yes | always, scheme default if not explicit |
//! | `user_agent.original` | yes | yes | request has a `user-agent` header |
//! | `http.response.status_code` | yes | yes | a response was received |
//! | `error.type` | yes | yes | status >= 400, error or cancellation |
//! | `http.request.resend_count` | yes | no | retried attempts |
//!
//! Configured header-to-attribute maps add further attributes when the headers are present.

pub mod attributes;
mod options;
mod policy;
mod redaction;

pub use options::InstrumentationOptions;
pub use policy::{InstrumentationPolicy, InstrumentationPolicyBuilder};
pub use redaction::{REDACTED, redact_query, redact_url};
