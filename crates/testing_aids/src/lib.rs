// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.
//!
//! - [`LogCapture`] collects `tracing` output so tests can assert on log events.
//! - [`SpanTester`] and [`MetricTester`] wire the OpenTelemetry SDK to in-memory exporters.

mod log;
mod otel;

pub use log::*;
pub use otel::*;
