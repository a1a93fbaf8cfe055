// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics, ScopeMetrics};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use opentelemetry_sdk::trace::{InMemorySpanExporter, Sampler, SdkTracerProvider, SpanData};

/// Test helper for collecting and asserting on `OTel` spans.
///
/// Spans are exported synchronously when they end.
#[derive(Debug)]
pub struct SpanTester {
    exporter: InMemorySpanExporter,
    provider: SdkTracerProvider,
}

impl Default for SpanTester {
    fn default() -> Self {
        Self::new()
    }
}

impl SpanTester {
    /// Creates a tester that samples every span.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sampler(Sampler::AlwaysOn)
    }

    /// Creates a tester with a custom sampler.
    #[must_use]
    pub fn with_sampler(sampler: Sampler) -> Self {
        let exporter = InMemorySpanExporter::default();

        Self {
            provider: SdkTracerProvider::builder()
                .with_sampler(sampler)
                .with_simple_exporter(exporter.clone())
                .build(),
            exporter,
        }
    }

    /// The provider to hand to the code under test.
    #[must_use]
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    /// Returns the spans that ended so far.
    ///
    /// # Panics
    ///
    /// Panics if the exporter cannot be read.
    #[must_use]
    pub fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap()
    }
}

/// One histogram data point, flattened for assertions.
#[derive(Debug, Clone)]
pub struct HistogramPoint {
    /// Dimension attributes of the point.
    pub attributes: Vec<KeyValue>,
    /// Number of recorded samples.
    pub count: u64,
    /// Explicit bucket boundaries.
    pub bounds: Vec<f64>,
}

/// Test helper for collecting and asserting on `OTel` metrics.
#[derive(Debug)]
pub struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl Default for MetricTester {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricTester {
    /// Creates a tester with a periodic reader over an in-memory exporter.
    ///
    /// Nothing is exported until one of the inspection methods flushes the provider.
    #[must_use]
    pub fn new() -> Self {
        let in_memory = InMemoryMetricExporter::default();

        Self {
            exporter: in_memory.clone(),
            provider: SdkMeterProvider::builder().with_periodic_exporter(in_memory).build(),
        }
    }

    /// The provider to hand to the code under test.
    #[must_use]
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Flushes the provider and returns the unit of the metric named `name`.
    ///
    /// # Panics
    ///
    /// Panics if the provider cannot be flushed.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<String> {
        self.flush();
        self.with_metrics(|metric| (metric.name() == name).then(|| metric.unit().to_owned()))
            .into_iter()
            .next()
    }

    /// Flushes the provider and returns the data points of the `f64` histogram named `name`.
    ///
    /// # Panics
    ///
    /// Panics if the provider cannot be flushed.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Vec<HistogramPoint> {
        self.flush();
        self.with_metrics(|metric| {
            if metric.name() != name {
                return None;
            }

            match metric.data() {
                AggregatedMetrics::F64(MetricData::Histogram(data)) => Some(
                    data.data_points()
                        .map(|point| HistogramPoint {
                            attributes: point.attributes().cloned().collect(),
                            count: point.count(),
                            bounds: point.bounds().collect(),
                        })
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            }
        })
        .into_iter()
        .flatten()
        .collect()
    }

    /// Asserts that some data point of any metric carries all of `key_values`.
    ///
    /// # Panics
    ///
    /// Panics if an attribute is missing.
    pub fn assert_attributes_contain(&self, key_values: &[KeyValue]) {
        self.flush();
        let attributes: Vec<KeyValue> = self.with_metrics(|metric| Some(attributes_of(metric))).into_iter().flatten().collect();

        for attr in key_values {
            assert!(
                attributes.contains(attr),
                "attribute {attr:?} not found in collected attributes: {attributes:?}"
            );
        }
    }

    fn flush(&self) {
        self.provider.force_flush().unwrap();
    }

    // Every flush exports a full cumulative snapshot, so only the latest one is inspected.
    fn with_metrics<T>(&self, f: impl Fn(&Metric) -> Option<T>) -> Vec<T> {
        self.exporter
            .get_finished_metrics()
            .unwrap()
            .last()
            .into_iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .filter_map(f)
            .collect()
    }
}

fn attributes_of(metric: &Metric) -> Vec<KeyValue> {
    match metric.data() {
        AggregatedMetrics::F64(MetricData::Histogram(data)) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
        AggregatedMetrics::F64(MetricData::Sum(data)) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
        AggregatedMetrics::U64(MetricData::Sum(data)) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
        AggregatedMetrics::I64(MetricData::Sum(data)) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry::trace::{Tracer, TracerProvider};

    use super::*;

    #[test]
    fn records_spans() {
        let tester = SpanTester::new();

        tester.tracer_provider().tracer("test").in_span("work", |_| {});

        assert_eq!(tester.spans().len(), 1);
        assert_eq!(tester.spans()[0].name, "work");
    }

    #[test]
    fn always_off_records_nothing() {
        let tester = SpanTester::with_sampler(Sampler::AlwaysOff);

        tester.tracer_provider().tracer("test").in_span("work", |_| {});

        assert!(tester.spans().is_empty());
    }

    #[test]
    fn records_histograms() {
        let tester = MetricTester::new();
        let histogram = tester.meter_provider().meter("test").f64_histogram("latency").with_unit("s").build();

        histogram.record(0.5, &[KeyValue::new("key", "value")]);

        let points = tester.histogram("latency");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].count, 1);
        assert_eq!(tester.unit("latency").as_deref(), Some("s"));
        tester.assert_attributes_contain(&[KeyValue::new("key", "value")]);
    }
}
