use once_cell::sync::Lazy;
use opentelemetry::{
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::time::Duration;

pub static METRICS: Lazy<PrefetchMetrics> = Lazy::new(PrefetchMetrics::init);

pub struct PrefetchMetrics {
    registry: Registry,
    _provider: SdkMeterProvider,
    pub statements_total: Counter<u64>,
    pub statement_errors_total: Counter<u64>,
    pub statement_duration: Histogram<f64>,
    pub instances_hydrated: Counter<u64>,
    pub batches_skipped: Counter<u64>,
    pub connect_duration: Histogram<f64>,
    pub connect_errors_total: Counter<u64>,
}

impl PrefetchMetrics {
    pub fn init() -> Self {
        let registry = Registry::new();
        let provider = match opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
        {
            Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
            Err(e) => {
                log::warn!("prometheus exporter unavailable, prefetch metrics are not exported: {e}");
                SdkMeterProvider::builder().build()
            }
        };
        let meter = provider.meter("lifeguard_prefetch");

        let statements_total = meter
            .u64_counter("prefetch_statements_total")
            .with_description("Statements issued by prefetch queries")
            .build();

        let statement_errors_total = meter
            .u64_counter("prefetch_statement_errors_total")
            .with_description("Prefetch statements that failed in the store")
            .build();

        let statement_duration = meter
            .f64_histogram("prefetch_statement_duration_seconds")
            .with_description("Duration of prefetch statements")
            .build();

        let instances_hydrated = meter
            .u64_counter("prefetch_instances_hydrated_total")
            .with_description("Distinct entity instances materialized")
            .build();

        let batches_skipped = meter
            .u64_counter("prefetch_batches_skipped_total")
            .with_description("To-many levels skipped for lack of owners")
            .build();

        let connect_duration = meter
            .f64_histogram("prefetch_connect_duration_seconds")
            .with_description("Time spent opening PostgreSQL connections")
            .build();

        let connect_errors_total = meter
            .u64_counter("prefetch_connect_errors_total")
            .with_description("PostgreSQL connections that could not be opened")
            .build();

        Self {
            registry,
            _provider: provider,
            statements_total,
            statement_errors_total,
            statement_duration,
            instances_hydrated,
            batches_skipped,
            connect_duration,
            connect_errors_total,
        }
    }

    /// `kind` is `root` or `batch`.
    pub fn record_statement(&self, kind: &'static str, elapsed: Duration, ok: bool) {
        let attrs = [KeyValue::new("kind", kind)];
        self.statements_total.add(1, &attrs);
        self.statement_duration.record(elapsed.as_secs_f64(), &attrs);
        if !ok {
            self.statement_errors_total.add(1, &attrs);
        }
    }

    pub fn record_hydrated(&self, instances: usize) {
        self.instances_hydrated.add(instances as u64, &[]);
    }

    pub fn record_skipped_batch(&self) {
        self.batches_skipped.add(1, &[]);
    }

    pub fn record_connect(&self, elapsed: Duration, ok: bool) {
        self.connect_duration.record(elapsed.as_secs_f64(), &[]);
        if !ok {
            self.connect_errors_total.add(1, &[]);
        }
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            log::warn!("failed to encode prefetch metrics: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_show_up_in_rendered_output() {
        METRICS.record_statement("root", Duration::from_millis(3), true);
        METRICS.record_statement("batch", Duration::from_millis(1), false);
        METRICS.record_hydrated(4);
        let text = METRICS.render();
        assert!(text.contains("prefetch_statements"));
    }

    #[test]
    fn test_connect_attempts_are_recorded() {
        METRICS.record_connect(Duration::from_millis(12), true);
        METRICS.record_connect(Duration::from_millis(40), false);
        let text = METRICS.render();
        assert!(text.contains("prefetch_connect_duration_seconds"));
        assert!(text.contains("prefetch_connect_errors_total"));
    }
}
