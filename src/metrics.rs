use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics exporter
///
/// Panics if a global recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    init_metric_descriptions();

    handle
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "logs_ingested_total",
        "Total number of log records accepted, by ingestion source"
    );
    describe_counter!(
        "logs_flushed_total",
        "Total number of buffered drain records written to storage"
    );
    describe_counter!(
        "log_flush_errors_total",
        "Total number of failed buffer flushes"
    );
    describe_histogram!(
        "log_flush_duration_seconds",
        "Buffer flush duration in seconds"
    );
    describe_gauge!(
        "log_buffer_size",
        "Number of drain records waiting to be flushed"
    );
    describe_gauge!("logvault_info", "Version and build information");

    gauge!("logvault_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record accepted records for an ingestion source (`otlp`, `syslog`)
pub fn record_ingested(source: &'static str, count: usize) {
    counter!("logs_ingested_total", "source" => source).increment(count as u64);
}

/// Record a successful buffer flush
pub fn record_flush(count: usize, duration: Duration) {
    counter!("logs_flushed_total").increment(count as u64);
    histogram!("log_flush_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_flush_error() {
    counter!("log_flush_errors_total").increment(1);
}

pub fn record_buffer_size(size: usize) {
    gauge!("log_buffer_size").set(size as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        init_metric_descriptions();

        record_ingested("otlp", 3);
        record_ingested("syslog", 1);
        record_flush(10, Duration::from_millis(12));
        record_flush_error();
        record_buffer_size(4);
    }

    #[test]
    fn test_recorded_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_ingested("otlp", 2);
            record_flush(5, Duration::from_millis(3));
        });

        let output = handle.render();
        assert!(output.contains("logs_ingested_total{source=\"otlp\"} 2"));
        assert!(output.contains("logs_flushed_total 5"));
    }
}
