//! Prometheus exposition of pipeline stage metrics.
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use postback::{CounterReport, PipelineMetrics, PostbackError, WriteOutcome};

/// Forwards pipeline observations to the global `metrics` recorder.
#[derive(Debug, Default)]
pub struct StageMetrics;

impl PipelineMetrics for StageMetrics {
    fn record_validation(&self, latency: Duration, valid: bool) {
        let result = if valid { "valid" } else { "invalid" };
        counter!("postback_validations_total", "result" => result).increment(1);
        histogram!("postback_validation_seconds").record(latency.as_secs_f64());
    }

    fn record_write(&self, latency: Duration, result: Result<&WriteOutcome, &PostbackError>) {
        let result = match result {
            Ok(outcome) if outcome.idempotent => "keyed",
            Ok(_) => "appended",
            Err(err) => err.kind(),
        };
        counter!("postback_writes_total", "result" => result).increment(1);
        histogram!("postback_write_seconds").record(latency.as_secs_f64());
    }

    fn record_counters(&self, latency: Duration, report: &CounterReport) {
        for (collection, status) in &report.mirrors {
            let result = if status.is_ok() { "updated" } else { "failed" };
            counter!(
                "postback_counter_updates_total",
                "collection" => collection.clone(),
                "result" => result
            )
            .increment(1);
        }
        histogram!("postback_counter_update_seconds").record(latency.as_secs_f64());
    }
}

/// Installs the Prometheus recorder and the pipeline observer.
pub fn install() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    postback::set_pipeline_metrics(Some(std::sync::Arc::new(StageMetrics)));
    Ok(handle)
}
