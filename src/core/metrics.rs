use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;
use crate::db::types::SubmissionStatus;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_grading_job(status: SubmissionStatus, elapsed: Duration) {
    metrics::counter!("grading_jobs_total", "status" => status.as_str()).increment(1);
    metrics::histogram!("grading_duration_seconds").record(elapsed.as_secs_f64());
}

pub(crate) fn record_oracle_request(outcome: &'static str) {
    metrics::counter!("oracle_requests_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_grading_fallback() {
    metrics::counter!("grading_fallbacks_total").increment(1);
}

pub(crate) fn record_text_extraction(outcome: &'static str) {
    metrics::counter!("text_extraction_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_http_request(status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    metrics::counter!("http_requests_total", "status" => status_label.clone()).increment(1);
    metrics::histogram!("http_request_duration_seconds", "status" => status_label)
        .record(elapsed.as_secs_f64());
}

pub(crate) fn record_stale_failures(count: u64) {
    metrics::counter!("grading_stale_failures_total").increment(count);
}
