//! Import metrics.
//!
//! Counters go through the `metrics` facade. The importer is a short-lived batch job, so instead
//! of serving a scrape endpoint the Prometheus recorder is installed in-process and rendered to a
//! text snapshot at the end of a run.

use std::path::Path;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

use crate::types::Table;

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Metric names follow `kinesin_{phase}_{name}_total`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("kinesin_", $phase, "_", $name, "_total")
    };
}

/// Install the Prometheus recorder. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("METRICS: recorder handle already stored");
                }
                info!("Prometheus recorder installed");
            }
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    });
}

/// Current snapshot in Prometheus text format, if the recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Write the snapshot next to the import log
pub fn write_snapshot(path: &Path) -> std::io::Result<bool> {
    match render() {
        Some(text) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Counters for the extraction phase
pub struct ExtractMetrics;

impl ExtractMetrics {
    pub fn record_extracted(source: &str, records: usize) {
        metrics::counter!(phase_metric!(counter, "extract", "records"), "source" => source.to_string())
            .increment(records as u64);
    }

    pub fn record_rejected(source: &str, rows: usize) {
        metrics::counter!(phase_metric!(counter, "extract", "rejected_rows"), "source" => source.to_string())
            .increment(rows as u64);
    }

    pub fn record_source_failed(source: &str) {
        metrics::counter!(phase_metric!(counter, "extract", "source_failures"), "source" => source.to_string())
            .increment(1);
    }
}

/// Counters for the write phase
pub struct WriteMetrics;

impl WriteMetrics {
    pub fn record_rows(table: Table, source: &str, outcome: &'static str, rows: usize) {
        if rows == 0 {
            return;
        }
        metrics::counter!(
            phase_metric!(counter, "write", "rows"),
            "table" => table.to_string(),
            "source" => source.to_string(),
            "outcome" => outcome
        )
        .increment(rows as u64);
    }

    pub fn record_batch_failed(table: Table, source: &str) {
        metrics::counter!(
            phase_metric!(counter, "write", "batch_failures"),
            "table" => table.to_string(),
            "source" => source.to_string()
        )
        .increment(1);
    }
}

/// Whole-run counters
pub struct RunMetrics;

impl RunMetrics {
    pub fn record_run(duration_secs: f64, failures: usize) {
        metrics::counter!(phase_metric!(counter, "run", "runs")).increment(1);
        metrics::histogram!("kinesin_run_duration_seconds").record(duration_secs);
        if failures > 0 {
            metrics::counter!(phase_metric!(counter, "run", "failures")).increment(failures as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_metric_names() {
        assert_eq!(phase_metric!(counter, "write", "rows"), "kinesin_write_rows_total");
    }

    #[test]
    fn test_counters_are_safe_without_recorder() {
        super::WriteMetrics::record_rows(crate::types::Table::Impact, "VEP", "inserted", 3);
        super::ExtractMetrics::record_rejected("VEP", 1);
    }
}
