//! Pipeline run metrics
//!
//! Counters and histograms describing pipeline runs, recorded through the
//! `metrics` facade. Nothing is exported unless a recorder is installed,
//! see [`init_metrics_exporter`].
//!
//! # Metrics
//!
//! - `pipeline_runs_total`: Counter of finished runs by adapter and outcome
//! - `pipeline_run_duration_seconds`: Histogram of run duration
//! - `pipeline_runs_active`: Gauge of runs in progress
//! - `pipeline_workflows_total`: Counter of workflows by outcome
//!   (`executed`, `filtered`, `failed`)
//!
//! # Examples
//!
//! ```
//! use eventpipe::metrics::{RunMetrics, WorkflowOutcome};
//!
//! let metrics = RunMetrics::start("AdapterV1");
//! metrics.record_workflow(WorkflowOutcome::Executed);
//! metrics.record_success();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use metrics::{decrement_gauge, histogram, increment_counter, increment_gauge};

/// What happened to a single workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Every filter allowed the event and the handler ran
    Executed,
    /// A filter denied the event
    Filtered,
    /// Filtering, mutation or handling failed
    Failed,
}

impl WorkflowOutcome {
    /// Label value used for the `outcome` label
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowOutcome::Executed => "executed",
            WorkflowOutcome::Filtered => "filtered",
            WorkflowOutcome::Failed => "failed",
        }
    }
}

/// Metrics for one pipeline run
///
/// The outcome is recorded once; later calls are ignored. Dropping an
/// unrecorded tracker, for instance when the run future is cancelled,
/// still releases the active gauge.
#[derive(Debug)]
pub struct RunMetrics {
    adapter: String,
    start: Instant,
    recorded: AtomicBool,
}

impl RunMetrics {
    /// Start tracking a run executed by the named pipeline adapter
    pub fn start(adapter: impl Into<String>) -> Self {
        let adapter = adapter.into();
        increment_gauge!("pipeline_runs_active", 1.0, "adapter" => adapter.clone());
        Self {
            adapter,
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    /// Count one workflow outcome
    pub fn record_workflow(&self, outcome: WorkflowOutcome) {
        increment_counter!(
            "pipeline_workflows_total",
            "adapter" => self.adapter.clone(),
            "outcome" => outcome.as_str()
        );
    }

    /// Record a run that returned `Ok`
    pub fn record_success(&self) {
        self.finish("success");
    }

    /// Record a run that returned an error
    pub fn record_failure(&self) {
        self.finish("failure");
    }

    /// Record a run aborted by cancellation
    pub fn record_cancelled(&self) {
        self.finish("cancelled");
    }

    /// Adapter the run belongs to
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// Time since the run started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn finish(&self, outcome: &'static str) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "pipeline_run_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "adapter" => self.adapter.clone(),
            "outcome" => outcome
        );
        increment_counter!(
            "pipeline_runs_total",
            "adapter" => self.adapter.clone(),
            "outcome" => outcome
        );
        decrement_gauge!("pipeline_runs_active", 1.0, "adapter" => self.adapter.clone());
    }

    #[cfg(test)]
    fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::SeqCst)
    }
}

impl Drop for RunMetrics {
    fn drop(&mut self) {
        if !self.recorded.load(Ordering::SeqCst) {
            decrement_gauge!("pipeline_runs_active", 1.0, "adapter" => self.adapter.clone());
        }
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// Only has an effect when compiled with the `prometheus` feature; it is
/// always safe to call.
///
/// # Examples
///
/// ```
/// use eventpipe::metrics::init_metrics_exporter;
///
/// init_metrics_exporter();
/// ```
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}
