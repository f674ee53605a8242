//! Stage metrics for the feature pipeline.
//!
//! Every stage records through the functions below. Without an installed
//! recorder the `metrics` macros are no-ops, so library users pay nothing.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Enum representing all metric names used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Loader
    LoaderRowsLoaded,
    LoaderEncodingFallbacks,

    // Classifier
    ClassifierOrderHeaders,
    ClassifierCheckSteps,
    ClassifierUnclassified,

    // Linker
    LinkerOrders,
    LinkerLinkedChecks,
    LinkerOrphanChecks,

    // Origin filter
    OriginFilterChecksSeen,
    OriginFilterAutomatedRemoved,

    // Pivot
    PivotColumnsCreated,
    PivotDuplicateExecutions,
    PivotNameCollisions,

    // Features
    FeaturesOrdersDerived,
    FeaturesHighValueOrders,

    // Quality gate
    QualityGateDecisions,
    QualityGateIssues,

    // Output
    OutputBytesWritten,
    PipelineDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::LoaderRowsLoaded => "rof_loader_rows_loaded_total",
            MetricName::LoaderEncodingFallbacks => "rof_loader_encoding_fallbacks_total",
            MetricName::ClassifierOrderHeaders => "rof_classifier_order_headers_total",
            MetricName::ClassifierCheckSteps => "rof_classifier_check_steps_total",
            MetricName::ClassifierUnclassified => "rof_classifier_unclassified_total",
            MetricName::LinkerOrders => "rof_linker_orders_total",
            MetricName::LinkerLinkedChecks => "rof_linker_linked_checks_total",
            MetricName::LinkerOrphanChecks => "rof_linker_orphan_checks_total",
            MetricName::OriginFilterChecksSeen => "rof_origin_filter_checks_seen_total",
            MetricName::OriginFilterAutomatedRemoved => "rof_origin_filter_automated_removed_total",
            MetricName::PivotColumnsCreated => "rof_pivot_columns_created",
            MetricName::PivotDuplicateExecutions => "rof_pivot_duplicate_executions_total",
            MetricName::PivotNameCollisions => "rof_pivot_name_collisions_total",
            MetricName::FeaturesOrdersDerived => "rof_features_orders_derived_total",
            MetricName::FeaturesHighValueOrders => "rof_features_high_value_orders",
            MetricName::QualityGateDecisions => "rof_quality_gate_decisions_total",
            MetricName::QualityGateIssues => "rof_quality_gate_issues",
            MetricName::OutputBytesWritten => "rof_output_bytes_written_total",
            MetricName::PipelineDuration => "rof_pipeline_duration_seconds",
        }
    }

    /// Every metric, in stage order.
    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            LoaderRowsLoaded,
            LoaderEncodingFallbacks,
            ClassifierOrderHeaders,
            ClassifierCheckSteps,
            ClassifierUnclassified,
            LinkerOrders,
            LinkerLinkedChecks,
            LinkerOrphanChecks,
            OriginFilterChecksSeen,
            OriginFilterAutomatedRemoved,
            PivotColumnsCreated,
            PivotDuplicateExecutions,
            PivotNameCollisions,
            FeaturesOrdersDerived,
            FeaturesHighValueOrders,
            QualityGateDecisions,
            QualityGateIssues,
            OutputBytesWritten,
            PipelineDuration,
        ]
        .into_iter()
    }

    /// Returns (stage, description)
    pub fn metadata(&self) -> (&'static str, &'static str) {
        match self {
            MetricName::LoaderRowsLoaded => ("loader", "Data rows read from the export"),
            MetricName::LoaderEncodingFallbacks => ("loader", "Exports decoded as Latin-1"),
            MetricName::ClassifierOrderHeaders => ("classifier", "Rows classified as order headers"),
            MetricName::ClassifierCheckSteps => ("classifier", "Rows classified as check steps"),
            MetricName::ClassifierUnclassified => ("classifier", "Rows dropped as unclassified"),
            MetricName::LinkerOrders => ("linker", "Distinct orders built"),
            MetricName::LinkerLinkedChecks => ("linker", "Check steps linked to an order"),
            MetricName::LinkerOrphanChecks => ("linker", "Check steps without a matching order"),
            MetricName::OriginFilterChecksSeen => ("origin_filter", "Check steps seen by the filter"),
            MetricName::OriginFilterAutomatedRemoved => ("origin_filter", "Automated check steps removed"),
            MetricName::PivotColumnsCreated => ("pivot", "Check columns in the last run"),
            MetricName::PivotDuplicateExecutions => ("pivot", "Repeated check executions resolved"),
            MetricName::PivotNameCollisions => ("pivot", "Check names sharing an identifier"),
            MetricName::FeaturesOrdersDerived => ("features", "Orders with derived features"),
            MetricName::FeaturesHighValueOrders => ("features", "Orders above the high-value fence"),
            MetricName::QualityGateDecisions => ("quality_gate", "Quality gate decisions"),
            MetricName::QualityGateIssues => ("quality_gate", "Issue kinds found in the last run"),
            MetricName::OutputBytesWritten => ("output", "Bytes written to output files"),
            MetricName::PipelineDuration => ("pipeline", "End-to-end run duration"),
        }
    }
}

/// Register help text for every metric with the installed recorder.
fn describe_all() {
    for metric in MetricName::all_metrics() {
        let (_, description) = metric.metadata();
        match metric {
            MetricName::PivotColumnsCreated | MetricName::FeaturesHighValueOrders | MetricName::QualityGateIssues => {
                ::metrics::describe_gauge!(metric.as_str(), description)
            }
            MetricName::PipelineDuration => ::metrics::describe_histogram!(metric.as_str(), description),
            _ => ::metrics::describe_counter!(metric.as_str(), description),
        }
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it twice is harmless.
pub fn init() -> Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| PipelineError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    let _ = METRICS_HANDLE.set(handle);
    describe_all();
    info!("Metrics recorder installed");
    Ok(())
}

/// Prometheus text exposition of everything recorded so far.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|h| h.render())
}

/// Write the current exposition to `path`. No-op without a recorder.
pub fn write_to_file(path: &Path) -> Result<()> {
    if let Some(text) = render() {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, text)?;
        info!("Wrote metrics to {}", path.display());
    }
    Ok(())
}

pub mod loader {
    use super::MetricName;

    pub fn rows_loaded(rows: usize) {
        ::metrics::counter!(MetricName::LoaderRowsLoaded.as_str()).increment(rows as u64);
    }

    pub fn encoding_fallback() {
        ::metrics::counter!(MetricName::LoaderEncodingFallbacks.as_str()).increment(1);
    }
}

pub mod classifier {
    use super::MetricName;

    pub fn rows_classified(order_headers: usize, check_steps: usize, unclassified: usize) {
        ::metrics::counter!(MetricName::ClassifierOrderHeaders.as_str()).increment(order_headers as u64);
        ::metrics::counter!(MetricName::ClassifierCheckSteps.as_str()).increment(check_steps as u64);
        ::metrics::counter!(MetricName::ClassifierUnclassified.as_str()).increment(unclassified as u64);
    }
}

pub mod linker {
    use super::MetricName;

    pub fn linked(orders: usize, linked_checks: usize, orphans: usize) {
        ::metrics::counter!(MetricName::LinkerOrders.as_str()).increment(orders as u64);
        ::metrics::counter!(MetricName::LinkerLinkedChecks.as_str()).increment(linked_checks as u64);
        ::metrics::counter!(MetricName::LinkerOrphanChecks.as_str()).increment(orphans as u64);
    }
}

pub mod origin_filter {
    use super::MetricName;

    pub fn filtered(total: usize, removed: usize) {
        ::metrics::counter!(MetricName::OriginFilterChecksSeen.as_str()).increment(total as u64);
        ::metrics::counter!(MetricName::OriginFilterAutomatedRemoved.as_str()).increment(removed as u64);
    }
}

pub mod pivot {
    use super::MetricName;

    pub fn pivoted(columns: usize, duplicate_executions: usize, collisions: usize) {
        ::metrics::gauge!(MetricName::PivotColumnsCreated.as_str()).set(columns as f64);
        ::metrics::counter!(MetricName::PivotDuplicateExecutions.as_str()).increment(duplicate_executions as u64);
        ::metrics::counter!(MetricName::PivotNameCollisions.as_str()).increment(collisions as u64);
    }
}

pub mod features {
    use super::MetricName;

    pub fn derived(orders: usize, high_value: usize) {
        ::metrics::counter!(MetricName::FeaturesOrdersDerived.as_str()).increment(orders as u64);
        ::metrics::gauge!(MetricName::FeaturesHighValueOrders.as_str()).set(high_value as f64);
    }
}

pub mod quality_gate {
    use super::MetricName;
    use crate::pipeline::processing::quality_gate::QualityDecision;

    pub fn decision(decision: QualityDecision, issues: usize) {
        ::metrics::counter!(
            MetricName::QualityGateDecisions.as_str(),
            "decision" => format!("{:?}", decision)
        )
        .increment(1);
        ::metrics::gauge!(MetricName::QualityGateIssues.as_str()).set(issues as f64);
    }
}

pub mod output {
    use super::MetricName;

    pub fn bytes_written(kind: &'static str, bytes: usize) {
        ::metrics::counter!(MetricName::OutputBytesWritten.as_str(), "kind" => kind).increment(bytes as u64);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::PipelineDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: Vec<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert!(names.iter().all(|n| n.starts_with("rof_")));
    }

    #[test]
    fn every_metric_has_a_stage_and_description() {
        for metric in MetricName::all_metrics() {
            let (stage, description) = metric.metadata();
            assert!(!stage.is_empty() && !description.is_empty(), "{:?}", metric);
        }
    }

    #[test]
    fn installed_recorder_renders_recorded_values() {
        init().unwrap();
        init().unwrap();
        loader::rows_loaded(42);
        pivot::pivoted(3, 1, 0);

        let text = render().unwrap();
        assert!(text.contains("rof_loader_rows_loaded_total"), "{}", text);
        assert!(text.contains("rof_pivot_columns_created"), "{}", text);
        assert!(text.contains("# HELP rof_loader_rows_loaded_total"), "{}", text);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("metrics.prom");
        write_to_file(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("rof_pivot_columns_created"));
    }
}
