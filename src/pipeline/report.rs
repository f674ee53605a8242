use serde::Serialize;

use crate::config::PolicyConfig;
use crate::domain::TextEncoding;
use crate::pipeline::processing::classify::ClassificationStats;
use crate::pipeline::processing::features::FeatureStats;
use crate::pipeline::processing::link::LinkStats;
use crate::pipeline::processing::origin_filter::OriginFilterStats;
use crate::pipeline::processing::pivot::{CheckColumn, PivotStats};
use crate::pipeline::processing::quality_gate::QualityAssessment;

pub const REPORT_VERSION: &str = "1";

/// Sidecar audit record of one run. Holds no timestamps, so identical inputs
/// produce identical reports.
#[derive(Debug, Clone, Serialize)]
pub struct TransformationReport {
    pub report_version: String,
    pub input: InputSummary,
    pub policies: PolicyConfig,
    pub classification: ClassificationStats,
    pub linking: LinkStats,
    pub origin_filter: OriginFilterStats,
    pub pivot: PivotReport,
    pub features: FeatureStats,
    pub quality: QualityAssessment,
    /// Filled in once the table has been written
    pub output: Option<OutputSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InputSummary {
    pub path: String,
    pub encoding: TextEncoding,
    pub sha256: String,
    pub rows: usize,
    pub columns: usize,
    pub dropped_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PivotReport {
    #[serde(flatten)]
    pub stats: PivotStats,
    pub check_columns: Vec<CheckColumn>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutputSummary {
    pub table_path: String,
    pub rows: usize,
    pub columns: usize,
    pub bytes: usize,
    pub sha256: String,
}

impl TransformationReport {
    /// Short human-readable summary for the console.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Input: {} ({} rows, {})",
                self.input.path, self.input.rows, self.input.encoding
            ),
            format!(
                "Rows: {} order headers, {} check steps, {} unclassified",
                self.classification.order_headers, self.classification.check_steps, self.classification.unclassified
            ),
            format!(
                "Orders: {} ({} duplicate headers, {} without checks, {} non-numeric cost, {} with check cells)",
                self.linking.orders,
                self.linking.duplicate_headers,
                self.linking.orders_without_checks,
                self.linking.non_numeric_cost,
                self.linking.headers_with_check_cells
            ),
            format!(
                "Checks: {} linked, {} orphaned, {} automated removed ({:.1}%)",
                self.linking.linked_checks,
                self.linking.orphan_checks,
                self.origin_filter.automated_removed,
                self.origin_filter.removed_pct
            ),
            format!(
                "Pivot: {} check columns, {} duplicate executions, {} name collisions",
                self.pivot.stats.columns_created,
                self.pivot.stats.duplicate_executions,
                self.pivot.stats.name_collisions.len()
            ),
            format!("Quality gate: {:?} ({} issue kinds)", self.quality.decision, self.quality.issues.len()),
        ];
        if let Some(output) = &self.output {
            lines.push(format!(
                "Output: {} ({} rows x {} columns)",
                output.table_path, output.rows, output.columns
            ));
        }
        lines
    }
}
