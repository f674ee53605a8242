use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::app::ports::{FeatureTableOutputPort, ReportOutputPort, WrittenFile};
use crate::infra::feature_table_output_adapter::CsvFeatureTableOutputAdapter;
use crate::infra::report_output_adapter::JsonReportOutputAdapter;
use crate::pipeline::report::OutputSummary;
use crate::pipeline::{Pipeline, TransformationReport};

/// `<dir>/<stem>_features.csv` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("export");
    input.with_file_name(format!("{}_features.csv", stem))
}

/// `<dir>/<stem>_transformation_report.json` next to the table.
pub fn default_report_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("features");
    output.with_file_name(format!("{}_transformation_report.json", stem))
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub table: WrittenFile,
    pub report_file: WrittenFile,
    pub report: TransformationReport,
}

/// Runs the pipeline and persists the table and its report.
pub struct FeaturePipelineUseCase {
    pipeline: Pipeline,
    table_output: Box<dyn FeatureTableOutputPort>,
    report_output: Box<dyn ReportOutputPort>,
}

impl FeaturePipelineUseCase {
    pub fn new(
        pipeline: Pipeline,
        table_output: Box<dyn FeatureTableOutputPort>,
        report_output: Box<dyn ReportOutputPort>,
    ) -> Self {
        Self {
            pipeline,
            table_output,
            report_output,
        }
    }

    /// Create a use case writing CSV and JSON files
    pub fn with_file_outputs(pipeline: Pipeline) -> Self {
        Self::new(
            pipeline,
            Box::new(CsvFeatureTableOutputAdapter::new()),
            Box::new(JsonReportOutputAdapter::new()),
        )
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Nothing is written unless every stage and the quality gate succeed.
    pub fn execute(&self, input: &Path, output: Option<&Path>, report: Option<&Path>) -> Result<RunSummary> {
        let started = Instant::now();
        let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_output_path(input));
        let report_path = report.map(Path::to_path_buf).unwrap_or_else(|| default_report_path(&output));

        let outcome = self
            .pipeline
            .run(input)
            .with_context(|| format!("Pipeline failed for {}", input.display()))?;

        let table = self.table_output.write_table(&outcome.table, &output)?;
        let mut report = outcome.report;
        report.output = Some(OutputSummary {
            table_path: output.display().to_string(),
            rows: outcome.table.len(),
            columns: outcome.table.header().len(),
            bytes: table.bytes,
            sha256: table.sha256.clone(),
        });
        let report_file = self.report_output.write_report(&report, &report_path)?;

        let secs = started.elapsed().as_secs_f64();
        crate::observability::metrics::output::run_duration(secs);
        info!("Run finished in {:.2}s", secs);

        Ok(RunSummary {
            table,
            report_file,
            report,
        })
    }
}
