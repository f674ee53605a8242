use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::app::ports::{ReportOutputPort, WrittenFile};
use crate::pipeline::report::TransformationReport;

/// Writes the transformation report as pretty-printed JSON.
#[derive(Debug, Default)]
pub struct JsonReportOutputAdapter;

impl JsonReportOutputAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportOutputPort for JsonReportOutputAdapter {
    fn write_report(&self, report: &TransformationReport, path: &Path) -> Result<WrittenFile> {
        let mut bytes = serde_json::to_vec_pretty(report)?;
        bytes.push(b'\n');
        crate::infra::write_atomically(path, &bytes)
            .with_context(|| format!("Failed to write transformation report to {}", path.display()))?;
        crate::observability::metrics::output::bytes_written("report", bytes.len());
        info!("Wrote transformation report to {}", path.display());

        Ok(WrittenFile {
            path: path.to_path_buf(),
            bytes: bytes.len(),
            sha256: hex::encode(Sha256::digest(&bytes)),
        })
    }
}
