use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::pipeline::processing::features::FeatureTable;
use crate::pipeline::report::TransformationReport;

/// A file the pipeline produced.
#[derive(Clone, Debug, PartialEq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub bytes: usize,
    /// Hex SHA-256 of the bytes written
    pub sha256: String,
}

pub trait FeatureTableOutputPort {
    fn write_table(&self, table: &FeatureTable, path: &Path) -> Result<WrittenFile>;
}

pub trait ReportOutputPort {
    fn write_report(&self, report: &TransformationReport, path: &Path) -> Result<WrittenFile>;
}
