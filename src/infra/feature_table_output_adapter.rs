use anyhow::{Context, Result};
use csv::{Terminator, WriterBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::app::ports::{FeatureTableOutputPort, WrittenFile};
use crate::pipeline::processing::features::FeatureTable;

/// Writes the feature table as comma-separated text with `\n` line endings.
#[derive(Debug, Default)]
pub struct CsvFeatureTableOutputAdapter;

impl CsvFeatureTableOutputAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Serialize the table in memory.
    pub fn render(table: &FeatureTable) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(table.header())?;
        for index in 0..table.len() {
            writer.write_record(table.record(index))?;
        }
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush feature table: {}", e.error()))
    }
}

impl FeatureTableOutputPort for CsvFeatureTableOutputAdapter {
    fn write_table(&self, table: &FeatureTable, path: &Path) -> Result<WrittenFile> {
        let bytes = Self::render(table)?;
        crate::infra::write_atomically(path, &bytes)
            .with_context(|| format!("Failed to write feature table to {}", path.display()))?;
        crate::observability::metrics::output::bytes_written("table", bytes.len());
        info!("Wrote {} rows ({} bytes) to {}", table.len(), bytes.len(), path.display());

        Ok(WrittenFile {
            path: path.to_path_buf(),
            bytes: bytes.len(),
            sha256: hex::encode(Sha256::digest(&bytes)),
        })
    }
}
