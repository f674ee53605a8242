use csv::ReaderBuilder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::config::ColumnConfig;
use crate::domain::{RawRow, RawTable, TextEncoding};
use crate::error::{PipelineError, Result};

/// Positions of the configured columns within a loaded table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnIndex {
    pub lpn: usize,
    pub cost: usize,
    pub disposition: usize,
    pub check_name: usize,
    pub check_status: usize,
    pub check_origin: Option<usize>,
    pub category: Option<usize>,
    pub scheduled: Option<usize>,
    pub started: Option<usize>,
    pub completed: Option<usize>,
    pub shipped: Option<usize>,
    /// Every column that is not check-level, in source order
    pub order_columns: Vec<usize>,
}

impl ColumnIndex {
    /// Resolve configured names against the table headers, failing on any
    /// missing required column.
    pub fn resolve(table: &RawTable, columns: &ColumnConfig) -> Result<Self> {
        let missing: Vec<String> = columns
            .required()
            .iter()
            .filter(|name| table.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Schema { missing });
        }

        let required = |name: &str| table.column_index(name).ok_or_else(|| PipelineError::Schema {
            missing: vec![name.to_string()],
        });

        let check_level = columns.check_level();
        let order_columns = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !check_level.contains(&h.as_str()))
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            lpn: required(&columns.lpn)?,
            cost: required(&columns.cost)?,
            disposition: required(&columns.disposition)?,
            check_name: required(&columns.check_name)?,
            check_status: required(&columns.check_status)?,
            check_origin: table.column_index(&columns.check_origin),
            category: table.column_index(&columns.category),
            scheduled: table.column_index(&columns.scheduled),
            started: table.column_index(&columns.started),
            completed: table.column_index(&columns.completed),
            shipped: table.column_index(&columns.shipped),
            order_columns,
        })
    }
}

/// A decoded export whose required columns are known to exist.
#[derive(Debug, Clone)]
pub struct LoadedExport {
    pub table: RawTable,
    pub columns: ColumnIndex,
}

/// Read, decode and schema-check the export at `path`.
#[instrument(skip(columns), fields(path = %path.display()))]
pub fn load(path: &Path, columns: &ColumnConfig) -> Result<LoadedExport> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let bytes = fs::read(path)?;
    info!("Read {} bytes", bytes.len());
    let table = parse_bytes(&bytes, &path.display().to_string(), columns)?;
    let index = ColumnIndex::resolve(&table, columns)?;

    crate::observability::metrics::loader::rows_loaded(table.rows.len());
    info!(
        "Loaded {} rows, {} columns ({})",
        table.rows.len(),
        table.headers.len(),
        table.encoding
    );

    Ok(LoadedExport {
        table,
        columns: index,
    })
}

/// Decode and parse raw export bytes. `source` is only used in diagnostics.
pub fn parse_bytes(bytes: &[u8], source: &str, columns: &ColumnConfig) -> Result<RawTable> {
    let (text, encoding) = decode(bytes, source)?;
    let checksum = hex::encode(Sha256::digest(bytes));
    parse_text(&text, encoding, checksum, &columns.drop)
}

/// Try UTF-8 first, then fall back once to Latin-1.
///
/// Latin-1 maps every byte to a code point, so the fallback only rejects
/// content with NUL bytes, which no text export contains.
pub fn decode(bytes: &[u8], source: &str) -> Result<(String, TextEncoding)> {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.strip_prefix('\u{feff}').unwrap_or(text);
            Ok((text.to_string(), TextEncoding::Utf8))
        }
        Err(e) => {
            warn!("{} is not valid UTF-8 ({}), retrying as Latin-1", source, e);
            if bytes.contains(&0) {
                return Err(PipelineError::Encoding {
                    path: source.to_string(),
                });
            }
            crate::observability::metrics::loader::encoding_fallback();
            Ok((bytes.iter().map(|&b| b as char).collect(), TextEncoding::Latin1))
        }
    }
}

fn parse_text(
    text: &str,
    encoding: TextEncoding,
    checksum: String,
    drop: &[String],
) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let all_headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let keep: Vec<usize> = (0..all_headers.len())
        .filter(|&i| !drop.contains(&all_headers[i]))
        .collect();
    let dropped_columns: Vec<String> = all_headers
        .iter()
        .filter(|h| drop.contains(h))
        .cloned()
        .collect();
    for column in &dropped_columns {
        info!("Removed column '{}'", column);
    }

    let headers: Vec<String> = keep.iter().map(|&i| all_headers[i].clone()).collect();
    let mut rows = Vec::new();
    for (n, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != all_headers.len() {
            debug!(
                "Row {} has {} fields, expected {}",
                n + 1,
                record.len(),
                all_headers.len()
            );
        }
        let fields = keep
            .iter()
            .map(|&i| {
                record
                    .get(i)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
            .collect();
        rows.push(RawRow { line: n + 1, fields });
    }

    Ok(RawTable {
        headers,
        rows,
        encoding,
        dropped_columns,
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "LPN,Amazon COGS,Disposition,Checks/Title,Checks/Status";

    #[test]
    fn decodes_utf8_and_strips_bom() {
        let (text, enc) = decode("\u{feff}LPN\nA".as_bytes(), "mem").unwrap();
        assert_eq!(enc, TextEncoding::Utf8);
        assert_eq!(text, "LPN\nA");
    }

    #[test]
    fn falls_back_to_latin1() {
        // "Caf\xe9" is not valid UTF-8
        let bytes = b"LPN,Product\nA1,Caf\xe9\n";
        let (text, enc) = decode(bytes, "mem").unwrap();
        assert_eq!(enc, TextEncoding::Latin1);
        assert!(text.contains("Café"));
    }

    #[test]
    fn binary_content_fails_both_encodings() {
        let bytes = [0xff, 0x00, 0xfe];
        assert!(matches!(decode(&bytes, "mem"), Err(PipelineError::Encoding { .. })));
    }

    #[test]
    fn blank_cells_become_none_and_values_are_trimmed() {
        let text = format!("{HEADER}\nA1, 1800 ,Sellable,,\n,,, Does it work? ,Passed\n");
        let table = parse_bytes(text.as_bytes(), "mem", &ColumnConfig::default()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get(1), Some("1800"));
        assert_eq!(table.rows[0].get(3), None);
        assert_eq!(table.rows[1].get(0), None);
        assert_eq!(table.rows[1].get(3), Some("Does it work?"));
        assert_eq!(table.rows[1].line, 2);
    }

    #[test]
    fn configured_columns_are_dropped() {
        let text = format!("{HEADER},Activity Exception Decoration\nA1,1800,Sellable,,,x\n");
        let table = parse_bytes(text.as_bytes(), "mem", &ColumnConfig::default()).unwrap();
        assert_eq!(table.dropped_columns, vec!["Activity Exception Decoration".to_string()]);
        assert_eq!(table.headers.len(), 5);
        assert_eq!(table.rows[0].fields.len(), 5);
    }

    #[test]
    fn missing_required_columns_are_listed() {
        let text = "LPN,Disposition,Checks/Title\nA1,Sellable,\n";
        let table = parse_bytes(text.as_bytes(), "mem", &ColumnConfig::default()).unwrap();
        match ColumnIndex::resolve(&table, &ColumnConfig::default()) {
            Err(PipelineError::Schema { missing }) => {
                assert_eq!(missing, vec!["Amazon COGS".to_string(), "Checks/Status".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn order_columns_exclude_check_level_columns() {
        let text = format!("{HEADER},Checks/Failed by decision logic Automatically,Product\n");
        let table = parse_bytes(text.as_bytes(), "mem", &ColumnConfig::default()).unwrap();
        let index = ColumnIndex::resolve(&table, &ColumnConfig::default()).unwrap();
        assert_eq!(index.order_columns, vec![0, 1, 2, 6]);
        assert_eq!(index.check_origin, Some(5));
        assert_eq!(index.category, None);
    }

    #[test]
    fn missing_file_is_reported() {
        let result = load(Path::new("/definitely/not/here.csv"), &ColumnConfig::default());
        assert!(matches!(result, Err(PipelineError::FileNotFound { .. })));
    }
}
