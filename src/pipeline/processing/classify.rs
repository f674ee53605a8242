use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{RawRow, RawTable};
use crate::pipeline::ingestion::loader::ColumnIndex;

/// What a row of the export represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    /// Cost cell is filled
    OrderHeader,
    /// Cost is blank and a check name is present
    CheckStep,
    Unclassified,
}

/// Row kinds aligned with `RawTable::rows`.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kinds: Vec<RowKind>,
    pub stats: ClassificationStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationStats {
    pub total_rows: usize,
    pub order_headers: usize,
    pub check_steps: usize,
    pub unclassified: usize,
    /// Line numbers of the unclassified rows
    pub unclassified_lines: Vec<usize>,
}

/// Classify a single row from its cost and check-name cells.
///
/// The raw cost text decides, not its numeric value: a header whose cost is
/// not a number is still a header.
pub fn classify_row(row: &RawRow, columns: &ColumnIndex) -> RowKind {
    match (row.get(columns.cost), row.get(columns.check_name)) {
        (Some(_), _) => RowKind::OrderHeader,
        (None, Some(_)) => RowKind::CheckStep,
        (None, None) => RowKind::Unclassified,
    }
}

pub fn classify(table: &RawTable, columns: &ColumnIndex) -> Classification {
    let mut stats = ClassificationStats {
        total_rows: table.rows.len(),
        ..Default::default()
    };

    let kinds: Vec<RowKind> = table
        .rows
        .iter()
        .map(|row| {
            let kind = classify_row(row, columns);
            match kind {
                RowKind::OrderHeader => stats.order_headers += 1,
                RowKind::CheckStep => stats.check_steps += 1,
                RowKind::Unclassified => {
                    debug!("Row {} is neither an order header nor a check step", row.line);
                    stats.unclassified += 1;
                    stats.unclassified_lines.push(row.line);
                }
            }
            kind
        })
        .collect();

    if stats.unclassified > 0 {
        warn!("{} row(s) could not be classified and were dropped", stats.unclassified);
    }
    info!(
        "Classified {} rows: {} order headers, {} check steps",
        stats.total_rows, stats.order_headers, stats.check_steps
    );
    crate::observability::metrics::classifier::rows_classified(
        stats.order_headers,
        stats.check_steps,
        stats.unclassified,
    );

    Classification { kinds, stats }
}
