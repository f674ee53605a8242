use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::config::{DuplicateOrderPolicy, OrphanPolicy, PolicyConfig};
use crate::domain::{CheckStep, Order, RawRow, RawTable};
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::loader::ColumnIndex;
use crate::pipeline::processing::classify::{Classification, RowKind};

/// Orders and the check steps that were linked to them.
#[derive(Debug, Clone)]
pub struct LinkedData {
    /// One per distinct LPN, in order of first appearance
    pub orders: Vec<Order>,
    /// Check steps whose LPN matches an order, in row order
    pub checks: Vec<CheckStep>,
    pub stats: LinkStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStats {
    pub orders: usize,
    pub duplicate_headers: usize,
    pub duplicate_lpns: Vec<String>,
    pub headers_missing_lpn: usize,
    pub headers_missing_lpn_lines: Vec<usize>,
    pub non_numeric_cost: usize,
    pub non_numeric_cost_lines: Vec<usize>,
    pub linked_checks: usize,
    pub orphan_checks: usize,
    pub orphan_lines: Vec<usize>,
    pub orders_without_checks: usize,
    /// Order headers that also carry a check name or status; those cells are not pivoted
    pub headers_with_check_cells: usize,
    pub headers_with_check_cells_lines: Vec<usize>,
}

/// Parse a cost cell. Anything that is not a finite number is missing.
pub fn parse_cost(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn build_order(row: &RawRow, lpn: &str, columns: &ColumnIndex) -> Order {
    let owned = |i: Option<usize>| row.get_opt(i).map(str::to_string);
    Order {
        lpn: lpn.to_string(),
        line: row.line,
        cost: row.get(columns.cost).and_then(parse_cost),
        disposition: owned(Some(columns.disposition)),
        product_category: owned(columns.category),
        scheduled: owned(columns.scheduled),
        started: owned(columns.started),
        completed: owned(columns.completed),
        shipped: owned(columns.shipped),
        values: columns
            .order_columns
            .iter()
            .map(|&i| row.fields.get(i).cloned().flatten())
            .collect(),
    }
}

/// Carry the most recent LPN down onto check steps and build the order set.
///
/// The export encodes "belongs to the order above" by leaving LPN blank on
/// check rows, so the carried value is the nearest preceding non-blank LPN.
/// A header with a blank LPN resets the carried value: its checks cannot be
/// attributed to the previous order.
#[instrument(skip_all)]
pub fn link(
    table: &RawTable,
    columns: &ColumnIndex,
    classification: &Classification,
    policies: &PolicyConfig,
) -> Result<LinkedData> {
    let mut stats = LinkStats::default();
    let mut orders: Vec<Order> = Vec::new();
    let mut by_lpn: HashMap<String, usize> = HashMap::new();
    let mut pending: Vec<CheckStep> = Vec::new();
    let mut carried: Option<String> = None;

    for (row, kind) in table.rows.iter().zip(&classification.kinds) {
        let own_lpn = row.get(columns.lpn);

        if *kind == RowKind::OrderHeader {
            if row.get(columns.check_name).is_some() || row.get(columns.check_status).is_some() {
                warn!("Order header on row {} carries check cells that are ignored", row.line);
                stats.headers_with_check_cells += 1;
                stats.headers_with_check_cells_lines.push(row.line);
            }
            let Some(lpn) = own_lpn else {
                warn!("Order header on row {} has no LPN", row.line);
                stats.headers_missing_lpn += 1;
                stats.headers_missing_lpn_lines.push(row.line);
                carried = None;
                continue;
            };
            carried = Some(lpn.to_string());

            let order = build_order(row, lpn, columns);
            if order.cost.is_none() {
                warn!("Non-numeric cost on row {} (LPN {})", row.line, lpn);
                stats.non_numeric_cost += 1;
                stats.non_numeric_cost_lines.push(row.line);
            }

            match by_lpn.get(lpn).copied() {
                Some(existing) => {
                    debug!("Duplicate header for LPN {} on row {}", lpn, row.line);
                    stats.duplicate_headers += 1;
                    if !stats.duplicate_lpns.iter().any(|l| l == lpn) {
                        stats.duplicate_lpns.push(lpn.to_string());
                    }
                    if policies.duplicate_order == DuplicateOrderPolicy::KeepLast {
                        orders[existing] = order;
                    }
                }
                None => {
                    by_lpn.insert(lpn.to_string(), orders.len());
                    orders.push(order);
                }
            }
            continue;
        }

        if let Some(lpn) = own_lpn {
            carried = Some(lpn.to_string());
        }

        if *kind == RowKind::CheckStep {
            match &carried {
                Some(lpn) => pending.push(CheckStep {
                    lpn: lpn.clone(),
                    line: row.line,
                    name: row.get(columns.check_name).unwrap_or_default().to_string(),
                    status: row.get(columns.check_status).map(str::to_string),
                    origin: row.get_opt(columns.check_origin).map(str::to_string),
                }),
                None => {
                    stats.orphan_checks += 1;
                    stats.orphan_lines.push(row.line);
                }
            }
        }
    }

    let mut checks = Vec::with_capacity(pending.len());
    for step in pending {
        if by_lpn.contains_key(&step.lpn) {
            checks.push(step);
        } else {
            stats.orphan_checks += 1;
            stats.orphan_lines.push(step.line);
        }
    }
    stats.orphan_lines.sort_unstable();

    let with_checks: HashSet<&str> = checks.iter().map(|c| c.lpn.as_str()).collect();
    stats.orders = orders.len();
    stats.linked_checks = checks.len();
    stats.orders_without_checks = orders.iter().filter(|o| !with_checks.contains(o.lpn.as_str())).count();

    if stats.duplicate_headers > 0 {
        warn!(
            "{} duplicate order header(s) across {} LPN(s), kept {:?}",
            stats.duplicate_headers,
            stats.duplicate_lpns.len(),
            policies.duplicate_order
        );
    }
    if stats.headers_with_check_cells > 0 {
        warn!(
            "{} order header(s) carry check cells; those checks are not linked",
            stats.headers_with_check_cells
        );
    }
    if stats.orders_without_checks > 0 {
        warn!("{} order(s) have no check steps", stats.orders_without_checks);
    }
    crate::observability::metrics::linker::linked(stats.orders, stats.linked_checks, stats.orphan_checks);

    if stats.orphan_checks > 0 {
        match policies.orphan_checks {
            OrphanPolicy::Fail => {
                return Err(PipelineError::LinkIntegrity {
                    orphans: stats.orphan_checks,
                })
            }
            OrphanPolicy::Warn => warn!(
                "{} check step(s) have no matching order and were excluded",
                stats.orphan_checks
            ),
        }
    }

    info!(
        "Linked {} check steps to {} orders",
        stats.linked_checks, stats.orders
    );
    Ok(LinkedData {
        orders,
        checks,
        stats,
    })
}
