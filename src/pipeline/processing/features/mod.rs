pub mod registry;
pub mod stats;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::config::FeatureConfig;
use crate::constants;
use crate::domain::{CheckStatus, Order, OrderFeatures};
use crate::pipeline::processing::pivot::WideTable;
use registry::{CheckFlagRegistry, ResolvedFlag};

/// Right-closed cost buckets; the lowest edge is included in the first bucket.
#[derive(Debug, Clone)]
pub struct CostBins {
    edges: Vec<f64>,
    labels: Vec<String>,
}

impl CostBins {
    pub fn new(edges: Vec<f64>, labels: Vec<String>) -> Self {
        Self { edges, labels }
    }

    pub fn label(&self, cost: f64) -> Option<&str> {
        let first = *self.edges.first()?;
        if cost == first {
            return self.labels.first().map(String::as_str);
        }
        self.edges
            .windows(2)
            .position(|w| cost > w[0] && cost <= w[1])
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

/// Parse a date cell with the first format that fits. Date-only formats are
/// read as midnight.
pub fn parse_datetime(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt).ok().or_else(|| {
            NaiveDate::parse_from_str(raw, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
    })
}

/// Whole days from `from` to `to`, rounded toward negative infinity.
pub fn whole_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_seconds().div_euclid(86_400)
}

/// Last `/` segment of a category path, trimmed.
pub fn category_group(category: &str) -> Option<String> {
    category
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn is_liquidated(disposition: Option<&str>) -> bool {
    disposition
        .map(|d| d.trim().eq_ignore_ascii_case(constants::LIQUIDATE_DISPOSITION))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureStats {
    /// Upper Tukey fence of cost for this run; `None` when no order has a cost
    pub high_value_threshold: Option<f64>,
    pub high_value_orders: usize,
    pub liquidated_orders: usize,
    pub orders_without_cost: usize,
    pub orders_without_bin: usize,
    /// Check columns each flag matched in this export
    pub flags: Vec<ResolvedFlag>,
    /// Present but unparseable date cells, per date column
    pub unparseable_dates: BTreeMap<String, usize>,
}

/// The merged wide table with derived features, ready to be written.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub wide: WideTable,
    /// Aligned with `wide.orders`
    pub features: Vec<OrderFeatures>,
    pub flag_names: Vec<String>,
    /// Position of the cost column in `wide.order_columns`
    cost_position: Option<usize>,
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl FeatureTable {
    /// Output header: order columns, check columns, then derived features.
    pub fn header(&self) -> Vec<String> {
        let mut header = self.wide.order_columns.clone();
        header.extend(self.wide.check_columns.iter().map(|c| c.id.clone()));
        header.extend(constants::LEADING_FEATURES.iter().map(|s| s.to_string()));
        header.extend(self.flag_names.iter().cloned());
        header.extend(constants::TRAILING_FEATURES.iter().map(|s| s.to_string()));
        header
    }

    pub fn len(&self) -> usize {
        self.wide.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wide.orders.is_empty()
    }

    /// Render one output row as text cells. Missing values are empty strings.
    pub fn record(&self, index: usize) -> Vec<String> {
        let order = &self.wide.orders[index];
        let f = &self.features[index];

        let mut row: Vec<String> = order
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if Some(i) == self.cost_position {
                    fmt_opt(order.cost)
                } else {
                    v.clone().unwrap_or_default()
                }
            })
            .collect();
        row.extend(
            self.wide.cells[index]
                .iter()
                .map(|c| c.map(|s| s.as_str().to_string()).unwrap_or_default()),
        );
        row.extend([
            f.is_liquidated.to_string(),
            f.cogs_bin.clone().unwrap_or_default(),
            fmt_opt(f.processing_days),
            f.category_group.clone().unwrap_or_default(),
            f.high_value_flag.to_string(),
            f.total_checks.to_string(),
            f.failed_checks_count.to_string(),
            f.passed_checks_count.to_string(),
            f.failure_rate.to_string(),
            f.check_efficiency.to_string(),
        ]);
        row.extend(f.flags.iter().map(|v| v.to_string()));
        row.extend([
            fmt_opt(f.value_lost),
            fmt_opt(f.recovery_potential),
            fmt_opt(f.days_to_ship),
        ]);
        row
    }

    /// Value of a registry flag for one row.
    pub fn flag(&self, index: usize, feature: &str) -> Option<u8> {
        let position = self.flag_names.iter().position(|n| n == feature)?;
        self.features.get(index)?.flags.get(position).copied()
    }
}

/// Computes the order-level features on the merged table.
pub struct FeatureDeriver {
    bins: CostBins,
    iqr_multiplier: f64,
    date_formats: Vec<String>,
    registry: CheckFlagRegistry,
    cost_column: String,
}

impl FeatureDeriver {
    pub fn new(config: &FeatureConfig, registry: CheckFlagRegistry, cost_column: &str) -> Self {
        Self {
            bins: CostBins::new(config.cogs_bin_edges.clone(), config.cogs_bin_labels.clone()),
            iqr_multiplier: config.outlier_iqr_multiplier,
            date_formats: config.date_formats.clone(),
            registry,
            cost_column: cost_column.to_string(),
        }
    }

    pub fn registry(&self) -> &CheckFlagRegistry {
        &self.registry
    }

    fn date(&self, column: &str, raw: Option<&str>, unparseable: &mut BTreeMap<String, usize>) -> Option<NaiveDateTime> {
        let raw = raw?;
        let parsed = parse_datetime(raw, &self.date_formats);
        if parsed.is_none() {
            *unparseable.entry(column.to_string()).or_default() += 1;
        }
        parsed
    }

    fn day_delta(
        &self,
        from: (&str, Option<&str>),
        to: (&str, Option<&str>),
        unparseable: &mut BTreeMap<String, usize>,
    ) -> Option<i64> {
        let start = self.date(from.0, from.1, unparseable);
        let end = self.date(to.0, to.1, unparseable);
        Some(whole_days(start?, end?))
    }

    fn derive_order(
        &self,
        order: &Order,
        cells: &[Option<CheckStatus>],
        flags: &[ResolvedFlag],
        threshold: Option<f64>,
        unparseable: &mut BTreeMap<String, usize>,
    ) -> OrderFeatures {
        let liquidated = is_liquidated(order.disposition.as_deref());

        let failed = cells.iter().filter(|c| **c == Some(CheckStatus::Failed)).count();
        let passed = cells.iter().filter(|c| **c == Some(CheckStatus::Passed)).count();
        let total = failed + passed;
        let rate = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };

        let flag_values: Vec<u8> = flags
            .iter()
            .map(|flag| {
                let hit = flag
                    .column_indices
                    .iter()
                    .any(|&i| cells.get(i).copied().flatten() == Some(flag.target));
                u8::from(hit)
            })
            .collect();
        let works = flags
            .iter()
            .position(|f| f.feature == constants::WORKS_CHECK_PASSED)
            .map(|i| flag_values[i] == 1)
            .unwrap_or(false);

        // cost when the condition holds, 0 otherwise; empty if the cost itself is missing
        let cost_if = |condition: bool| if condition { order.cost } else { Some(0.0) };

        OrderFeatures {
            is_liquidated: u8::from(liquidated),
            cogs_bin: order.cost.and_then(|c| self.bins.label(c)).map(str::to_string),
            processing_days: self.day_delta(
                (constants::STARTED_COLUMN, order.started.as_deref()),
                (constants::COMPLETED_COLUMN, order.completed.as_deref()),
                unparseable,
            ),
            category_group: order.product_category.as_deref().and_then(category_group),
            high_value_flag: match (order.cost, threshold) {
                (Some(cost), Some(t)) => u8::from(cost > t),
                _ => 0,
            },
            total_checks: total,
            failed_checks_count: failed,
            passed_checks_count: passed,
            failure_rate: rate(failed),
            check_efficiency: rate(passed),
            flags: flag_values,
            value_lost: cost_if(liquidated),
            recovery_potential: cost_if(liquidated && works),
            days_to_ship: self.day_delta(
                (constants::SCHEDULED_COLUMN, order.scheduled.as_deref()),
                (constants::SHIPPED_COLUMN, order.shipped.as_deref()),
                unparseable,
            ),
        }
    }

    #[instrument(skip_all, fields(orders = wide.orders.len()))]
    pub fn derive(&self, wide: WideTable) -> (FeatureTable, FeatureStats) {
        let check_ids: Vec<String> = wide.check_columns.iter().map(|c| c.id.clone()).collect();
        let flags = self.registry.resolve(&check_ids);
        for flag in &flags {
            if flag.matched_columns.is_empty() {
                warn!("No check column matched flag '{}'; it will be 0 for every order", flag.feature);
            } else {
                info!("Flag '{}' uses columns {:?}", flag.feature, flag.matched_columns);
            }
        }

        let costs: Vec<f64> = wide.orders.iter().filter_map(|o| o.cost).collect();
        let threshold = stats::upper_fence(&costs, self.iqr_multiplier);
        match threshold {
            Some(t) => info!("High-value threshold: {:.2}", t),
            None => warn!("No numeric costs; high_value_flag is 0 for every order"),
        }

        let mut unparseable = BTreeMap::new();
        let features: Vec<OrderFeatures> = wide
            .orders
            .iter()
            .zip(&wide.cells)
            .map(|(order, cells)| self.derive_order(order, cells, &flags, threshold, &mut unparseable))
            .collect();

        for (column, count) in &unparseable {
            warn!("{} unparseable value(s) in '{}'", count, column);
        }

        let stats = FeatureStats {
            high_value_threshold: threshold,
            high_value_orders: features.iter().filter(|f| f.high_value_flag == 1).count(),
            liquidated_orders: features.iter().filter(|f| f.is_liquidated == 1).count(),
            orders_without_cost: wide.orders.iter().filter(|o| o.cost.is_none()).count(),
            orders_without_bin: features.iter().filter(|f| f.cogs_bin.is_none()).count(),
            flags,
            unparseable_dates: unparseable,
        };
        info!(
            "Derived features for {} orders ({} liquidated, {} high value)",
            features.len(),
            stats.liquidated_orders,
            stats.high_value_orders
        );
        crate::observability::metrics::features::derived(features.len(), stats.high_value_orders);

        let cost_position = wide.order_columns.iter().position(|c| *c == self.cost_column);
        let table = FeatureTable {
            flag_names: self.registry.list_features().iter().map(|s| s.to_string()).collect(),
            wide,
            features,
            cost_position,
        };
        (table, stats)
    }
}
