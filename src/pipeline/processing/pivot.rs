use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::config::{CollisionPolicy, DuplicateCheckPolicy};
use crate::constants::RESERVED_NAME_SUFFIX;
use crate::domain::{CheckStatus, CheckStep, Order};

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s]").expect("valid regex"));
static SEPARATOR_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]+").expect("valid regex"));

/// Identifier used when a check name has no letters or digits at all.
pub const UNNAMED_CHECK: &str = "unnamed_check";

/// Turn a free-text check name into a column identifier.
///
/// Characters outside ASCII letters, digits and whitespace become `_`, runs of
/// whitespace and underscores collapse to one `_`, leading and trailing `_`
/// are trimmed and the result is cut to `max_len` characters.
pub fn normalize_check_name(raw: &str, max_len: usize) -> String {
    let replaced = NON_ALPHANUMERIC.replace_all(raw, "_");
    let collapsed = SEPARATOR_RUNS.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        return UNNAMED_CHECK.to_string();
    }
    trimmed.chars().take(max_len).collect()
}

/// Append `suffix` to `base`, shortening the base so the result stays within `max_len`.
fn with_suffix(base: &str, suffix: &str, max_len: usize) -> String {
    let keep = max_len.saturating_sub(suffix.chars().count());
    let head: String = base.chars().take(keep).collect();
    format!("{}{}", head.trim_end_matches('_'), suffix)
}

/// One pivoted check column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckColumn {
    pub id: String,
    /// Raw check names that feed this column, in order of first appearance
    pub raw_names: Vec<String>,
}

/// Distinct raw names that normalized to the same identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameCollision {
    pub identifier: String,
    pub raw_names: Vec<String>,
    /// Columns the names ended up in
    pub columns: Vec<String>,
}

/// A check identifier that clashed with an order or feature column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservedRename {
    pub raw_name: String,
    pub identifier: String,
    pub renamed_to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PivotStats {
    pub checks_pivoted: usize,
    pub distinct_raw_names: usize,
    pub columns_created: usize,
    pub orders_with_checks: usize,
    /// Executions of a check already recorded for the same order
    pub duplicate_executions: usize,
    pub duplicate_policy: String,
    pub name_collisions: Vec<NameCollision>,
    pub reserved_renames: Vec<ReservedRename>,
    pub blank_statuses: usize,
    pub unexpected_statuses: usize,
    pub unexpected_status_values: BTreeMap<String, usize>,
}

/// Check statuses keyed by LPN, one slot per column.
#[derive(Debug, Clone)]
pub struct CheckMatrix {
    pub columns: Vec<CheckColumn>,
    pub cells: HashMap<String, Vec<Option<CheckStatus>>>,
    pub stats: PivotStats,
}

/// Orders left-joined with their pivoted checks.
#[derive(Debug, Clone)]
pub struct WideTable {
    pub order_columns: Vec<String>,
    pub orders: Vec<Order>,
    pub check_columns: Vec<CheckColumn>,
    /// Aligned with `orders`; each row aligned with `check_columns`
    pub cells: Vec<Vec<Option<CheckStatus>>>,
}

pub struct PivotEngine {
    max_name_len: usize,
    duplicate_policy: DuplicateCheckPolicy,
    collision_policy: CollisionPolicy,
    reserved: HashSet<String>,
}

impl PivotEngine {
    /// `reserved` holds names already taken by order and feature columns.
    pub fn new(
        max_name_len: usize,
        duplicate_policy: DuplicateCheckPolicy,
        collision_policy: CollisionPolicy,
        reserved: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            max_name_len,
            duplicate_policy,
            collision_policy,
            reserved: reserved.into_iter().collect(),
        }
    }

    /// Assign a column to every distinct raw check name, in first-appearance order.
    fn assign_columns(&self, checks: &[CheckStep], stats: &mut PivotStats) -> (Vec<CheckColumn>, HashMap<String, usize>) {
        let mut columns: Vec<CheckColumn> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        let mut by_raw: HashMap<String, usize> = HashMap::new();
        // identifier -> (raw names, column ids) for collision reporting
        let mut by_identifier: BTreeMap<String, (Vec<String>, Vec<String>)> = BTreeMap::new();
        let mut identifier_order: Vec<String> = Vec::new();

        for step in checks {
            if by_raw.contains_key(&step.name) {
                continue;
            }

            let mut identifier = normalize_check_name(&step.name, self.max_name_len);
            if self.reserved.contains(&identifier) {
                let renamed = with_suffix(&identifier, RESERVED_NAME_SUFFIX, self.max_name_len);
                warn!("Check '{}' clashes with column '{}', renamed to '{}'", step.name, identifier, renamed);
                stats.reserved_renames.push(ReservedRename {
                    raw_name: step.name.clone(),
                    identifier: identifier.clone(),
                    renamed_to: renamed.clone(),
                });
                identifier = renamed;
            }

            let column_index = match (by_id.get(&identifier).copied(), self.collision_policy) {
                (Some(existing), CollisionPolicy::Merge) => {
                    columns[existing].raw_names.push(step.name.clone());
                    existing
                }
                (Some(_), CollisionPolicy::Suffix) => {
                    let mut n = 2;
                    let id = loop {
                        let candidate = with_suffix(&identifier, &format!("_{n}"), self.max_name_len);
                        if !by_id.contains_key(&candidate) && !self.reserved.contains(&candidate) {
                            break candidate;
                        }
                        n += 1;
                    };
                    by_id.insert(id.clone(), columns.len());
                    columns.push(CheckColumn {
                        id,
                        raw_names: vec![step.name.clone()],
                    });
                    columns.len() - 1
                }
                (None, _) => {
                    by_id.insert(identifier.clone(), columns.len());
                    columns.push(CheckColumn {
                        id: identifier.clone(),
                        raw_names: vec![step.name.clone()],
                    });
                    columns.len() - 1
                }
            };

            let entry = by_identifier.entry(identifier.clone()).or_insert_with(|| {
                identifier_order.push(identifier.clone());
                (Vec::new(), Vec::new())
            });
            entry.0.push(step.name.clone());
            let column_id = columns[column_index].id.clone();
            if !entry.1.contains(&column_id) {
                entry.1.push(column_id);
            }
            by_raw.insert(step.name.clone(), column_index);
        }

        for identifier in identifier_order {
            if let Some((raw_names, column_ids)) = by_identifier.remove(&identifier) {
                if raw_names.len() > 1 {
                    warn!(
                        "Check names {:?} all normalize to '{}' ({:?})",
                        raw_names, identifier, self.collision_policy
                    );
                    stats.name_collisions.push(NameCollision {
                        identifier,
                        raw_names,
                        columns: column_ids,
                    });
                }
            }
        }

        stats.distinct_raw_names = by_raw.len();
        (columns, by_raw)
    }

    /// Pivot human-executed check steps into one column per distinct check.
    ///
    /// Tie-break: the export does not guarantee one execution per check per
    /// order. Under the default `LastWriteWins` policy the execution that
    /// appears last in row order decides the cell, including a blank or
    /// unrecognized status, which leaves the cell empty.
    #[instrument(skip_all, fields(checks = checks.len()))]
    pub fn pivot(&self, checks: &[CheckStep]) -> CheckMatrix {
        let mut stats = PivotStats {
            checks_pivoted: checks.len(),
            duplicate_policy: format!("{:?}", self.duplicate_policy),
            ..Default::default()
        };
        let (columns, by_raw) = self.assign_columns(checks, &mut stats);
        let width = columns.len();

        let mut cells: HashMap<String, Vec<Option<CheckStatus>>> = HashMap::new();
        let mut written: HashSet<(String, usize)> = HashSet::new();

        for step in checks {
            let Some(&column) = by_raw.get(&step.name) else {
                continue;
            };

            let status = match step.status.as_deref() {
                None => {
                    stats.blank_statuses += 1;
                    None
                }
                Some(raw) => match CheckStatus::parse(raw) {
                    Some(status) => Some(status),
                    None => {
                        warn!("Unexpected status '{}' on row {} (LPN {})", raw, step.line, step.lpn);
                        stats.unexpected_statuses += 1;
                        *stats.unexpected_status_values.entry(raw.to_string()).or_default() += 1;
                        None
                    }
                },
            };

            let row = cells
                .entry(step.lpn.clone())
                .or_insert_with(|| vec![None; width]);
            let first_write = written.insert((step.lpn.clone(), column));
            if !first_write {
                debug!(
                    "Check '{}' executed again for LPN {} on row {}",
                    columns[column].id, step.lpn, step.line
                );
                stats.duplicate_executions += 1;
            }
            if first_write || self.duplicate_policy == DuplicateCheckPolicy::LastWriteWins {
                row[column] = status;
            }
        }

        stats.columns_created = width;
        stats.orders_with_checks = cells.len();
        info!(
            "Pivoted {} checks into {} columns for {} orders",
            checks.len(),
            width,
            cells.len()
        );
        crate::observability::metrics::pivot::pivoted(width, stats.duplicate_executions, stats.name_collisions.len());

        CheckMatrix { columns, cells, stats }
    }
}

/// Left-join the check matrix onto the orders by LPN. Orders without checks
/// keep every check cell empty.
pub fn merge(order_columns: Vec<String>, orders: Vec<Order>, matrix: CheckMatrix) -> (WideTable, PivotStats) {
    let width = matrix.columns.len();
    let CheckMatrix {
        columns,
        mut cells,
        stats,
    } = matrix;

    let rows = orders
        .iter()
        .map(|order| cells.remove(&order.lpn).unwrap_or_else(|| vec![None; width]))
        .collect();

    (
        WideTable {
            order_columns,
            orders,
            check_columns: columns,
            cells: rows,
        },
        stats,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(lpn: &str, line: usize, name: &str, status: Option<&str>) -> CheckStep {
        CheckStep {
            lpn: lpn.into(),
            line,
            name: name.into(),
            status: status.map(str::to_string),
            origin: None,
        }
    }

    fn engine(policy: DuplicateCheckPolicy, collisions: CollisionPolicy) -> PivotEngine {
        PivotEngine::new(50, policy, collisions, vec!["Disposition".to_string(), "total_checks".to_string()])
    }

    fn order(lpn: &str) -> Order {
        Order {
            lpn: lpn.into(),
            line: 1,
            cost: Some(1800.0),
            disposition: Some("Sellable".into()),
            product_category: None,
            scheduled: None,
            started: None,
            completed: None,
            shipped: None,
            values: vec![],
        }
    }

    #[test]
    fn normalizes_free_text_names() {
        assert_eq!(normalize_check_name("Does it work?", 50), "Does_it_work");
        assert_eq!(normalize_check_name("Is it Fraud?", 50), "Is_it_Fraud");
        assert_eq!(normalize_check_name("  Scratches / Dents  ", 50), "Scratches_Dents");
        assert_eq!(normalize_check_name("Factory__sealed\t(box)", 50), "Factory_sealed_box");
        assert_eq!(normalize_check_name("???", 50), UNNAMED_CHECK);
        assert_eq!(normalize_check_name("Café crème", 50), "Caf_cr_me");
    }

    #[test]
    fn truncates_to_max_length() {
        let long = "Is the item free of any visible damage including scratches dents and cracks";
        let id = normalize_check_name(long, 50);
        assert_eq!(id.chars().count(), 50);
        assert!(id.starts_with("Is_the_item_free_of_any_visible_damage"));
    }

    #[test]
    fn suffixed_identifiers_stay_within_max_length() {
        let engine = PivotEngine::new(
            12,
            DuplicateCheckPolicy::LastWriteWins,
            CollisionPolicy::Suffix,
            vec!["total_checks".to_string()],
        );
        let checks = vec![
            step("A1", 1, "total checks", Some("Passed")),
            step("A1", 2, "Does it work?", Some("Passed")),
            step("A1", 3, "Does it work!", Some("Failed")),
        ];
        let matrix = engine.pivot(&checks);
        let ids: Vec<&str> = matrix.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["total_check", "Does_it_work", "Does_it_wo_2"]);
        assert!(ids.iter().all(|id| id.chars().count() <= 12));
        assert_eq!(matrix.stats.reserved_renames[0].renamed_to, "total_check");
    }

    #[test]
    fn last_write_wins_for_repeated_checks() {
        let checks = vec![
            step("A1", 1, "Is the Item Repairable?", Some("Failed")),
            step("A1", 2, "Is the Item Repairable?", Some("Passed")),
        ];
        let matrix = engine(DuplicateCheckPolicy::LastWriteWins, CollisionPolicy::Merge).pivot(&checks);
        assert_eq!(matrix.columns.len(), 1);
        assert_eq!(matrix.columns[0].id, "Is_the_Item_Repairable");
        assert_eq!(matrix.cells["A1"], vec![Some(CheckStatus::Passed)]);
        assert_eq!(matrix.stats.duplicate_executions, 1);
    }

    #[test]
    fn first_write_wins_is_available_as_a_policy() {
        let checks = vec![
            step("A1", 1, "Is the Item Repairable?", Some("Failed")),
            step("A1", 2, "Is the Item Repairable?", Some("Passed")),
        ];
        let matrix = engine(DuplicateCheckPolicy::FirstWriteWins, CollisionPolicy::Merge).pivot(&checks);
        assert_eq!(matrix.cells["A1"], vec![Some(CheckStatus::Failed)]);
    }

    #[test]
    fn colliding_names_are_reported_when_merged() {
        let checks = vec![
            step("A1", 1, "Is it Fraud?", Some("Passed")),
            step("B2", 2, "Is it Fraud!", Some("Failed")),
        ];
        let matrix = engine(DuplicateCheckPolicy::LastWriteWins, CollisionPolicy::Merge).pivot(&checks);
        assert_eq!(matrix.columns.len(), 1);
        assert_eq!(matrix.stats.name_collisions.len(), 1);
        let collision = &matrix.stats.name_collisions[0];
        assert_eq!(collision.identifier, "Is_it_Fraud");
        assert_eq!(collision.raw_names, vec!["Is it Fraud?".to_string(), "Is it Fraud!".to_string()]);
        assert_eq!(matrix.cells["B2"], vec![Some(CheckStatus::Failed)]);
    }

    #[test]
    fn colliding_names_get_suffixes_under_suffix_policy() {
        let checks = vec![
            step("A1", 1, "Is it Fraud?", Some("Passed")),
            step("A1", 2, "Is it Fraud!", Some("Failed")),
        ];
        let matrix = engine(DuplicateCheckPolicy::LastWriteWins, CollisionPolicy::Suffix).pivot(&checks);
        let ids: Vec<&str> = matrix.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Is_it_Fraud", "Is_it_Fraud_2"]);
        assert_eq!(matrix.cells["A1"], vec![Some(CheckStatus::Passed), Some(CheckStatus::Failed)]);
        assert_eq!(matrix.stats.name_collisions[0].columns, vec!["Is_it_Fraud", "Is_it_Fraud_2"]);
        assert_eq!(matrix.stats.duplicate_executions, 0);
    }

    #[test]
    fn reserved_identifiers_are_renamed() {
        let checks = vec![step("A1", 1, "Disposition", Some("Passed"))];
        let matrix = engine(DuplicateCheckPolicy::LastWriteWins, CollisionPolicy::Merge).pivot(&checks);
        assert_eq!(matrix.columns[0].id, "Disposition_check");
        assert_eq!(matrix.stats.reserved_renames.len(), 1);
    }

    #[test]
    fn unexpected_statuses_are_counted_and_left_empty() {
        let checks = vec![
            step("A1", 1, "Does it work?", Some("Pending")),
            step("A1", 2, "Is it Fraud?", None),
            step("A1", 3, "Is it cosmetic?", Some("failed")),
        ];
        let matrix = engine(DuplicateCheckPolicy::LastWriteWins, CollisionPolicy::Merge).pivot(&checks);
        assert_eq!(matrix.cells["A1"], vec![None, None, Some(CheckStatus::Failed)]);
        assert_eq!(matrix.stats.unexpected_statuses, 1);
        assert_eq!(matrix.stats.unexpected_status_values["Pending"], 1);
        assert_eq!(matrix.stats.blank_statuses, 1);
    }

    #[test]
    fn merge_keeps_orders_without_checks() {
        let checks = vec![step("A1", 2, "Does it work?", Some("Passed"))];
        let matrix = engine(DuplicateCheckPolicy::LastWriteWins, CollisionPolicy::Merge).pivot(&checks);
        let (wide, stats) = merge(vec!["LPN".into()], vec![order("A1"), order("B2")], matrix);
        assert_eq!(wide.orders.len(), 2);
        assert_eq!(wide.cells[0], vec![Some(CheckStatus::Passed)]);
        assert_eq!(wide.cells[1], vec![None]);
        assert_eq!(stats.orders_with_checks, 1);
    }
}
