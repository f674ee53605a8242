use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::config::ValidationConfig;
use crate::pipeline::processing::features::{is_liquidated, FeatureTable};

/// How many LPNs an issue lists before it only counts.
const SAMPLE_LPNS: usize = 5;

/// Quality assessment of the derived feature table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityAssessment {
    /// The quality gate decision
    pub decision: QualityDecision,
    pub rows_checked: usize,
    /// Specific quality issues found, one entry per issue kind
    pub issues: Vec<QualityIssue>,
    /// The quality rule set version used
    pub rule_version: String,
}

impl QualityAssessment {
    /// Descriptions of every issue that blocks output.
    pub fn failures(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|i| i.severity >= QualitySeverity::Error)
            .map(|i| i.description.clone())
            .collect()
    }
}

/// Quality Gate decision for the table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QualityDecision {
    /// Table meets every invariant and business rule
    Accept,
    /// Invariants hold but some rows break business rules
    AcceptWithWarnings,
    /// An invariant is broken; nothing is written
    Reject,
}

/// Individual quality issue found during assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityIssue {
    /// The type of quality issue
    pub issue_type: QualityIssueType,
    /// Severity level of the issue
    pub severity: QualitySeverity,
    /// Human-readable description of the issue
    pub description: String,
    /// Column that triggered this issue
    pub field: Option<String>,
    /// Rows affected
    pub count: usize,
    /// First few affected LPNs, in row order
    pub sample_lpns: Vec<String>,
}

/// Types of quality issues that can be detected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityIssueType {
    /// Check counts disagree with each other
    CountMismatch,
    /// Derived flag disagrees with its source column
    DerivationMismatch,
    /// Rate is non-zero with no checks
    RateWithoutChecks,
    /// Output orders differ from input order headers
    ReferentialIntegrity,
    /// Missing required data
    MissingData,
    /// Value outside the accepted set
    InvalidValue,
    /// Data outside expected ranges
    OutOfRange,
    /// Date/time inconsistencies
    TemporalInconsistency,
}

/// Severity levels for quality issues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualitySeverity {
    /// Expected by the business rules, reported only
    Info,
    /// Notable issue worth flagging
    Warning,
    /// Broken invariant, table is rejected
    Error,
    Critical,
}

/// Trait for implementing Quality Gate assessment logic
pub trait QualityGate {
    /// Assess the feature table against the order-header LPNs of the input
    fn assess(&self, table: &FeatureTable, header_lpns: &HashSet<String>) -> QualityAssessment;
}

/// Default Quality Gate implementation with configurable rules
pub struct DefaultQualityGate {
    pub config: ValidationConfig,
    pub rule_version: String,
}

/// Accumulates per-row findings into one issue per kind.
#[derive(Default)]
struct IssueCollector {
    found: BTreeMap<(QualitySeverity, QualityIssueType, String), (String, usize, Vec<String>)>,
}

impl IssueCollector {
    fn add(&mut self, severity: QualitySeverity, issue_type: QualityIssueType, field: &str, description: &str, lpn: &str) {
        let entry = self
            .found
            .entry((severity, issue_type, field.to_string()))
            .or_insert_with(|| (description.to_string(), 0, Vec::new()));
        entry.1 += 1;
        if entry.2.len() < SAMPLE_LPNS {
            entry.2.push(lpn.to_string());
        }
    }

    /// Most severe first.
    fn into_issues(self) -> Vec<QualityIssue> {
        let mut issues: Vec<QualityIssue> = self
            .found
            .into_iter()
            .map(|((severity, issue_type, field), (description, count, sample_lpns))| QualityIssue {
                issue_type,
                severity,
                description: format!("{} ({} row(s))", description, count),
                field: Some(field),
                count,
                sample_lpns,
            })
            .collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.issue_type.cmp(&b.issue_type)));
        issues
    }
}

impl DefaultQualityGate {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            rule_version: "v1.0.0".to_string(),
        }
    }

    /// Invariants every downstream consumer relies on
    fn assess_invariants(&self, table: &FeatureTable, issues: &mut IssueCollector) {
        for (order, f) in table.wide.orders.iter().zip(&table.features) {
            if f.failed_checks_count + f.passed_checks_count != f.total_checks {
                issues.add(
                    QualitySeverity::Error,
                    QualityIssueType::CountMismatch,
                    "total_checks",
                    "failed_checks_count + passed_checks_count differs from total_checks",
                    &order.lpn,
                );
            }
            if (f.is_liquidated == 1) != is_liquidated(order.disposition.as_deref()) {
                issues.add(
                    QualitySeverity::Error,
                    QualityIssueType::DerivationMismatch,
                    "is_liquidated",
                    "is_liquidated disagrees with Disposition",
                    &order.lpn,
                );
            }
            if f.total_checks == 0 && (f.failure_rate != 0.0 || f.check_efficiency != 0.0) {
                issues.add(
                    QualitySeverity::Error,
                    QualityIssueType::RateWithoutChecks,
                    "failure_rate",
                    "non-zero rate on an order without checks",
                    &order.lpn,
                );
            }
        }
    }

    fn assess_lpn_set(&self, table: &FeatureTable, header_lpns: &HashSet<String>, issues: &mut IssueCollector) {
        let mut seen: HashSet<&str> = HashSet::new();
        for order in &table.wide.orders {
            if !seen.insert(order.lpn.as_str()) {
                issues.add(
                    QualitySeverity::Error,
                    QualityIssueType::ReferentialIntegrity,
                    "LPN",
                    "LPN appears more than once in the output",
                    &order.lpn,
                );
            }
            if !header_lpns.contains(&order.lpn) {
                issues.add(
                    QualitySeverity::Error,
                    QualityIssueType::ReferentialIntegrity,
                    "LPN",
                    "output order has no order header in the input",
                    &order.lpn,
                );
            }
        }
        let mut lost: Vec<&String> = header_lpns.iter().filter(|l| !seen.contains(l.as_str())).collect();
        lost.sort();
        for lpn in lost {
            issues.add(
                QualitySeverity::Error,
                QualityIssueType::ReferentialIntegrity,
                "LPN",
                "order header missing from the output",
                lpn,
            );
        }
    }

    /// Business rules of the export
    fn assess_business_rules(&self, table: &FeatureTable, issues: &mut IssueCollector) {
        for (order, f) in table.wide.orders.iter().zip(&table.features) {
            match order.cost {
                None => issues.add(
                    QualitySeverity::Warning,
                    QualityIssueType::MissingData,
                    "cost",
                    "cost is missing or not numeric",
                    &order.lpn,
                ),
                Some(cost) if cost <= 0.0 => issues.add(
                    QualitySeverity::Warning,
                    QualityIssueType::OutOfRange,
                    "cost",
                    "cost is zero or negative",
                    &order.lpn,
                ),
                Some(cost) => {
                    if let Some(min) = self.config.min_expected_cogs {
                        if cost < min {
                            issues.add(
                                QualitySeverity::Info,
                                QualityIssueType::OutOfRange,
                                "cost",
                                &format!("cost below the expected minimum of {}", min),
                                &order.lpn,
                            );
                        }
                    }
                }
            }

            match order.disposition.as_deref().map(str::trim) {
                None => issues.add(
                    QualitySeverity::Warning,
                    QualityIssueType::MissingData,
                    "Disposition",
                    "disposition is missing",
                    &order.lpn,
                ),
                Some(d) if !self.config.valid_dispositions.iter().any(|v| v.eq_ignore_ascii_case(d)) => issues.add(
                    QualitySeverity::Warning,
                    QualityIssueType::InvalidValue,
                    "Disposition",
                    "disposition outside the accepted set",
                    &order.lpn,
                ),
                Some(_) => {}
            }

            if f.processing_days.is_some_and(|d| d < 0) {
                issues.add(
                    QualitySeverity::Warning,
                    QualityIssueType::TemporalInconsistency,
                    "processing_days",
                    "completed before started",
                    &order.lpn,
                );
            }
            if f.days_to_ship.is_some_and(|d| d < 0) {
                issues.add(
                    QualitySeverity::Warning,
                    QualityIssueType::TemporalInconsistency,
                    "days_to_ship",
                    "shipped before scheduled",
                    &order.lpn,
                );
            }
        }
    }

    /// Determine quality decision based on issues
    fn determine_decision(&self, issues: &[QualityIssue]) -> QualityDecision {
        if issues.iter().any(|i| i.severity >= QualitySeverity::Error) {
            return QualityDecision::Reject;
        }
        if issues.iter().any(|i| i.severity == QualitySeverity::Warning) {
            return QualityDecision::AcceptWithWarnings;
        }
        QualityDecision::Accept
    }
}

impl QualityGate for DefaultQualityGate {
    fn assess(&self, table: &FeatureTable, header_lpns: &HashSet<String>) -> QualityAssessment {
        let mut collector = IssueCollector::default();
        self.assess_invariants(table, &mut collector);
        self.assess_lpn_set(table, header_lpns, &mut collector);
        self.assess_business_rules(table, &mut collector);

        let issues = collector.into_issues();
        let decision = self.determine_decision(&issues);
        for issue in &issues {
            match issue.severity {
                QualitySeverity::Info => info!("{}", issue.description),
                _ => warn!("{:?}: {}", issue.severity, issue.description),
            }
        }
        info!("Quality gate decision: {:?}", decision);
        crate::observability::metrics::quality_gate::decision(decision, issues.len());

        QualityAssessment {
            decision,
            rows_checked: table.len(),
            issues,
            rule_version: self.rule_version.clone(),
        }
    }
}

impl Default for DefaultQualityGate {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
