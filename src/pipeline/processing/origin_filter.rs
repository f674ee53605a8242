use serde::Serialize;
use tracing::{info, warn};

use crate::config::OriginConfig;
use crate::domain::CheckStep;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OriginFilterStats {
    /// False when the export has no execution-origin column; nothing is removed then
    pub indicator_present: bool,
    pub total_checks: usize,
    pub human_executed: usize,
    pub automated_removed: usize,
    /// `automated_removed / total_checks * 100`, 0 when there are no checks
    pub removed_pct: f64,
}

/// Separates check results entered by inspectors from those decided by process logic.
#[derive(Debug, Clone)]
pub struct OriginFilter {
    automated_tokens: Vec<String>,
}

impl OriginFilter {
    pub fn new(config: &OriginConfig) -> Self {
        Self {
            automated_tokens: config
                .automated_tokens
                .iter()
                .map(|t| t.trim().to_uppercase())
                .collect(),
        }
    }

    /// Blank or unset means a person executed the check.
    pub fn is_automated(&self, indicator: Option<&str>) -> bool {
        match indicator.map(str::trim) {
            Some(value) if !value.is_empty() => {
                let upper = value.to_uppercase();
                self.automated_tokens.iter().any(|t| *t == upper)
            }
            _ => false,
        }
    }

    /// Keep only human-executed check steps, preserving row order.
    pub fn apply(&self, checks: Vec<CheckStep>, indicator_present: bool) -> (Vec<CheckStep>, OriginFilterStats) {
        let total = checks.len();
        if !indicator_present {
            warn!("No execution-origin column found; keeping all {} check steps", total);
        }

        let kept: Vec<CheckStep> = checks
            .into_iter()
            .filter(|c| !self.is_automated(c.origin.as_deref()))
            .collect();

        let removed = total - kept.len();
        let removed_pct = if total > 0 {
            removed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        info!(
            "Kept {} human-executed checks, removed {} automated ({:.1}%)",
            kept.len(),
            removed,
            removed_pct
        );
        crate::observability::metrics::origin_filter::filtered(total, removed);

        let stats = OriginFilterStats {
            indicator_present,
            total_checks: total,
            human_executed: kept.len(),
            automated_removed: removed,
            removed_pct,
        };
        (kept, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(line: usize, origin: Option<&str>) -> CheckStep {
        CheckStep {
            lpn: "A1".into(),
            line,
            name: "Is it Fraud?".into(),
            status: Some("Failed".into()),
            origin: origin.map(str::to_string),
        }
    }

    #[test]
    fn recognizes_heterogeneous_true_encodings() {
        let filter = OriginFilter::new(&OriginConfig::default());
        for value in ["TRUE", "true", "T", "t", "1", "YES", "yes", "Y", " y "] {
            assert!(filter.is_automated(Some(value)), "{value} should be automated");
        }
        for value in ["FALSE", "F", "0", "NO", "N", "", "maybe"] {
            assert!(!filter.is_automated(Some(value)), "{value} should be human");
        }
        assert!(!filter.is_automated(None));
    }

    #[test]
    fn removes_automated_checks_and_reports_share() {
        let filter = OriginFilter::new(&OriginConfig::default());
        let checks = vec![step(1, None), step(2, Some("TRUE")), step(3, Some("False")), step(4, Some("yes"))];
        let (kept, stats) = filter.apply(checks, true);
        assert_eq!(kept.iter().map(|c| c.line).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(stats.automated_removed, 2);
        assert_eq!(stats.total_checks, 4);
        assert!((stats.removed_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_has_zero_share() {
        let filter = OriginFilter::new(&OriginConfig::default());
        let (kept, stats) = filter.apply(Vec::new(), false);
        assert!(kept.is_empty());
        assert_eq!(stats.removed_pct, 0.0);
        assert!(!stats.indicator_present);
    }
}
