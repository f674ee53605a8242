use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::constants;
use crate::domain::RawTable;
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::loader::{self, ColumnIndex, LoadedExport};
use crate::pipeline::processing::classify::{classify, Classification, ClassificationStats, RowKind};
use crate::pipeline::processing::features::registry::CheckFlagRegistry;
use crate::pipeline::processing::features::{FeatureDeriver, FeatureTable};
use crate::pipeline::processing::link::{link, LinkStats, LinkedData};
use crate::pipeline::processing::origin_filter::{OriginFilter, OriginFilterStats};
use crate::pipeline::processing::pivot::{merge, PivotEngine};
use crate::pipeline::processing::quality_gate::{DefaultQualityGate, QualityDecision, QualityGate};
use crate::pipeline::report::{InputSummary, PivotReport, TransformationReport, REPORT_VERSION};

/// The feature table of a run and the report describing how it was built.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub table: FeatureTable,
    pub report: TransformationReport,
}

/// Structure of an export without pivoting or writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct InspectSummary {
    pub input: InputSummary,
    pub headers: Vec<String>,
    /// Configured optional columns absent from the export
    pub missing_optional_columns: Vec<String>,
    pub classification: ClassificationStats,
    pub linking: LinkStats,
    pub origin_filter: OriginFilterStats,
    /// Raw check names of human-executed steps, sorted
    pub distinct_check_names: Vec<String>,
}

/// Composes the stages: load, classify, link, filter, pivot, derive, assess.
pub struct Pipeline {
    config: Config,
    registry: CheckFlagRegistry,
}

fn input_summary(table: &RawTable, source: &str) -> InputSummary {
    InputSummary {
        path: source.to_string(),
        encoding: table.encoding,
        sha256: table.checksum.clone(),
        rows: table.rows.len(),
        columns: table.headers.len(),
        dropped_columns: table.dropped_columns.clone(),
    }
}

/// LPNs of the order-header rows, read straight from the table.
fn header_lpns(table: &RawTable, columns: &ColumnIndex, classification: &Classification) -> HashSet<String> {
    table
        .rows
        .iter()
        .zip(&classification.kinds)
        .filter(|(_, kind)| **kind == RowKind::OrderHeader)
        .filter_map(|(row, _)| row.get(columns.lpn).map(str::to_string))
        .collect()
}

impl Pipeline {
    /// Configured check flag rules are registered over the built-in ones.
    pub fn new(config: Config) -> Result<Self> {
        let mut registry = CheckFlagRegistry::builtin();
        for rule in &config.check_flags {
            registry.register(rule.to_rule()?);
        }
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &CheckFlagRegistry {
        &self.registry
    }

    #[instrument(skip(self), fields(input = %input.display()))]
    pub fn run(&self, input: &Path) -> Result<PipelineOutcome> {
        let export = loader::load(input, &self.config.columns)?;
        self.run_loaded(export, &input.display().to_string())
    }

    /// Run every stage after loading. `source` only labels the report.
    pub fn run_loaded(&self, export: LoadedExport, source: &str) -> Result<PipelineOutcome> {
        let LoadedExport { table, columns } = export;

        let classification = classify(&table, &columns);
        if classification.stats.order_headers == 0 {
            return Err(PipelineError::EmptyInput);
        }
        let expected_lpns = header_lpns(&table, &columns, &classification);

        let LinkedData {
            orders,
            checks,
            stats: link_stats,
        } = link(&table, &columns, &classification, &self.config.policies)?;

        let (human_checks, origin_stats) =
            OriginFilter::new(&self.config.origin).apply(checks, columns.check_origin.is_some());

        let order_columns: Vec<String> = columns
            .order_columns
            .iter()
            .map(|&i| table.headers[i].clone())
            .collect();
        let reserved: Vec<String> = order_columns
            .iter()
            .cloned()
            .chain(constants::LEADING_FEATURES.iter().map(|s| s.to_string()))
            .chain(self.registry.list_features().into_iter().map(str::to_string))
            .chain(constants::TRAILING_FEATURES.iter().map(|s| s.to_string()))
            .collect();
        let engine = PivotEngine::new(
            self.config.pivot.max_column_name_len,
            self.config.policies.duplicate_check,
            self.config.policies.name_collision,
            reserved,
        );
        let matrix = engine.pivot(&human_checks);
        let (wide, pivot_stats) = merge(order_columns, orders, matrix);
        let check_columns = wide.check_columns.clone();

        let deriver = FeatureDeriver::new(&self.config.features, self.registry.clone(), &self.config.columns.cost);
        let (feature_table, feature_stats) = deriver.derive(wide);

        let assessment = DefaultQualityGate::new(self.config.validation.clone()).assess(&feature_table, &expected_lpns);
        if assessment.decision == QualityDecision::Reject {
            let failures = assessment.failures();
            error!("Quality gate rejected the feature table: {}", failures.join("; "));
            return Err(PipelineError::Validation { failures });
        }

        info!(
            "Built feature table: {} orders x {} columns",
            feature_table.len(),
            feature_table.header().len()
        );

        let report = TransformationReport {
            report_version: REPORT_VERSION.to_string(),
            input: input_summary(&table, source),
            policies: self.config.policies.clone(),
            classification: classification.stats,
            linking: link_stats,
            origin_filter: origin_stats,
            pivot: PivotReport {
                stats: pivot_stats,
                check_columns,
            },
            features: feature_stats,
            quality: assessment,
            output: None,
        };

        Ok(PipelineOutcome {
            table: feature_table,
            report,
        })
    }

    /// Load, classify and link only.
    #[instrument(skip(self), fields(input = %input.display()))]
    pub fn inspect(&self, input: &Path) -> Result<InspectSummary> {
        let LoadedExport { table, columns } = loader::load(input, &self.config.columns)?;
        let classification = classify(&table, &columns);
        let linked = link(&table, &columns, &classification, &self.config.policies)?;
        let (human_checks, origin_stats) =
            OriginFilter::new(&self.config.origin).apply(linked.checks, columns.check_origin.is_some());
        let names: BTreeSet<String> = human_checks.into_iter().map(|c| c.name).collect();
        let missing_optional_columns: Vec<String> = self
            .config
            .columns
            .optional()
            .iter()
            .filter(|name| table.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing_optional_columns.is_empty() {
            warn!("Optional columns not in the export: {}", missing_optional_columns.join(", "));
        }

        Ok(InspectSummary {
            input: input_summary(&table, &input.display().to_string()),
            headers: table.headers.clone(),
            missing_optional_columns,
            classification: classification.stats,
            linking: linked.stats,
            origin_filter: origin_stats,
            distinct_check_names: names.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnConfig, OrphanPolicy};
    use crate::domain::CheckStatus;
    use crate::pipeline::ingestion::loader::parse_bytes;

    const HEADER: &str = "LPN,Amazon COGS,Disposition,Product Category,Checks/Title,Checks/Status,Checks/Failed by decision logic Automatically";

    fn run(body: &str, config: Config) -> Result<PipelineOutcome> {
        let text = format!("{HEADER}\n{body}");
        let columns = ColumnConfig::default();
        let table = parse_bytes(text.as_bytes(), "mem", &columns)?;
        let index = ColumnIndex::resolve(&table, &columns)?;
        Pipeline::new(config)?.run_loaded(LoadedExport { table, columns: index }, "mem")
    }

    #[test]
    fn runs_all_stages_on_a_small_export() {
        let outcome = run(
            "A1,1800,Sellable,Home/Kitchen,,,\n\
             ,,,,Does it work?,Passed,\n\
             ,,,,Is it Fraud?,Failed,FALSE\n\
             ,,,,Is it cosmetic?,Failed,TRUE\n\
             B2,2600,Liquidate,Home/Garden,,,\n",
            Config::default(),
        )
        .unwrap();

        let table = &outcome.table;
        assert_eq!(table.len(), 2);
        let header = table.header();
        assert_eq!(&header[..3], &["LPN", "Amazon COGS", "Disposition"]);
        assert!(header.contains(&"Does_it_work".to_string()));
        assert!(!header.contains(&"Is_it_cosmetic".to_string()));
        assert_eq!(table.wide.cells[0], vec![Some(CheckStatus::Passed), Some(CheckStatus::Failed)]);
        assert_eq!(table.features[1].total_checks, 0);

        let report = &outcome.report;
        assert_eq!(report.origin_filter.automated_removed, 1);
        assert_eq!(report.pivot.stats.columns_created, 2);
        assert_eq!(report.classification.order_headers, 2);
        assert!(report.output.is_none());
    }

    #[test]
    fn export_without_headers_is_empty_input() {
        let result = run(",,,,Does it work?,Passed,\n", Config::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn strict_orphan_policy_propagates() {
        let mut config = Config::default();
        config.policies.orphan_checks = OrphanPolicy::Fail;
        let result = run(",,,,Does it work?,Passed,\nA1,1800,Sellable,,,,\n", config);
        assert!(matches!(result, Err(PipelineError::LinkIntegrity { orphans: 1 })));
    }

    #[test]
    fn inspect_summarizes_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("orders.csv");
        std::fs::write(
            &input,
            format!(
                "{HEADER}\n\
                 A1,1800,Sellable,Home/Kitchen,,,\n\
                 ,,,,Is it Fraud?,Failed,FALSE\n\
                 ,,,,Does it work?,Passed,\n\
                 ,,,,Is it cosmetic?,Failed,TRUE\n\
                 B2,2600,Liquidate,Home/Garden,,,\n\
                 ,,,,Does it work?,Failed,\n"
            ),
        )
        .unwrap();

        let summary = Pipeline::new(Config::default()).unwrap().inspect(&input).unwrap();
        assert_eq!(summary.classification.order_headers, 2);
        assert_eq!(summary.classification.check_steps, 4);
        assert_eq!(summary.linking.orders, 2);
        assert_eq!(summary.origin_filter.automated_removed, 1);
        assert_eq!(
            summary.distinct_check_names,
            vec!["Does it work?".to_string(), "Is it Fraud?".to_string()]
        );
        assert!(summary.missing_optional_columns.contains(&"Product".to_string()));
        assert!(summary.missing_optional_columns.contains(&"Result of Repair".to_string()));
        assert!(!summary.missing_optional_columns.contains(&"Product Category".to_string()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn check_named_like_a_feature_is_suffixed() {
        let outcome = run("A1,1800,Sellable,,,,\n,,,,Total checks,Passed,\n", Config::default()).unwrap();
        let header = outcome.table.header();
        // "Total_checks" differs in case from the feature column and is kept as is
        assert!(header.contains(&"Total_checks".to_string()));

        let outcome = run("A1,1800,Sellable,,,,\n,,,,total checks,Passed,\n", Config::default()).unwrap();
        let header = outcome.table.header();
        assert!(header.contains(&"total_checks_check".to_string()));
        assert_eq!(outcome.report.pivot.stats.reserved_renames.len(), 1);
    }
}
