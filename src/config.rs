//! Pipeline configuration loaded from an optional TOML file.
//!
//! Every section falls back to the defaults in [`crate::constants`], so an
//! empty file (or no file at all) reproduces the reference behavior.
//!
//! ```toml
//! [columns]
//! cost = "Amazon COGS"
//! drop = ["Activity Exception Decoration"]
//!
//! [policies]
//! duplicate_order = "keep_first"
//! duplicate_check = "last_write_wins"
//! orphan_checks = "warn"
//! name_collision = "merge"
//!
//! [[check_flags]]
//! feature = "battery_check_failed"
//! target = "Failed"
//! any_of = ["battery"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants;
use crate::domain::CheckStatus;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::features::registry::{CheckFlagRule, Matcher};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default)]
    pub policies: PolicyConfig,
    #[serde(default)]
    pub pivot: PivotConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    /// Check flag rules. Empty means the built-in registry.
    #[serde(default)]
    pub check_flags: Vec<CheckFlagRuleConfig>,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Source column names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub lpn: String,
    pub cost: String,
    pub disposition: String,
    pub product: String,
    pub category: String,
    pub result_of_repair: String,
    pub scheduled: String,
    pub started: String,
    pub completed: String,
    pub shipped: String,
    pub check_name: String,
    pub check_status: String,
    pub check_origin: String,
    /// Columns removed before classification
    pub drop: Vec<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            lpn: constants::LPN_COLUMN.to_string(),
            cost: constants::COST_COLUMN.to_string(),
            disposition: constants::DISPOSITION_COLUMN.to_string(),
            product: constants::PRODUCT_COLUMN.to_string(),
            category: constants::CATEGORY_COLUMN.to_string(),
            result_of_repair: constants::RESULT_COLUMN.to_string(),
            scheduled: constants::SCHEDULED_COLUMN.to_string(),
            started: constants::STARTED_COLUMN.to_string(),
            completed: constants::COMPLETED_COLUMN.to_string(),
            shipped: constants::SHIPPED_COLUMN.to_string(),
            check_name: constants::CHECK_NAME_COLUMN.to_string(),
            check_status: constants::CHECK_STATUS_COLUMN.to_string(),
            check_origin: constants::CHECK_ORIGIN_COLUMN.to_string(),
            drop: constants::DROPPED_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ColumnConfig {
    /// Columns whose absence is fatal.
    pub fn required(&self) -> [&str; 5] {
        [
            self.lpn.as_str(),
            self.cost.as_str(),
            self.disposition.as_str(),
            self.check_name.as_str(),
            self.check_status.as_str(),
        ]
    }

    /// Columns the export normally carries but can do without.
    pub fn optional(&self) -> [&str; 8] {
        [
            self.product.as_str(),
            self.category.as_str(),
            self.result_of_repair.as_str(),
            self.scheduled.as_str(),
            self.started.as_str(),
            self.completed.as_str(),
            self.shipped.as_str(),
            self.check_origin.as_str(),
        ]
    }

    /// Columns that only carry check-step data and are folded into the pivot.
    pub fn check_level(&self) -> [&str; 3] {
        [
            self.check_name.as_str(),
            self.check_status.as_str(),
            self.check_origin.as_str(),
        ]
    }
}

/// Which header wins when the same LPN appears on more than one header row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateOrderPolicy {
    #[default]
    KeepFirst,
    KeepLast,
}

/// Which execution wins when a check runs more than once on the same order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateCheckPolicy {
    #[default]
    LastWriteWins,
    FirstWriteWins,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Count, report and exclude orphans
    #[default]
    Warn,
    /// Abort the run
    Fail,
}

/// What to do when two raw check names normalize to the same identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Share one column (reported)
    #[default]
    Merge,
    /// Give later names `_2`, `_3`, ... (reported)
    Suffix,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub duplicate_order: DuplicateOrderPolicy,
    pub duplicate_check: DuplicateCheckPolicy,
    pub orphan_checks: OrphanPolicy,
    pub name_collision: CollisionPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    pub max_column_name_len: usize,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            max_column_name_len: constants::MAX_CHECK_COLUMN_LEN,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Indicator values (case-insensitive) meaning the result was decided automatically
    pub automated_tokens: Vec<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            automated_tokens: constants::AUTOMATED_TOKENS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub cogs_bin_edges: Vec<f64>,
    pub cogs_bin_labels: Vec<String>,
    pub outlier_iqr_multiplier: f64,
    pub date_formats: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            cogs_bin_edges: constants::COGS_BIN_EDGES.to_vec(),
            cogs_bin_labels: constants::COGS_BIN_LABELS.iter().map(|s| s.to_string()).collect(),
            outlier_iqr_multiplier: constants::OUTLIER_IQR_MULTIPLIER,
            date_formats: constants::DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A `[[check_flags]]` entry. Exactly one of `any_of`, `all_of` or `pattern` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckFlagRuleConfig {
    pub feature: String,
    pub target: CheckStatus,
    #[serde(default)]
    pub any_of: Vec<String>,
    #[serde(default)]
    pub all_of: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl CheckFlagRuleConfig {
    pub fn to_rule(&self) -> Result<CheckFlagRule> {
        let matcher = match (self.any_of.is_empty(), self.all_of.is_empty(), &self.pattern) {
            (false, true, None) => Matcher::AnyOf(self.any_of.clone()),
            (true, false, None) => Matcher::AllOf(self.all_of.clone()),
            (true, true, Some(pattern)) => Matcher::pattern(pattern)?,
            _ => {
                return Err(PipelineError::Config(format!(
                    "check flag '{}' must set exactly one of any_of, all_of or pattern",
                    self.feature
                )))
            }
        };
        Ok(CheckFlagRule::new(&self.feature, self.target, matcher))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub valid_dispositions: Vec<String>,
    pub min_expected_cogs: Option<f64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            valid_dispositions: constants::VALID_DISPOSITIONS.iter().map(|s| s.to_string()).collect(),
            min_expected_cogs: Some(constants::MIN_EXPECTED_COGS),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let edges = &self.features.cogs_bin_edges;
        if edges.len() < 2 {
            return Err(PipelineError::Config("cogs_bin_edges needs at least two edges".into()));
        }
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PipelineError::Config("cogs_bin_edges must be strictly increasing".into()));
        }
        if self.features.cogs_bin_labels.len() != edges.len() - 1 {
            return Err(PipelineError::Config(format!(
                "expected {} cogs_bin_labels for {} edges, got {}",
                edges.len() - 1,
                edges.len(),
                self.features.cogs_bin_labels.len()
            )));
        }
        if self.pivot.max_column_name_len == 0 {
            return Err(PipelineError::Config("max_column_name_len must be positive".into()));
        }
        for rule in &self.check_flags {
            rule.to_rule()?;
        }
        Ok(())
    }
}
