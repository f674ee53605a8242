/// Column names used by the repair-order export. These are the defaults for
/// `[columns]` in the configuration file.

// Order-level columns (populated on header rows only)
pub const LPN_COLUMN: &str = "LPN";
pub const COST_COLUMN: &str = "Amazon COGS";
pub const DISPOSITION_COLUMN: &str = "Disposition";
pub const PRODUCT_COLUMN: &str = "Product";
pub const CATEGORY_COLUMN: &str = "Product Category";
pub const RESULT_COLUMN: &str = "Result of Repair";
pub const SCHEDULED_COLUMN: &str = "Scheduled Date";
pub const STARTED_COLUMN: &str = "Started On";
pub const COMPLETED_COLUMN: &str = "Completed On";
pub const SHIPPED_COLUMN: &str = "Shipped Date";

// Check-level columns (populated on check step rows only)
pub const CHECK_NAME_COLUMN: &str = "Checks/Title";
pub const CHECK_STATUS_COLUMN: &str = "Checks/Status";
pub const CHECK_ORIGIN_COLUMN: &str = "Checks/Failed by decision logic Automatically";

/// Columns removed before anything else happens.
pub const DROPPED_COLUMNS: &[&str] = &["Activity Exception Decoration"];

/// Textual encodings of "true" for the execution-origin indicator.
pub const AUTOMATED_TOKENS: &[&str] = &["TRUE", "T", "1", "YES", "Y"];

/// Disposition that marks an order as liquidated.
pub const LIQUIDATE_DISPOSITION: &str = "Liquidate";

/// Dispositions accepted by the business rules, including legacy palletizer variants.
pub const VALID_DISPOSITIONS: &[&str] = &[
    "Liquidate",
    "Sellable",
    "Liquidation Palletizer",
    "Sellable Palletizer",
];

/// The export is filtered to orders with cost above this amount.
pub const MIN_EXPECTED_COGS: f64 = 1000.0;

pub const COGS_BIN_EDGES: &[f64] = &[0.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0, f64::INFINITY];
pub const COGS_BIN_LABELS: &[&str] = &["<$1K", "$1K-$1.5K", "$1.5K-$2K", "$2K-$2.5K", "$2.5K-$3K", "$3K+"];

/// Tukey fence multiplier for `high_value_flag`.
pub const OUTLIER_IQR_MULTIPLIER: f64 = 1.5;

pub const MAX_CHECK_COLUMN_LEN: usize = 50;

/// Suffix applied to a check column whose identifier clashes with an order or feature column.
pub const RESERVED_NAME_SUFFIX: &str = "_check";

/// Formats tried in order when parsing the date columns.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%Y-%m-%d",
    "%m/%d/%Y",
];

// Derived feature column names, in output order
pub const IS_LIQUIDATED: &str = "is_liquidated";
pub const COGS_BIN: &str = "cogs_bin";
pub const PROCESSING_DAYS: &str = "processing_days";
pub const CATEGORY_GROUP: &str = "category_group";
pub const HIGH_VALUE_FLAG: &str = "high_value_flag";
pub const TOTAL_CHECKS: &str = "total_checks";
pub const FAILED_CHECKS_COUNT: &str = "failed_checks_count";
pub const PASSED_CHECKS_COUNT: &str = "passed_checks_count";
pub const FAILURE_RATE: &str = "failure_rate";
pub const CHECK_EFFICIENCY: &str = "check_efficiency";
pub const VALUE_LOST: &str = "value_lost";
pub const RECOVERY_POTENTIAL: &str = "recovery_potential";
pub const DAYS_TO_SHIP: &str = "days_to_ship";

// Built-in check flag features
pub const FRAUD_CHECK_FAILED: &str = "fraud_check_failed";
pub const COSMETIC_CHECK_FAILED: &str = "cosmetic_check_failed";
pub const REPAIRABLE_CHECK_FAILED: &str = "repairable_check_failed";
pub const WORKS_CHECK_PASSED: &str = "works_check_passed";
pub const FACTORY_SEALED_CHECK_PASSED: &str = "factory_sealed_check_passed";

/// Derived columns that precede the check flags in the output.
pub const LEADING_FEATURES: &[&str] = &[
    IS_LIQUIDATED,
    COGS_BIN,
    PROCESSING_DAYS,
    CATEGORY_GROUP,
    HIGH_VALUE_FLAG,
    TOTAL_CHECKS,
    FAILED_CHECKS_COUNT,
    PASSED_CHECKS_COUNT,
    FAILURE_RATE,
    CHECK_EFFICIENCY,
];

/// Derived columns that follow the check flags in the output.
pub const TRAILING_FEATURES: &[&str] = &[VALUE_LOST, RECOVERY_POTENTIAL, DAYS_TO_SHIP];
