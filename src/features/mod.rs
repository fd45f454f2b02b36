// 🏗️ Feature Aggregators - one module per secondary table
// Every aggregator rolls its table up to exactly one row per SK_ID_CURR.
//
// Granularities:
//   bureau                -> SK_ID_CURR (direct)
//   bureau_balance        -> SK_ID_BUREAU -> SK_ID_CURR (via bureau)
//   previous_application  -> SK_ID_CURR (direct)
//   POS_CASH_balance      -> SK_ID_PREV -> SK_ID_CURR (via previous_application)
//   installments_payments -> SK_ID_PREV -> SK_ID_CURR (via previous_application)
//   credit_card_balance   -> SK_ID_PREV -> SK_ID_CURR (via previous_application)

pub mod bureau;
pub mod bureau_balance;
pub mod credit_card;
pub mod installments;
pub mod pos_cash;
pub mod previous;

pub use bureau::BureauAggregator;
pub use bureau_balance::BureauBalanceAggregator;
pub use credit_card::CreditCardAggregator;
pub use installments::InstallmentsAggregator;
pub use pos_cash::PosCashAggregator;
pub use previous::PreviousApplicationAggregator;

use crate::config::{PipelineConfig, SK_ID_CURR, SK_ID_PREV};
use crate::error::{PipelineError, Result};
use crate::io::{load_table, require_columns, write_parquet};
use crate::merge::check_unique_key;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

// ============================================================================
// CORE TYPES
// ============================================================================

/// FeatureSet - identifies one aggregated feature table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureSet {
    Bureau,
    BureauBalance,
    PreviousApplication,
    PosCash,
    Installments,
    CreditCard,
}

impl FeatureSet {
    /// Merge order of the modeling table
    pub const ALL: [FeatureSet; 6] = [
        FeatureSet::Bureau,
        FeatureSet::BureauBalance,
        FeatureSet::PreviousApplication,
        FeatureSet::PosCash,
        FeatureSet::Installments,
        FeatureSet::CreditCard,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureSet::Bureau => "bureau",
            FeatureSet::BureauBalance => "bureau_balance",
            FeatureSet::PreviousApplication => "previous_application",
            FeatureSet::PosCash => "pos_cash",
            FeatureSet::Installments => "installments",
            FeatureSet::CreditCard => "credit_card",
        }
    }

    /// Table name of the aggregated output, e.g. "feat_bureau"
    pub fn output_name(&self) -> String {
        format!("feat_{}", self.name())
    }

    pub fn output_file(&self) -> String {
        format!("{}.parquet", self.output_name())
    }

    /// Accepts both "bureau" and "feat_bureau"
    pub fn from_name(name: &str) -> Option<FeatureSet> {
        let short = name.strip_prefix("feat_").unwrap_or(name);
        FeatureSet::ALL.into_iter().find(|set| set.name() == short)
    }
}

impl std::fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw tables an aggregator reads, keyed by logical name
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    tables: HashMap<String, DataFrame>,
}

impl SourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, df: DataFrame) {
        self.tables.insert(name.to_string(), df);
    }

    pub fn with(mut self, name: &str, df: DataFrame) -> Self {
        self.insert(name, df);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&DataFrame> {
        self.tables.get(name).ok_or_else(|| PipelineError::UnknownTable {
            name: name.to_string(),
            options: self.tables.keys().cloned().collect(),
        })
    }
}

/// FeatureAggregator - rolls one secondary table up to customer level
pub trait FeatureAggregator: Send + Sync {
    fn feature_set(&self) -> FeatureSet;

    fn name(&self) -> String {
        self.feature_set().output_name()
    }

    fn output_file(&self) -> String {
        self.feature_set().output_file()
    }

    /// Raw tables read by `aggregate`
    fn sources(&self) -> &'static [&'static str];

    /// Produce exactly one row per SK_ID_CURR
    fn aggregate(&self, tables: &SourceTables) -> Result<DataFrame>;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

pub fn get_aggregator(set: FeatureSet) -> Box<dyn FeatureAggregator> {
    match set {
        FeatureSet::Bureau => Box::new(BureauAggregator),
        FeatureSet::BureauBalance => Box::new(BureauBalanceAggregator),
        FeatureSet::PreviousApplication => Box::new(PreviousApplicationAggregator),
        FeatureSet::PosCash => Box::new(PosCashAggregator),
        FeatureSet::Installments => Box::new(InstallmentsAggregator),
        FeatureSet::CreditCard => Box::new(CreditCardAggregator),
    }
}

pub fn all_aggregators() -> Vec<Box<dyn FeatureAggregator>> {
    FeatureSet::ALL.into_iter().map(get_aggregator).collect()
}

// ============================================================================
// SHARED BUILDING BLOCKS
// ============================================================================

/// Aggregation statistic; `Count` counts non-null values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Mean,
    Max,
    Min,
    Sum,
    Count,
}

impl Stat {
    pub fn suffix(&self) -> &'static str {
        match self {
            Stat::Mean => "mean",
            Stat::Max => "max",
            Stat::Min => "min",
            Stat::Sum => "sum",
            Stat::Count => "count",
        }
    }

    pub fn apply(&self, expr: Expr) -> Expr {
        match self {
            Stat::Mean => expr.mean(),
            Stat::Max => expr.max(),
            Stat::Min => expr.min(),
            Stat::Sum => expr.sum(),
            Stat::Count => expr.count(),
        }
    }
}

/// `stat(source) AS alias`
pub(crate) fn agg(source: &str, stat: Stat, alias: &str) -> Expr {
    stat.apply(col(source)).alias(alias)
}

/// Candidate columns actually present, in candidate order
pub(crate) fn present_columns<'a>(df: &DataFrame, candidates: &[&'a str]) -> Vec<&'a str> {
    let names = df.get_column_names();
    candidates
        .iter()
        .copied()
        .filter(|c| names.contains(c))
        .collect()
}

/// Lazy view of `df` with the given id columns normalized to Int64
pub(crate) fn keyed(df: &DataFrame, keys: &[&str]) -> LazyFrame {
    let casts: Vec<Expr> = keys
        .iter()
        .map(|k| col(k).cast(DataType::Int64))
        .collect();
    df.clone().lazy().with_columns(casts)
}

/// Group by `key` (null keys dropped), first-appearance order
pub(crate) fn group(lf: LazyFrame, key: &str, aggs: Vec<Expr>) -> LazyFrame {
    lf.filter(col(key).is_not_null())
        .group_by_stable([col(key)])
        .agg(aggs)
}

/// `(SK_ID_PREV, SK_ID_CURR)` pairs from previous_application
pub(crate) fn previous_mapping(tables: &SourceTables) -> Result<LazyFrame> {
    let prev = tables.get("previous_application")?;
    require_columns(prev, &[SK_ID_PREV, SK_ID_CURR], "previous_application")?;
    Ok(keyed(prev, &[SK_ID_PREV, SK_ID_CURR]).select([col(SK_ID_PREV), col(SK_ID_CURR)]))
}

/// Left-join child-level aggregates onto the child -> customer mapping and
/// aggregate again per customer
pub(crate) fn roll_up_to_customer(
    mapping: LazyFrame,
    per_child: LazyFrame,
    child_key: &str,
    label: &str,
    aggs: Vec<Expr>,
) -> Result<DataFrame> {
    let merged = mapping
        .join(
            per_child,
            [col(child_key)],
            [col(child_key)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    info!(shape = ?merged.shape(), "merged {}", label);

    let customers = group(merged.lazy(), SK_ID_CURR, aggs).collect()?;
    Ok(customers)
}

/// Column cast to Float64 so integer division never truncates
pub(crate) fn float_col(name: &str) -> Expr {
    col(name).cast(DataType::Float64)
}

/// 1 when `expr` holds, 0 otherwise (including null)
pub(crate) fn flag(condition: Expr) -> Expr {
    when(condition).then(lit(1i32)).otherwise(lit(0i32))
}

// ============================================================================
// STAGE RUNNER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOutput {
    pub feature_set: FeatureSet,
    pub rows: usize,
    pub columns: usize,
    pub path: String,
}

/// Build one feature table (or all of them) and write each to the
/// processed directory. Raw tables shared by several aggregators are
/// loaded once.
pub fn run_features(config: &PipelineConfig, only: Option<FeatureSet>) -> Result<Vec<FeatureOutput>> {
    let sets: Vec<FeatureSet> = match only {
        Some(set) => vec![set],
        None => FeatureSet::ALL.to_vec(),
    };

    let mut tables = SourceTables::new();
    let mut outputs = Vec::new();

    for set in sets {
        let aggregator = get_aggregator(set);

        for source in aggregator.sources() {
            if !tables.contains(source) {
                let res = load_table(config, source, None)?;
                info!(table = *source, shape = ?res.df.shape(), "loaded source");
                tables.insert(source, res.df);
            }
        }

        let mut features = aggregator.aggregate(&tables)?;
        check_unique_key(&features, SK_ID_CURR, &aggregator.name())?;
        info!(feature_set = %set, shape = ?features.shape(), "final features per customer");

        let path = config.paths.processed().join(aggregator.output_file());
        write_parquet(&mut features, &path)?;
        info!(path = %path.display(), "{} features saved", set);

        outputs.push(FeatureOutput {
            feature_set: set,
            rows: features.height(),
            columns: features.width(),
            path: path.display().to_string(),
        });
    }

    Ok(outputs)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Value of `column` on the row whose SK_ID_CURR equals `key`
    pub fn value_at(df: &DataFrame, column: &str, key: i64) -> Option<f64> {
        let keys = df.column(SK_ID_CURR).ok()?.cast(&DataType::Int64).ok()?;
        let values = df.column(column).ok()?.cast(&DataType::Float64).ok()?;
        let row = keys.i64().ok()?.into_iter().position(|k| k == Some(key))?;
        values.f64().ok()?.get(row)
    }

    pub fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap_or_else(|| panic!("expected {expected}, got null"));
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bureau", Some(FeatureSet::Bureau))]
    #[case("feat_pos_cash", Some(FeatureSet::PosCash))]
    #[case("credit_card", Some(FeatureSet::CreditCard))]
    #[case("feat_unknown", None)]
    fn test_feature_set_from_name(#[case] name: &str, #[case] expected: Option<FeatureSet>) {
        assert_eq!(FeatureSet::from_name(name), expected);
    }

    #[test]
    fn test_output_names() {
        assert_eq!(FeatureSet::PreviousApplication.output_name(), "feat_previous_application");
        assert_eq!(FeatureSet::Installments.output_file(), "feat_installments.parquet");

        let aggregator = get_aggregator(FeatureSet::PosCash);
        assert_eq!(aggregator.name(), "feat_pos_cash");
        assert_eq!(aggregator.output_file(), "feat_pos_cash.parquet");
    }

    #[test]
    fn test_registry_follows_merge_order() {
        let sets: Vec<FeatureSet> = all_aggregators().iter().map(|a| a.feature_set()).collect();
        assert_eq!(sets, FeatureSet::ALL.to_vec());
    }

    #[test]
    fn test_source_tables_missing_table() {
        let tables = SourceTables::new();
        assert!(matches!(
            tables.get("bureau"),
            Err(PipelineError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_present_columns_keeps_candidate_order() {
        let df = df!("B" => &[1i64], "A" => &[2i64]).unwrap();
        assert_eq!(present_columns(&df, &["A", "C", "B"]), vec!["A", "B"]);
    }
}
