// 🏦 Bureau features - credits reported by other institutions
// Direct customer granularity: group bureau rows by SK_ID_CURR

use super::{agg, group, keyed, present_columns, FeatureAggregator, FeatureSet, SourceTables, Stat};
use crate::config::SK_ID_CURR;
use crate::error::Result;
use crate::io::{has_column, require_columns};
use polars::prelude::*;
use tracing::info;

pub const BUREAU_NUMERIC: [&str; 6] = [
    "AMT_CREDIT_SUM",
    "AMT_CREDIT_SUM_DEBT",
    "AMT_CREDIT_SUM_OVERDUE",
    "AMT_CREDIT_MAX_OVERDUE",
    "DAYS_CREDIT",
    "DAYS_CREDIT_ENDDATE",
];

const STATS: [Stat; 3] = [Stat::Mean, Stat::Max, Stat::Sum];

const DEBT_SUM: &str = "bureau_AMT_CREDIT_SUM_DEBT_sum";
const CREDIT_SUM: &str = "bureau_AMT_CREDIT_SUM_sum";

pub struct BureauAggregator;

impl FeatureAggregator for BureauAggregator {
    fn feature_set(&self) -> FeatureSet {
        FeatureSet::Bureau
    }

    fn sources(&self) -> &'static [&'static str] {
        &["bureau"]
    }

    fn aggregate(&self, tables: &SourceTables) -> Result<DataFrame> {
        let bureau = tables.get("bureau")?;
        require_columns(bureau, &[SK_ID_CURR], "bureau")?;

        let numeric = present_columns(bureau, &BUREAU_NUMERIC);
        info!(columns = ?numeric, "bureau numeric columns used");

        let mut aggs: Vec<Expr> = numeric
            .iter()
            .flat_map(|c| {
                STATS
                    .iter()
                    .map(move |stat| agg(c, *stat, &format!("bureau_{}_{}", c, stat.suffix())))
            })
            .collect();
        aggs.push(len().alias("bureau_credit_count"));

        let mut features = group(keyed(bureau, &[SK_ID_CURR]), SK_ID_CURR, aggs).collect()?;
        info!(shape = ?features.shape(), "aggregated bureau");

        if has_column(&features, DEBT_SUM) && has_column(&features, CREDIT_SUM) {
            features = features
                .lazy()
                .with_column(
                    (col(DEBT_SUM).cast(DataType::Float64) / col(CREDIT_SUM).cast(DataType::Float64))
                        .alias("bureau_debt_to_credit_ratio"),
                )
                .collect()?;
        }

        Ok(features)
    }
}
