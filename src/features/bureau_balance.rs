// 📅 Bureau balance features - monthly status of each bureau credit
// Two-step roll-up: month rows -> SK_ID_BUREAU -> SK_ID_CURR (via bureau)

use super::{agg, group, keyed, roll_up_to_customer, FeatureAggregator, FeatureSet, SourceTables, Stat};
use crate::config::{SK_ID_BUREAU, SK_ID_CURR};
use crate::error::Result;
use crate::io::{has_column, require_columns};
use polars::prelude::*;
use tracing::info;

const MONTHS_BALANCE: &str = "MONTHS_BALANCE";
const STATUS: &str = "STATUS";
const STATUS_SEVERITY: &str = "status_severity";

/// Days-past-due bucket of a monthly STATUS code.
///
/// `C` (closed), `X` (unknown) and `0` carry no delinquency; `1`..`5` are
/// increasingly late buckets. Anything else, padded codes included, counts as 0.
pub fn severity_of(status: &str) -> i32 {
    match status {
        "1" => 1,
        "2" => 2,
        "3" => 3,
        "4" => 4,
        "5" => 5,
        _ => 0,
    }
}

/// Severity column for every row; all zeros without a STATUS column
pub fn status_severity(df: &DataFrame) -> Result<Series> {
    let values: Vec<i32> = if has_column(df, STATUS) {
        let status = df.column(STATUS)?.cast(&DataType::String)?;
        let mapped = status
            .str()?
            .into_iter()
            .map(|s| s.map_or(0, severity_of))
            .collect();
        mapped
    } else {
        vec![0; df.height()]
    };

    Ok(Series::new(STATUS_SEVERITY, values))
}

pub struct BureauBalanceAggregator;

impl FeatureAggregator for BureauBalanceAggregator {
    fn feature_set(&self) -> FeatureSet {
        FeatureSet::BureauBalance
    }

    fn sources(&self) -> &'static [&'static str] {
        &["bureau_balance", "bureau"]
    }

    fn aggregate(&self, tables: &SourceTables) -> Result<DataFrame> {
        let mut bb = tables.get("bureau_balance")?.clone();
        require_columns(&bb, &[SK_ID_BUREAU, MONTHS_BALANCE], "bureau_balance")?;

        let severity = status_severity(&bb)?;
        bb.with_column(severity)?;

        let per_credit = group(
            keyed(&bb, &[SK_ID_BUREAU]),
            SK_ID_BUREAU,
            vec![
                agg(MONTHS_BALANCE, Stat::Count, "bb_months_count"),
                agg(MONTHS_BALANCE, Stat::Min, "bb_months_min"),
                agg(MONTHS_BALANCE, Stat::Max, "bb_months_max"),
                agg(STATUS_SEVERITY, Stat::Max, "bb_status_max"),
                agg(STATUS_SEVERITY, Stat::Mean, "bb_status_mean"),
            ],
        )
        .collect()?;
        info!(shape = ?per_credit.shape(), "bureau_balance aggregated per credit");

        let bureau = tables.get("bureau")?;
        require_columns(bureau, &[SK_ID_BUREAU, SK_ID_CURR], "bureau")?;
        let mapping = keyed(bureau, &[SK_ID_BUREAU, SK_ID_CURR])
            .select([col(SK_ID_BUREAU), col(SK_ID_CURR)]);

        roll_up_to_customer(
            mapping,
            per_credit.lazy(),
            SK_ID_BUREAU,
            "bureau + bureau_balance",
            vec![
                agg("bb_months_count", Stat::Count, "bb_credits_count"),
                agg("bb_status_max", Stat::Max, "bb_status_max"),
                agg("bb_status_mean", Stat::Mean, "bb_status_mean"),
                agg("bb_months_min", Stat::Min, "bb_months_min"),
                agg("bb_months_max", Stat::Max, "bb_months_max"),
            ],
        )
    }
}
