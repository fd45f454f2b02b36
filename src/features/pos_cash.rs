// 🛒 POS / cash loan features - monthly snapshots of previous credits
// Two-step roll-up: month rows -> SK_ID_PREV -> SK_ID_CURR

use super::{
    agg, flag, group, keyed, previous_mapping, roll_up_to_customer, FeatureAggregator, FeatureSet,
    SourceTables, Stat,
};
use crate::config::SK_ID_PREV;
use crate::error::Result;
use crate::io::{has_column, require_columns};
use polars::prelude::*;
use tracing::info;

const MONTHS_BALANCE: &str = "MONTHS_BALANCE";
const SK_DPD: &str = "SK_DPD";

/// `is_late` / `late_days` from days past due, zeros without SK_DPD
pub(crate) fn late_flags(df: &DataFrame) -> [Expr; 2] {
    if has_column(df, SK_DPD) {
        [
            flag(col(SK_DPD).gt(lit(0))).alias("is_late"),
            col(SK_DPD).alias("late_days"),
        ]
    } else {
        [lit(0i32).alias("is_late"), lit(0i32).alias("late_days")]
    }
}

pub struct PosCashAggregator;

impl FeatureAggregator for PosCashAggregator {
    fn feature_set(&self) -> FeatureSet {
        FeatureSet::PosCash
    }

    fn sources(&self) -> &'static [&'static str] {
        &["pos_cash_balance", "previous_application"]
    }

    fn aggregate(&self, tables: &SourceTables) -> Result<DataFrame> {
        let pos = tables.get("pos_cash_balance")?;
        require_columns(pos, &[SK_ID_PREV, MONTHS_BALANCE], "POS_CASH_balance")?;

        let per_prev = group(
            keyed(pos, &[SK_ID_PREV]).with_columns(late_flags(pos)),
            SK_ID_PREV,
            vec![
                agg(MONTHS_BALANCE, Stat::Count, "pos_months_count"),
                agg(MONTHS_BALANCE, Stat::Min, "pos_months_min"),
                agg(MONTHS_BALANCE, Stat::Max, "pos_months_max"),
                agg("is_late", Stat::Mean, "pos_late_ratio"),
                agg("late_days", Stat::Max, "pos_late_days_max"),
            ],
        )
        .collect()?;
        info!(shape = ?per_prev.shape(), "POS aggregated per SK_ID_PREV");

        roll_up_to_customer(
            previous_mapping(tables)?,
            per_prev.lazy(),
            SK_ID_PREV,
            "previous_application + POS",
            vec![
                agg("pos_months_count", Stat::Count, "pos_prev_count"),
                agg("pos_late_ratio", Stat::Mean, "pos_late_ratio"),
                agg("pos_late_days_max", Stat::Max, "pos_late_days_max"),
                agg("pos_months_min", Stat::Min, "pos_months_min"),
                agg("pos_months_max", Stat::Max, "pos_months_max"),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{assert_close, value_at};

    fn previous() -> DataFrame {
        df!(
            "SK_ID_PREV" => &[100i64, 101, 200],
            "SK_ID_CURR" => &[1i64, 1, 2]
        )
        .unwrap()
    }

    #[test]
    fn test_pos_cash_late_ratios() {
        let pos = df!(
            "SK_ID_PREV" => &[100i64, 100, 100, 100, 101, 101],
            "MONTHS_BALANCE" => &[-1i64, -2, -3, -4, -1, -2],
            "SK_DPD" => &[Some(0i64), Some(3), Some(0), None, Some(10), Some(0)]
        )
        .unwrap();
        let tables = SourceTables::new()
            .with("pos_cash_balance", pos)
            .with("previous_application", previous());

        let features = PosCashAggregator.aggregate(&tables).unwrap();

        assert_eq!(features.height(), 2);
        assert_close(value_at(&features, "pos_prev_count", 1), 2.0);
        // prev 100: 1 late of 4 months, prev 101: 1 late of 2 months
        assert_close(value_at(&features, "pos_late_ratio", 1), (0.25 + 0.5) / 2.0);
        assert_close(value_at(&features, "pos_late_days_max", 1), 10.0);
        assert_close(value_at(&features, "pos_months_min", 1), -4.0);
        assert_close(value_at(&features, "pos_months_max", 1), -1.0);
        // customer 2 has a previous application without POS history
        assert_close(value_at(&features, "pos_prev_count", 2), 0.0);
        assert!(value_at(&features, "pos_late_ratio", 2).is_none());
    }

    #[test]
    fn test_pos_cash_without_dpd_column() {
        let pos = df!(
            "SK_ID_PREV" => &[100i64, 200],
            "MONTHS_BALANCE" => &[-1i64, -1]
        )
        .unwrap();
        let tables = SourceTables::new()
            .with("pos_cash_balance", pos)
            .with("previous_application", previous());

        let features = PosCashAggregator.aggregate(&tables).unwrap();

        assert_close(value_at(&features, "pos_late_ratio", 2), 0.0);
        assert_close(value_at(&features, "pos_late_days_max", 1), 0.0);
    }

    #[test]
    fn test_pos_cash_requires_previous_mapping() {
        let pos = df!("SK_ID_PREV" => &[1i64], "MONTHS_BALANCE" => &[0i64]).unwrap();
        let tables = SourceTables::new().with("pos_cash_balance", pos);

        assert!(PosCashAggregator.aggregate(&tables).is_err());
    }
}
