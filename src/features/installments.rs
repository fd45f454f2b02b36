// 💸 Installment features - scheduled vs actual repayments of previous credits

use super::{
    agg, flag, float_col, group, keyed, previous_mapping, roll_up_to_customer, FeatureAggregator,
    FeatureSet, SourceTables, Stat,
};
use crate::config::SK_ID_PREV;
use crate::error::Result;
use crate::io::{has_column, require_columns};
use polars::prelude::*;
use tracing::info;

const DAYS_INSTALMENT: &str = "DAYS_INSTALMENT";
const DAYS_ENTRY_PAYMENT: &str = "DAYS_ENTRY_PAYMENT";
const AMT_INSTALMENT: &str = "AMT_INSTALMENT";
const AMT_PAYMENT: &str = "AMT_PAYMENT";

pub struct InstallmentsAggregator;

impl InstallmentsAggregator {
    /// Installment-level columns: days_delay, is_late, is_early, payment_diff
    fn installment_level(inst: &DataFrame) -> LazyFrame {
        let payment_diff = if has_column(inst, AMT_INSTALMENT) && has_column(inst, AMT_PAYMENT) {
            float_col(AMT_PAYMENT) - float_col(AMT_INSTALMENT)
        } else {
            lit(0.0)
        };

        keyed(inst, &[SK_ID_PREV])
            .with_columns([
                (float_col(DAYS_ENTRY_PAYMENT) - float_col(DAYS_INSTALMENT)).alias("days_delay"),
                payment_diff.alias("payment_diff"),
            ])
            .with_columns([
                flag(col("days_delay").gt(lit(0.0))).alias("is_late"),
                flag(col("days_delay").lt(lit(0.0))).alias("is_early"),
            ])
    }
}

impl FeatureAggregator for InstallmentsAggregator {
    fn feature_set(&self) -> FeatureSet {
        FeatureSet::Installments
    }

    fn sources(&self) -> &'static [&'static str] {
        &["installments_payments", "previous_application"]
    }

    fn aggregate(&self, tables: &SourceTables) -> Result<DataFrame> {
        let inst = tables.get("installments_payments")?;
        require_columns(
            inst,
            &[SK_ID_PREV, DAYS_INSTALMENT, DAYS_ENTRY_PAYMENT],
            "installments_payments",
        )?;

        let per_prev = group(
            Self::installment_level(inst),
            SK_ID_PREV,
            vec![
                agg("days_delay", Stat::Count, "inst_count"),
                agg("is_late", Stat::Mean, "inst_late_ratio"),
                agg("days_delay", Stat::Max, "inst_late_days_max"),
                agg("days_delay", Stat::Mean, "inst_late_days_mean"),
                agg("payment_diff", Stat::Mean, "inst_payment_diff_mean"),
            ],
        )
        .collect()?;
        info!(shape = ?per_prev.shape(), "installments aggregated per SK_ID_PREV");

        roll_up_to_customer(
            previous_mapping(tables)?,
            per_prev.lazy(),
            SK_ID_PREV,
            "previous_application + installments",
            vec![
                agg("inst_count", Stat::Count, "inst_prev_count"),
                agg("inst_late_ratio", Stat::Mean, "inst_late_ratio"),
                agg("inst_late_days_max", Stat::Max, "inst_late_days_max"),
                agg("inst_late_days_mean", Stat::Mean, "inst_late_days_mean"),
                agg("inst_payment_diff_mean", Stat::Mean, "inst_payment_diff_mean"),
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
            "SK_ID_PREV" => &[100i64, 101],
            "SK_ID_CURR" => &[1i64, 1]
        )
        .unwrap()
    }

    #[test]
    fn test_installment_delays() {
        let inst = df!(
            "SK_ID_PREV" => &[100i64, 100, 101],
            "DAYS_INSTALMENT" => &[-30i64, -60, -90],
            "DAYS_ENTRY_PAYMENT" => &[Some(-25i64), Some(-65), None],
            "AMT_INSTALMENT" => &[100.0, 100.0, 50.0],
            "AMT_PAYMENT" => &[100.0, 80.0, 50.0]
        )
        .unwrap();
        let tables = SourceTables::new()
            .with("installments_payments", inst)
            .with("previous_application", previous());

        let features = InstallmentsAggregator.aggregate(&tables).unwrap();

        // prev 100: delays [5, -5]; prev 101: payment date unknown
        assert_close(value_at(&features, "inst_prev_count", 1), 2.0);
        assert_close(value_at(&features, "inst_late_days_max", 1), 5.0);
        assert_close(value_at(&features, "inst_late_days_mean", 1), 0.0);
        // unknown delay counts as not late
        assert_close(value_at(&features, "inst_late_ratio", 1), (0.5 + 0.0) / 2.0);
        assert_close(value_at(&features, "inst_payment_diff_mean", 1), (-10.0 + 0.0) / 2.0);
    }

    #[test]
    fn test_payment_diff_defaults_to_zero() {
        let inst = df!(
            "SK_ID_PREV" => &[100i64],
            "DAYS_INSTALMENT" => &[-30i64],
            "DAYS_ENTRY_PAYMENT" => &[-31i64]
        )
        .unwrap();
        let tables = SourceTables::new()
            .with("installments_payments", inst)
            .with("previous_application", previous());

        let features = InstallmentsAggregator.aggregate(&tables).unwrap();

        assert_close(value_at(&features, "inst_payment_diff_mean", 1), 0.0);
        assert_close(value_at(&features, "inst_late_ratio", 1), 0.0);
    }

    #[test]
    fn test_installments_require_payment_days() {
        let inst = df!("SK_ID_PREV" => &[100i64], "DAYS_INSTALMENT" => &[-30i64]).unwrap();
        let tables = SourceTables::new()
            .with("installments_payments", inst)
            .with("previous_application", previous());

        assert!(InstallmentsAggregator.aggregate(&tables).is_err());
    }
}
