// 💳 Credit card features - monthly card balances of previous credits

use super::{
    agg, float_col, group, keyed, pos_cash::late_flags, previous_mapping, roll_up_to_customer,
    FeatureAggregator, FeatureSet, SourceTables, Stat,
};
use crate::config::SK_ID_PREV;
use crate::error::Result;
use crate::io::{has_column, require_columns};
use polars::prelude::*;
use tracing::info;

const MONTHS_BALANCE: &str = "MONTHS_BALANCE";
const AMT_BALANCE: &str = "AMT_BALANCE";
const AMT_CREDIT_LIMIT_ACTUAL: &str = "AMT_CREDIT_LIMIT_ACTUAL";

pub struct CreditCardAggregator;

impl FeatureAggregator for CreditCardAggregator {
    fn feature_set(&self) -> FeatureSet {
        FeatureSet::CreditCard
    }

    fn sources(&self) -> &'static [&'static str] {
        &["credit_card_balance", "previous_application"]
    }

    fn aggregate(&self, tables: &SourceTables) -> Result<DataFrame> {
        let cc = tables.get("credit_card_balance")?;
        require_columns(cc, &[SK_ID_PREV, MONTHS_BALANCE], "credit_card_balance")?;

        let utilization =
            if has_column(cc, AMT_BALANCE) && has_column(cc, AMT_CREDIT_LIMIT_ACTUAL) {
                float_col(AMT_BALANCE) / float_col(AMT_CREDIT_LIMIT_ACTUAL)
            } else {
                lit(NULL).cast(DataType::Float64)
            };

        let monthly = keyed(cc, &[SK_ID_PREV])
            .with_column(utilization.alias("utilization"))
            .with_columns(late_flags(cc));

        let per_prev = group(
            monthly,
            SK_ID_PREV,
            vec![
                agg(MONTHS_BALANCE, Stat::Count, "cc_months_count"),
                agg("utilization", Stat::Mean, "cc_utilization_mean"),
                agg("utilization", Stat::Max, "cc_utilization_max"),
                agg("is_late", Stat::Mean, "cc_late_ratio"),
                agg("late_days", Stat::Max, "cc_late_days_max"),
            ],
        )
        .collect()?;
        info!(shape = ?per_prev.shape(), "credit card aggregated per SK_ID_PREV");

        roll_up_to_customer(
            previous_mapping(tables)?,
            per_prev.lazy(),
            SK_ID_PREV,
            "previous_application + credit_card",
            vec![
                agg("cc_months_count", Stat::Count, "cc_prev_count"),
                agg("cc_utilization_mean", Stat::Mean, "cc_utilization_mean"),
                agg("cc_utilization_max", Stat::Max, "cc_utilization_max"),
                agg("cc_late_ratio", Stat::Mean, "cc_late_ratio"),
                agg("cc_late_days_max", Stat::Max, "cc_late_days_max"),
            ],
        )
    }
}
