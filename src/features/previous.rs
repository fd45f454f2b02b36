// 📝 Previous application features - earlier Home Credit applications

use super::{agg, group, keyed, present_columns, FeatureAggregator, FeatureSet, SourceTables, Stat};
use crate::config::{SK_ID_CURR, SK_ID_PREV};
use crate::error::Result;
use crate::io::require_columns;
use polars::prelude::*;
use tracing::info;

pub const PREVIOUS_NUMERIC: [&str; 3] = ["AMT_APPLICATION", "AMT_CREDIT", "DAYS_DECISION"];

const STATS: [Stat; 3] = [Stat::Mean, Stat::Max, Stat::Sum];

pub struct PreviousApplicationAggregator;

impl FeatureAggregator for PreviousApplicationAggregator {
    fn feature_set(&self) -> FeatureSet {
        FeatureSet::PreviousApplication
    }

    fn sources(&self) -> &'static [&'static str] {
        &["previous_application"]
    }

    fn aggregate(&self, tables: &SourceTables) -> Result<DataFrame> {
        let prev = tables.get("previous_application")?;
        require_columns(prev, &[SK_ID_CURR, SK_ID_PREV], "previous_application")?;

        let numeric = present_columns(prev, &PREVIOUS_NUMERIC);
        info!(columns = ?numeric, "previous_application numeric columns used");

        let mut aggs = Vec::with_capacity(numeric.len() * STATS.len() + 1);
        for column in &numeric {
            for stat in STATS {
                aggs.push(agg(column, stat, &format!("prev_{}_{}", column, stat.suffix())));
            }
        }
        aggs.push(agg(SK_ID_PREV, Stat::Count, "prev_app_count"));

        let features = group(keyed(prev, &[SK_ID_CURR, SK_ID_PREV]), SK_ID_CURR, aggs).collect()?;
        info!(shape = ?features.shape(), "aggregated previous_application");

        Ok(features)
    }
}
