// 🔗 Merge Engine - joins every feature table onto the base table
// Two guarantees:
//   1. each feature table has exactly one row per SK_ID_CURR (duplicate check)
//   2. the modeling table keeps the base row count (left joins only)

use crate::base::{BASE_X_FILE, BASE_Y_FILE};
use crate::config::{PipelineConfig, SK_ID_CURR, TARGET_COL};
use crate::error::{PipelineError, Result};
use crate::features::FeatureSet;
use crate::io::{has_column, read_processed, require_columns, write_json, write_parquet};
use crate::profile::duplicated_count;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MODEL_X_FILE: &str = "model_X.parquet";
pub const MODEL_Y_FILE: &str = "model_y.parquet";
pub const MODEL_METADATA_FILE: &str = "model_metadata.json";

// ============================================================================
// MERGE REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStep {
    pub table: String,
    pub added_columns: usize,
    pub rows_after: usize,
    pub columns_after: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeMetadata {
    pub rows: usize,
    pub n_features: usize,
    pub n_added_features: usize,
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub merged: DataFrame,
    pub steps: Vec<MergeStep>,
    pub metadata: MergeMetadata,
}

// ============================================================================
// CHECKS
// ============================================================================

/// Duplicated `key` values in `df`; error when there is any
pub fn check_unique_key(df: &DataFrame, key: &str, table: &str) -> Result<usize> {
    require_columns(df, &[key], table)?;

    let count = duplicated_count(df.column(key)?)?;
    if count > 0 {
        return Err(PipelineError::DuplicateKeys {
            table: table.to_string(),
            key: key.to_string(),
            count,
        });
    }
    Ok(count)
}

/// Left joins on unique keys keep the base height; any other height means
/// the key check was bypassed
pub fn check_row_count(base: usize, merged: usize) -> Result<()> {
    if merged != base {
        return Err(PipelineError::RowCountChanged { base, merged });
    }
    Ok(())
}

/// Feature key cast to the base key dtype so the join never fails on
/// Int32 vs Int64 exports
fn align_key(features: &DataFrame, base_dtype: &DataType) -> Result<DataFrame> {
    if features.column(SK_ID_CURR)?.dtype() == base_dtype {
        return Ok(features.clone());
    }
    Ok(features
        .clone()
        .lazy()
        .with_column(col(SK_ID_CURR).cast(base_dtype.clone()))
        .collect()?)
}

// ============================================================================
// MERGE
// ============================================================================

/// Sequential left joins of `features` onto `base` on SK_ID_CURR.
///
/// Every feature table is validated before the first join, so a bad table
/// fails the merge without partial work.
pub fn merge_features(base: &DataFrame, features: &[(String, DataFrame)]) -> Result<MergeResult> {
    require_columns(base, &[SK_ID_CURR], "base_X")?;
    let n_base = base.height();
    let base_dtype = base.column(SK_ID_CURR)?.dtype().clone();

    // uniqueness is checked on the key the join will actually use
    let mut aligned = Vec::with_capacity(features.len());
    for (name, df) in features {
        require_columns(df, &[SK_ID_CURR], name)?;
        let right = align_key(df, &base_dtype)?;
        check_unique_key(&right, SK_ID_CURR, name)?;
        aligned.push((name, right));
    }

    let mut merged = base.clone();
    let mut steps = Vec::with_capacity(features.len());

    for (name, right) in aligned {
        let before = merged.width();

        merged = merged
            .lazy()
            .join(
                right.lazy(),
                [col(SK_ID_CURR)],
                [col(SK_ID_CURR)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;

        info!(table = %name, shape = ?merged.shape(), "after merge");
        steps.push(MergeStep {
            table: name.clone(),
            added_columns: merged.width() - before,
            rows_after: merged.height(),
            columns_after: merged.width(),
        });
    }

    check_row_count(n_base, merged.height())?;

    let metadata = MergeMetadata {
        rows: merged.height(),
        n_features: merged.width(),
        n_added_features: merged.width() - base.width(),
    };

    Ok(MergeResult {
        merged,
        steps,
        metadata,
    })
}

// ============================================================================
// STAGE RUNNER
// ============================================================================

/// Read base + feature tables from the processed directory and write the
/// modeling table
pub fn run_merge(config: &PipelineConfig) -> Result<MergeMetadata> {
    let processed = config.paths.processed();

    let base_x = read_processed(&processed.join(BASE_X_FILE), "base_X")?;
    let base_y_path = processed.join(BASE_Y_FILE);
    let base_y = if base_y_path.exists() {
        Some(read_processed(&base_y_path, "base_y")?)
    } else {
        None
    };

    let mut features = Vec::with_capacity(FeatureSet::ALL.len());
    for set in FeatureSet::ALL {
        let name = set.output_name();
        let df = read_processed(&processed.join(set.output_file()), &name)?;
        features.push((name, df));
    }

    let mut result = merge_features(&base_x, &features)?;

    let x_path = processed.join(MODEL_X_FILE);
    write_parquet(&mut result.merged, &x_path)?;
    info!(path = %x_path.display(), "model features saved");

    if let Some(mut y) = base_y.filter(|y| has_column(y, TARGET_COL)) {
        let y_path = processed.join(MODEL_Y_FILE);
        write_parquet(&mut y, &y_path)?;
        info!(path = %y_path.display(), "model target saved");
    }

    let meta_path = processed.join(MODEL_METADATA_FILE);
    write_json(&result.metadata, &meta_path)?;
    info!(path = %meta_path.display(), "model metadata saved");

    Ok(result.metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::run_build_base;
    use crate::features::run_features;
    use crate::io::{read_json, read_parquet};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn base() -> DataFrame {
        df!(
            "SK_ID_CURR" => &[1i32, 2, 3, 4],
            "AMT_INCOME_TOTAL" => &[10.0, 20.0, 30.0, 40.0]
        )
        .unwrap()
    }

    fn bureau_features() -> DataFrame {
        df!(
            "SK_ID_CURR" => &[2i64, 1],
            "bureau_credit_count" => &[5u32, 3]
        )
        .unwrap()
    }

    fn previous_features() -> DataFrame {
        df!(
            "SK_ID_CURR" => &[4i64, 9],
            "prev_app_count" => &[1u32, 7]
        )
        .unwrap()
    }

    #[test]
    fn test_merge_keeps_base_rows_and_order() {
        let features = vec![
            ("feat_bureau".to_string(), bureau_features()),
            ("feat_previous_application".to_string(), previous_features()),
        ];

        let result = merge_features(&base(), &features).unwrap();

        assert_eq!(result.merged.height(), 4);
        assert_eq!(
            result.merged.get_column_names(),
            vec!["SK_ID_CURR", "AMT_INCOME_TOTAL", "bureau_credit_count", "prev_app_count"]
        );
        let counts: Vec<Option<u32>> = result
            .merged
            .column("bureau_credit_count")
            .unwrap()
            .u32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(counts, vec![Some(3), Some(5), None, None]);
        assert_eq!(
            result.metadata,
            MergeMetadata {
                rows: 4,
                n_features: 4,
                n_added_features: 2
            }
        );
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].added_columns, 1);
    }

    #[test]
    fn test_duplicate_feature_keys_rejected() {
        let dup = df!(
            "SK_ID_CURR" => &[1i64, 1, 2],
            "bureau_credit_count" => &[1u32, 2, 3]
        )
        .unwrap();
        let features = vec![("feat_bureau".to_string(), dup)];

        let err = merge_features(&base(), &features).unwrap_err();

        match err {
            PipelineError::DuplicateKeys { table, count, .. } => {
                assert_eq!(table, "feat_bureau");
                assert_eq!(count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_feature_table_without_key_rejected() {
        let features = vec![(
            "feat_bureau".to_string(),
            df!("bureau_credit_count" => &[1u32]).unwrap(),
        )];

        let err = merge_features(&base(), &features).unwrap_err();

        assert!(matches!(err, PipelineError::MissingColumns { .. }));
    }

    #[test]
    fn test_base_without_key_rejected() {
        let base = df!("AMT_INCOME_TOTAL" => &[1.0]).unwrap();

        assert!(merge_features(&base, &[]).is_err());
    }

    #[test]
    fn test_check_unique_key() {
        let df = df!("SK_ID_CURR" => &[1i64, 2, 3]).unwrap();
        assert_eq!(check_unique_key(&df, SK_ID_CURR, "feat_x").unwrap(), 0);
    }

    #[test]
    fn test_keys_that_collide_after_cast_rejected() {
        let base = df!(
            "SK_ID_CURR" => &[1i64, 2],
            "AMT_INCOME_TOTAL" => &[10.0, 20.0]
        )
        .unwrap();
        // 1.0 and 1.2 are distinct floats but both become 1 as Int64
        let features = vec![(
            "feat_bureau".to_string(),
            df!(
                "SK_ID_CURR" => &[1.0f64, 1.2],
                "bureau_credit_count" => &[1u32, 2]
            )
            .unwrap(),
        )];

        let err = merge_features(&base, &features).unwrap_err();

        match err {
            PipelineError::DuplicateKeys { table, count, .. } => {
                assert_eq!(table, "feat_bureau");
                assert_eq!(count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_row_count() {
        assert!(check_row_count(4, 4).is_ok());
        assert!(matches!(
            check_row_count(2, 3),
            Err(PipelineError::RowCountChanged { base: 2, merged: 3 })
        ));
    }

    // ------------------------------------------------------------------------
    // raw parquet -> base -> feat_* -> model_X / model_y
    // ------------------------------------------------------------------------

    fn write_raw(config: &PipelineConfig, name: &str, mut df: DataFrame) {
        let file = config.files.get(name).unwrap();
        write_parquet(&mut df, &config.paths.raw().join(file)).unwrap();
    }

    fn write_raw_tables(config: &PipelineConfig, with_target: bool) {
        let mut application = df!(
            "SK_ID_CURR" => &[1i64, 2, 3],
            "AMT_INCOME_TOTAL" => &[1000.0, 2000.0, 1500.0]
        )
        .unwrap();
        if with_target {
            application
                .with_column(Series::new("TARGET", &[0i64, 1, 0]))
                .unwrap();
        }
        write_raw(config, "application", application);

        write_raw(
            config,
            "bureau",
            df!(
                "SK_ID_CURR" => &[1i64, 1, 2],
                "SK_ID_BUREAU" => &[10i64, 11, 20],
                "AMT_CREDIT_SUM" => &[100.0, 200.0, 50.0],
                "AMT_CREDIT_SUM_DEBT" => &[10.0, 0.0, 5.0]
            )
            .unwrap(),
        );
        write_raw(
            config,
            "bureau_balance",
            df!(
                "SK_ID_BUREAU" => &[10i64, 10, 20],
                "MONTHS_BALANCE" => &[-1i64, -2, -1],
                "STATUS" => &["0", "1", "C"]
            )
            .unwrap(),
        );
        write_raw(
            config,
            "previous_application",
            df!(
                "SK_ID_PREV" => &[100i64, 101, 300],
                "SK_ID_CURR" => &[1i64, 1, 3],
                "AMT_APPLICATION" => &[500.0, 700.0, 900.0],
                "AMT_CREDIT" => &[450.0, 700.0, 800.0]
            )
            .unwrap(),
        );
        write_raw(
            config,
            "pos_cash_balance",
            df!(
                "SK_ID_PREV" => &[100i64, 100, 300],
                "MONTHS_BALANCE" => &[-1i64, -2, -1],
                "SK_DPD" => &[0i64, 3, 0]
            )
            .unwrap(),
        );
        write_raw(
            config,
            "installments_payments",
            df!(
                "SK_ID_PREV" => &[100i64, 101, 300],
                "DAYS_INSTALMENT" => &[-10.0, -20.0, -5.0],
                "DAYS_ENTRY_PAYMENT" => &[-12.0, -15.0, -5.0],
                "AMT_INSTALMENT" => &[50.0, 60.0, 70.0],
                "AMT_PAYMENT" => &[50.0, 40.0, 70.0]
            )
            .unwrap(),
        );
        write_raw(
            config,
            "credit_card_balance",
            df!(
                "SK_ID_PREV" => &[101i64, 300],
                "MONTHS_BALANCE" => &[-1i64, -1],
                "AMT_BALANCE" => &[250.0, 0.0],
                "AMT_CREDIT_LIMIT_ACTUAL" => &[1000.0, 500.0]
            )
            .unwrap(),
        );
    }

    #[rstest]
    #[case::labeled(true)]
    #[case::unlabeled(false)]
    fn test_data_stages_from_raw_tables(#[case] with_target: bool) {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::with_root(dir.path());
        write_raw_tables(&config, with_target);
        let processed = config.paths.processed();

        let base_meta = run_build_base(&config).unwrap();
        let outputs = run_features(&config, None).unwrap();
        let meta = run_merge(&config).unwrap();

        assert_eq!(base_meta.has_target, with_target);
        assert_eq!(
            outputs.iter().map(|o| o.feature_set).collect::<Vec<_>>(),
            FeatureSet::ALL.to_vec()
        );
        for set in FeatureSet::ALL {
            assert!(processed.join(set.output_file()).exists(), "{} missing", set);
        }

        let base_x = read_parquet(&processed.join(BASE_X_FILE), None).unwrap();
        let model_x = read_parquet(&processed.join(MODEL_X_FILE), None).unwrap();
        assert_eq!(model_x.height(), base_x.height());
        assert_eq!(model_x.height(), 3);
        assert!(has_column(&model_x, "bureau_credit_count"));
        assert!(has_column(&model_x, "cc_utilization_max"));

        let on_disk: MergeMetadata = read_json(&processed.join(MODEL_METADATA_FILE)).unwrap();
        assert_eq!(on_disk, meta);
        assert_eq!(meta.n_added_features, model_x.width() - base_x.width());
        assert_eq!(meta.n_features, model_x.width());

        assert_eq!(processed.join(BASE_Y_FILE).exists(), with_target);
        assert_eq!(processed.join(MODEL_Y_FILE).exists(), with_target);
        if with_target {
            let y = read_parquet(&processed.join(MODEL_Y_FILE), None).unwrap();
            assert_eq!(y.get_column_names(), vec!["TARGET"]);
            assert_eq!(y.height(), 3);
        }
    }

    #[test]
    fn test_features_for_one_table() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::with_root(dir.path());
        write_raw_tables(&config, true);

        let outputs = run_features(&config, Some(FeatureSet::PosCash)).unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].rows, 2);
        let processed = config.paths.processed();
        assert!(processed.join("feat_pos_cash.parquet").exists());
        assert!(!processed.join("feat_bureau.parquet").exists());
    }
}
