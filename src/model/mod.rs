// 🤖 Models - baseline (logistic regression) and champion (gradient boosting)
//
//   baseline: all columns, Preprocessor + LogisticRegression, balanced weights
//   champion: numeric columns only, gbdt, positives weighted 5:1

pub mod baseline;
pub mod champion;
pub mod matrix;
pub mod metrics;
pub mod preprocess;

pub use baseline::LogisticRegression;
pub use champion::ChampionArtifact;
pub use metrics::{predict_labels, roc_auc, ClassificationReport};
pub use preprocess::Preprocessor;

use crate::config::{BaselineParams, ChampionParams};
use crate::error::{PipelineError, Result};
use matrix::{check_binary, concat_rows, numeric_columns, to_matrix};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const BASELINE_NAME: &str = "logistic_regression_baseline";
pub const CHAMPION_NAME: &str = "hist_gradient_boosting_numeric_only";

// ============================================================================
// METRICS FILES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub model: String,
    pub roc_auc_valid: f64,
    pub class_weight: String,
    pub n_numeric_features: usize,
    pub n_categorical_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionMetrics {
    pub model: String,
    pub roc_auc_valid: f64,
    /// Label -> sample weight, e.g. {"0": 1.0, "1": 5.0}
    pub class_weight: BTreeMap<String, f32>,
    pub n_features: usize,
}

/// Score of one model on one labeled part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub roc_auc: f64,
    pub threshold: f64,
    pub report: ClassificationReport,
}

pub fn evaluate(labels: &[i32], proba: &[f64], threshold: f64) -> Result<Evaluation> {
    let roc_auc = roc_auc(labels, proba)?;
    let report = ClassificationReport::new(labels, &predict_labels(proba, threshold))?;
    Ok(Evaluation {
        roc_auc,
        threshold,
        report,
    })
}

// ============================================================================
// BASELINE
// ============================================================================

/// Fitted preprocessing + logistic regression
#[derive(Debug, Clone)]
pub struct BaselineModel {
    pub preprocessor: Preprocessor,
    pub model: LogisticRegression,
}

impl BaselineModel {
    pub fn fit(x: &DataFrame, labels: &[i32], params: &BaselineParams) -> Result<Self> {
        check_binary(labels)?;
        let preprocessor = Preprocessor::fit(x)?;
        let design = preprocessor.transform(x)?;
        let model = LogisticRegression::fit(&design, labels, params)?;
        Ok(BaselineModel {
            preprocessor,
            model,
        })
    }

    pub fn predict_proba(&self, x: &DataFrame) -> Result<Vec<f64>> {
        let design = self.preprocessor.transform(x)?;
        Ok(self.model.predict_proba(&design)?.to_vec())
    }

    pub fn n_numeric(&self) -> usize {
        self.preprocessor.numeric.len()
    }

    pub fn n_categorical(&self) -> usize {
        self.preprocessor.categorical.len()
    }
}

// ============================================================================
// CHAMPION
// ============================================================================

/// Class weights as recorded in the metrics file
pub fn champion_class_weight(params: &ChampionParams) -> BTreeMap<String, f32> {
    BTreeMap::from([
        ("0".to_string(), 1.0),
        ("1".to_string(), params.positive_class_weight),
    ])
}

/// Train the champion on the numeric columns of `parts` stacked in order.
/// Column selection comes from the first part.
pub fn fit_champion(parts: &[(&DataFrame, &[i32])], params: &ChampionParams) -> Result<ChampionArtifact> {
    let (first, _) = parts
        .first()
        .ok_or_else(|| PipelineError::EmptyTable("champion training parts".to_string()))?;
    let columns = numeric_columns(first);

    let mut x = to_matrix(first, &columns)?;
    let mut labels: Vec<i32> = Vec::new();
    for (i, (df, y)) in parts.iter().enumerate() {
        if df.height() != y.len() {
            return Err(PipelineError::Model(format!(
                "{} rows but {} labels",
                df.height(),
                y.len()
            )));
        }
        if i > 0 {
            x = concat_rows(&x, &to_matrix(df, &columns)?)?;
        }
        labels.extend_from_slice(y);
    }
    check_binary(&labels)?;

    ChampionArtifact::train(&x, &labels, columns, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn frame(offset: i64) -> (DataFrame, Vec<i32>) {
        let ids: Vec<i64> = (0..20).map(|i| i + offset).collect();
        let score: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let kind: Vec<&str> = (0..20).map(|i| if i % 2 == 0 { "Cash" } else { "Revolving" }).collect();
        let df = df!(
            "SK_ID_CURR" => &ids,
            "EXT_SOURCE_2" => &score,
            "NAME_CONTRACT_TYPE" => &kind
        )
        .unwrap();
        let labels = (0..20).map(|i| i32::from(i >= 14)).collect();
        (df, labels)
    }

    #[test]
    fn test_baseline_model_scores_frames() {
        let (df, labels) = frame(0);

        let model = BaselineModel::fit(&df, &labels, &BaselineParams::default()).unwrap();
        let proba = model.predict_proba(&df).unwrap();

        assert_eq!((model.n_numeric(), model.n_categorical()), (1, 1));
        let eval = evaluate(&labels, &proba, 0.5).unwrap();
        assert!(eval.roc_auc > 0.95);
        assert_eq!(eval.report.classes[1].support, 6);
    }

    #[test]
    fn test_fit_champion_stacks_parts() {
        let (train, y_train) = frame(0);
        let (valid, y_valid) = frame(100);
        let params = ChampionParams {
            max_depth: 2,
            max_iter: 10,
            min_leaf_size: 1,
            ..ChampionParams::default()
        };

        let artifact = fit_champion(&[(&train, &y_train[..]), (&valid, &y_valid[..])], &params).unwrap();

        assert_eq!(artifact.numeric_columns, vec!["EXT_SOURCE_2"]);
        assert_eq!(artifact.metadata.n_train_rows, 40);
    }

    #[test]
    fn test_fit_champion_rejects_misaligned_labels() {
        let (train, _) = frame(0);

        assert!(fit_champion(&[(&train, &[0, 1][..])], &ChampionParams::default()).is_err());
        assert!(fit_champion(&[], &ChampionParams::default()).is_err());
    }

    #[test]
    fn test_champion_class_weight() {
        let weights = champion_class_weight(&ChampionParams::default());
        assert_eq!(weights["1"], 5.0);
        assert_eq!(weights["0"], 1.0);
    }
}
