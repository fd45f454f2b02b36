// 🏆 Champion - gradient-boosted trees (gbdt crate) on the numeric columns
//
// Artifact layout inside the artifacts directory:
//   champion_model.json          gbdt model
//   champion_numeric_cols.json   ordered input columns
//   champion_metadata.json       run id, timestamp, params, column fingerprint

use super::matrix::to_matrix;
use crate::config::ChampionParams;
use crate::error::{PipelineError, Result};
use crate::io::{read_json, write_json};
use chrono::{DateTime, Utc};
use gbdt::config::Config as GbdtConfig;
use gbdt::decision_tree::{Data, DataVec, ValueType, VALUE_TYPE_UNKNOWN};
use gbdt::gradient_boost::GBDT;
use ndarray::{Array2, ArrayView1};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

pub const MODEL_FILE: &str = "champion_model.json";
pub const COLUMNS_FILE: &str = "champion_numeric_cols.json";
pub const METADATA_FILE: &str = "champion_metadata.json";

const LOSS: &str = "LogLikelyhood";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionMetadata {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub n_features: usize,
    pub n_train_rows: usize,
    /// SHA-256 of the newline-joined column list
    pub columns_fingerprint: String,
    pub params: ChampionParams,
}

/// Trained model plus the column order it expects
pub struct ChampionArtifact {
    model: GBDT,
    pub numeric_columns: Vec<String>,
    pub metadata: ChampionMetadata,
}

pub fn columns_fingerprint(columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(columns.join("\n").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// NaN is the crate's unknown-value marker
fn to_features(row: ArrayView1<f64>) -> Vec<ValueType> {
    row.iter()
        .map(|&v| if v.is_nan() { VALUE_TYPE_UNKNOWN } else { v as ValueType })
        .collect()
}

fn gbdt_config(n_features: usize, params: &ChampionParams) -> GbdtConfig {
    let mut cfg = GbdtConfig::new();
    cfg.set_feature_size(n_features);
    cfg.set_max_depth(params.max_depth);
    cfg.set_iterations(params.max_iter);
    cfg.set_shrinkage(params.learning_rate);
    cfg.set_loss(LOSS);
    cfg.set_min_leaf_size(params.min_leaf_size);
    cfg.set_data_sample_ratio(1.0);
    cfg.set_feature_sample_ratio(1.0);
    cfg.set_training_optimization_level(2);
    cfg
}

impl ChampionArtifact {
    /// Fit on `x` (columns in `numeric_columns` order) and 0/1 labels.
    /// Positives weigh `positive_class_weight`, negatives 1.0.
    pub fn train(
        x: &Array2<f64>,
        labels: &[i32],
        numeric_columns: Vec<String>,
        params: &ChampionParams,
    ) -> Result<Self> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 {
            return Err(PipelineError::EmptyTable("champion training matrix".to_string()));
        }
        if n_features == 0 || n_features != numeric_columns.len() {
            return Err(PipelineError::Model(format!(
                "{} matrix columns for {} named columns",
                n_features,
                numeric_columns.len()
            )));
        }
        if labels.len() != n_rows {
            return Err(PipelineError::Model(format!(
                "{} labels for {} rows",
                labels.len(),
                n_rows
            )));
        }

        let mut data: DataVec = x
            .rows()
            .into_iter()
            .zip(labels)
            .map(|(row, &label)| {
                let (weight, target) = if label == 1 {
                    (params.positive_class_weight, 1.0)
                } else {
                    (1.0, -1.0)
                };
                Data::new_training_data(to_features(row), weight, target, None)
            })
            .collect();

        debug!(
            max_leaf_nodes = params.max_leaf_nodes,
            max_depth = params.max_depth,
            "trees are bounded by depth"
        );
        let mut model = GBDT::new(&gbdt_config(n_features, params));
        model.fit(&mut data);
        info!(rows = n_rows, features = n_features, iterations = params.max_iter, "champion trained");

        let metadata = ChampionMetadata {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            n_features,
            n_train_rows: n_rows,
            columns_fingerprint: columns_fingerprint(&numeric_columns),
            params: params.clone(),
        };

        Ok(ChampionArtifact {
            model,
            numeric_columns,
            metadata,
        })
    }

    /// P(TARGET = 1) per row of a matrix in `numeric_columns` order
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.numeric_columns.len() {
            return Err(PipelineError::Model(format!(
                "expected {} features, got {}",
                self.numeric_columns.len(),
                x.ncols()
            )));
        }
        let data: DataVec = x
            .rows()
            .into_iter()
            .map(|row| Data::new_test_data(to_features(row), None))
            .collect();

        Ok(self.model.predict(&data).into_iter().map(f64::from).collect())
    }

    /// Reindex `df` to the training columns and predict
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Vec<f64>> {
        self.predict_matrix(&to_matrix(df, &self.numeric_columns)?)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let model_path = dir.join(MODEL_FILE);
        let model_str = model_path.to_string_lossy();
        self.model
            .save_model(&model_str)
            .map_err(|e| PipelineError::Model(format!("cannot save {}: {}", model_str, e)))?;

        write_json(&self.numeric_columns, &dir.join(COLUMNS_FILE))?;
        write_json(&self.metadata, &dir.join(METADATA_FILE))?;
        info!(dir = %dir.display(), "champion artifact saved");
        Ok(())
    }

    /// Load a saved artifact; the column list must match its fingerprint
    pub fn load(dir: &Path) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(PipelineError::FileNotFound(model_path));
        }
        let model_str = model_path.to_string_lossy();
        let model = GBDT::load_model(&model_str)
            .map_err(|e| PipelineError::Model(format!("cannot load {}: {}", model_str, e)))?;

        let numeric_columns: Vec<String> = read_json(&dir.join(COLUMNS_FILE))?;
        let metadata: ChampionMetadata = read_json(&dir.join(METADATA_FILE))?;

        if columns_fingerprint(&numeric_columns) != metadata.columns_fingerprint {
            return Err(PipelineError::Model(format!(
                "{} does not match the trained model",
                COLUMNS_FILE
            )));
        }
        info!(features = numeric_columns.len(), run_id = %metadata.run_id, "champion artifact loaded");

        Ok(ChampionArtifact {
            model,
            numeric_columns,
            metadata,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::model::metrics::roc_auc;
    use polars::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_champion_ranks_positives_higher() {
        let (x, labels, _) = toy_data();
        let artifact = toy_artifact();

        let proba = artifact.predict_matrix(&x).unwrap();

        assert_eq!(proba.len(), 40);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(roc_auc(&labels, &proba).unwrap() > 0.9);
    }

    #[test]
    fn test_predict_frame_reindexes_columns() {
        let artifact = toy_artifact();
        // noise column absent, extra column ignored
        let df = df!(
            "SK_ID_CURR" => &[1i64, 2],
            "EXT_SOURCE_2" => &[1.0, 38.0]
        )
        .unwrap();

        let proba = artifact.predict_frame(&df).unwrap();

        assert!(proba[0] < proba[1]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let (x, _, _) = toy_data();
        let artifact = toy_artifact();

        artifact.save(dir.path()).unwrap();
        let loaded = ChampionArtifact::load(dir.path()).unwrap();

        assert_eq!(loaded.numeric_columns, artifact.numeric_columns);
        assert_eq!(loaded.metadata, artifact.metadata);
        assert_eq!(
            loaded.predict_matrix(&x).unwrap(),
            artifact.predict_matrix(&x).unwrap()
        );
    }

    #[test]
    fn test_load_rejects_tampered_columns() {
        let dir = TempDir::new().unwrap();
        toy_artifact().save(dir.path()).unwrap();
        write_json(&vec!["OTHER".to_string()], &dir.path().join(COLUMNS_FILE)).unwrap();

        assert!(matches!(
            ChampionArtifact::load(dir.path()),
            Err(PipelineError::Model(_))
        ));
    }

    #[test]
    fn test_train_rejects_mismatched_columns() {
        let (x, labels, _) = toy_data();

        let result = ChampionArtifact::train(&x, &labels, vec!["ONLY_ONE".to_string()], &toy_params());

        assert!(result.is_err());
    }
}
