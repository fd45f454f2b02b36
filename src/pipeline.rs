// 🚦 Pipeline Stages - model stages over the split files, plus run-all
//
// Data stages live next to their logic (base, features, merge, split);
// this module adds the modeling stages and chains everything in order.

use crate::base::run_build_base;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::run_features;
use crate::io::{read_json, write_json};
use crate::merge::run_merge;
use crate::model::baseline::BALANCED;
use crate::model::champion::ChampionMetadata;
use crate::model::{
    champion_class_weight, evaluate, fit_champion, BaselineMetrics, BaselineModel,
    ChampionMetrics, Evaluation, BASELINE_NAME, CHAMPION_NAME,
};
use crate::split::{load_part, run_split, Part};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const BASELINE_METRICS_FILE: &str = "metrics_baseline.json";
pub const CHAMPION_METRICS_FILE: &str = "metrics_champion.json";
pub const COMPARISON_FILE: &str = "model_comparison.csv";

pub const BASELINE_LABEL: &str = "Baseline (Logistic)";
pub const CHAMPION_LABEL: &str = "Champion (HGB)";

// ============================================================================
// TRAINING
// ============================================================================

/// Fit preprocessing + logistic regression on train, score valid
pub fn run_train_baseline(config: &PipelineConfig) -> Result<BaselineMetrics> {
    let (x_train, y_train) = load_part(config, Part::Train)?;
    let (x_valid, y_valid) = load_part(config, Part::Valid)?;

    let model = BaselineModel::fit(&x_train, &y_train, &config.model.baseline)?;
    info!(
        numeric = model.n_numeric(),
        categorical = model.n_categorical(),
        "baseline feature groups"
    );

    let eval = evaluate(&y_valid, &model.predict_proba(&x_valid)?, config.model.threshold)?;
    info!(roc_auc = eval.roc_auc, "baseline ROC-AUC (valid)");
    info!("classification report (valid):\n{}", eval.report);

    let metrics = BaselineMetrics {
        model: BASELINE_NAME.to_string(),
        roc_auc_valid: eval.roc_auc,
        class_weight: if config.model.baseline.balanced {
            BALANCED.to_string()
        } else {
            "none".to_string()
        },
        n_numeric_features: model.n_numeric(),
        n_categorical_features: model.n_categorical(),
    };

    let path = config.paths.artifacts().join(BASELINE_METRICS_FILE);
    write_json(&metrics, &path)?;
    info!(path = %path.display(), "baseline metrics saved");
    Ok(metrics)
}

/// Fit gradient boosting on the numeric train columns, score valid
pub fn run_train_champion(config: &PipelineConfig) -> Result<ChampionMetrics> {
    let (x_train, y_train) = load_part(config, Part::Train)?;
    let (x_valid, y_valid) = load_part(config, Part::Valid)?;
    let params = &config.model.champion;

    let artifact = fit_champion(&[(&x_train, &y_train[..])], params)?;
    let eval = evaluate(&y_valid, &artifact.predict_frame(&x_valid)?, config.model.threshold)?;
    info!(roc_auc = eval.roc_auc, "champion ROC-AUC (valid)");
    info!("classification report (valid):\n{}", eval.report);

    let metrics = ChampionMetrics {
        model: CHAMPION_NAME.to_string(),
        roc_auc_valid: eval.roc_auc,
        class_weight: champion_class_weight(params),
        n_features: artifact.numeric_columns.len(),
    };

    let path = config.paths.artifacts().join(CHAMPION_METRICS_FILE);
    write_json(&metrics, &path)?;
    info!(path = %path.display(), "champion metrics saved");
    Ok(metrics)
}

// ============================================================================
// COMPARISON
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub model: String,
    pub roc_auc_valid: f64,
}

/// Valid-set ROC-AUC of both models side by side
pub fn run_compare(config: &PipelineConfig) -> Result<Vec<ComparisonRow>> {
    let artifacts = config.paths.artifacts();
    let baseline: BaselineMetrics = read_json(&artifacts.join(BASELINE_METRICS_FILE))?;
    let champion: ChampionMetrics = read_json(&artifacts.join(CHAMPION_METRICS_FILE))?;

    let rows = vec![
        ComparisonRow {
            model: BASELINE_LABEL.to_string(),
            roc_auc_valid: baseline.roc_auc_valid,
        },
        ComparisonRow {
            model: CHAMPION_LABEL.to_string(),
            roc_auc_valid: champion.roc_auc_valid,
        },
    ];

    let path = artifacts.join(COMPARISON_FILE);
    let mut writer = csv::Writer::from_path(&path)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), "comparison saved");

    Ok(rows)
}

// ============================================================================
// FINAL MODEL
// ============================================================================

/// Champion refit on train + valid, scored once on test
pub fn run_evaluate(config: &PipelineConfig) -> Result<Evaluation> {
    let (x_train, y_train) = load_part(config, Part::Train)?;
    let (x_valid, y_valid) = load_part(config, Part::Valid)?;
    let (x_test, y_test) = load_part(config, Part::Test)?;

    let artifact = fit_champion(
        &[(&x_train, &y_train[..]), (&x_valid, &y_valid[..])],
        &config.model.champion,
    )?;
    let eval = evaluate(&y_test, &artifact.predict_frame(&x_test)?, config.model.threshold)?;
    info!(roc_auc = eval.roc_auc, "final test ROC-AUC");
    info!("classification report (test):\n{}", eval.report);
    Ok(eval)
}

/// Champion refit on train + valid and saved for serving
pub fn run_train_final(config: &PipelineConfig) -> Result<ChampionMetadata> {
    let (x_train, y_train) = load_part(config, Part::Train)?;
    let (x_valid, y_valid) = load_part(config, Part::Valid)?;

    let artifact = fit_champion(
        &[(&x_train, &y_train[..]), (&x_valid, &y_valid[..])],
        &config.model.champion,
    )?;
    artifact.save(&config.paths.artifacts())?;
    info!(n_features = artifact.numeric_columns.len(), "final champion saved");
    Ok(artifact.metadata)
}

// ============================================================================
// RUN ALL
// ============================================================================

/// Every stage from the raw tables to the saved champion
pub fn run_all(config: &PipelineConfig) -> Result<()> {
    run_build_base(config)?;
    run_features(config, None)?;
    run_merge(config)?;
    run_split(config)?;
    run_train_baseline(config)?;
    run_train_champion(config)?;
    run_compare(config)?;
    run_evaluate(config)?;
    run_train_final(config)?;
    info!("pipeline complete");
    Ok(())
}
