// ✂️ Stratified Split - train / valid / test with the same default rate
// 70% train, the remaining 30% halved into valid and test.

use crate::config::{PipelineConfig, TARGET_COL};
use crate::error::{PipelineError, Result};
use crate::io::{read_processed, require_columns, write_json, write_parquet};
use crate::merge::{MODEL_X_FILE, MODEL_Y_FILE};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

pub const HOLDOUT_SHARE: f64 = 0.30;
pub const VALID_TEST_RATIO: f64 = 0.50;
pub const SPLIT_METADATA_FILE: &str = "split_metadata.json";

/// The three parts written by `run_split`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Train,
    Valid,
    Test,
}

impl Part {
    pub const ALL: [Part; 3] = [Part::Train, Part::Valid, Part::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Part::Train => "train",
            Part::Valid => "valid",
            Part::Test => "test",
        }
    }

    pub fn x_file(&self) -> String {
        format!("X_{}.parquet", self.name())
    }

    pub fn y_file(&self) -> String {
        format!("y_{}.parquet", self.name())
    }
}

// ============================================================================
// LABELS
// ============================================================================

/// TARGET values as i32; nulls are rejected
pub fn target_labels(y: &DataFrame) -> Result<Vec<i32>> {
    require_columns(y, &[TARGET_COL], "y")?;
    let target = y.column(TARGET_COL)?.cast(&DataType::Int32)?;
    if target.null_count() > 0 {
        return Err(PipelineError::InvalidTarget(format!(
            "{} null TARGET values",
            target.null_count()
        )));
    }
    Ok(target.i32()?.into_no_null_iter().collect())
}

/// Share of each class, keyed by the class value as text
pub fn class_distribution(labels: &[i32]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    let n = labels.len().max(1) as f64;
    counts
        .into_iter()
        .map(|(class, count)| (class.to_string(), count as f64 / n))
        .collect()
}

// ============================================================================
// INDEX SPLITS
// ============================================================================

/// Stratified `(train, test)` row indices.
///
/// Rows of each class are shuffled with a seeded RNG and the first
/// `round(n_class * test_size)` go to the test part. Both index lists are
/// returned in ascending row order.
pub fn stratified_split(labels: &[i32], test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidTarget(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    if labels.is_empty() {
        return Err(PipelineError::EmptyTable("y".to_string()));
    }

    let mut by_class: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(row);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for rows in by_class.values_mut() {
        rows.shuffle(&mut rng);
        let n_test = (rows.len() as f64 * test_size).round() as usize;
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec("", rows.iter().map(|&r| r as IdxSize).collect());
    Ok(df.take(&idx)?)
}

fn pick<T: Copy>(values: &[T], rows: &[usize]) -> Vec<T> {
    rows.iter().map(|&r| values[r]).collect()
}

// ============================================================================
// TRAIN / VALID / TEST
// ============================================================================

#[derive(Debug, Clone)]
pub struct SplitPart {
    pub part: Part,
    pub x: DataFrame,
    pub y: DataFrame,
    pub labels: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitMetadata {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub seed: u64,
    pub train_size: usize,
    pub valid_size: usize,
    pub test_size: usize,
    pub train_target_dist: BTreeMap<String, f64>,
    pub valid_target_dist: BTreeMap<String, f64>,
    pub test_target_dist: BTreeMap<String, f64>,
}

/// Two-stage stratified split of `x` / `y` (aligned by row)
pub fn split_train_valid_test(x: &DataFrame, y: &DataFrame, seed: u64) -> Result<Vec<SplitPart>> {
    if x.height() != y.height() {
        return Err(PipelineError::InvalidTarget(format!(
            "X has {} rows but y has {}",
            x.height(),
            y.height()
        )));
    }
    let labels = target_labels(y)?;

    let (train_rows, holdout_rows) = stratified_split(&labels, HOLDOUT_SHARE, seed)?;

    let holdout_labels = pick(&labels, &holdout_rows);
    let (valid_pos, test_pos) = stratified_split(&holdout_labels, VALID_TEST_RATIO, seed)?;
    let valid_rows = pick(&holdout_rows, &valid_pos);
    let test_rows = pick(&holdout_rows, &test_pos);

    let mut parts = Vec::with_capacity(3);
    for (part, rows) in Part::ALL.into_iter().zip([train_rows, valid_rows, test_rows]) {
        let split = SplitPart {
            part,
            x: take_rows(x, &rows)?,
            y: take_rows(y, &rows)?,
            labels: pick(&labels, &rows),
        };
        info!(
            part = part.name(),
            size = split.labels.len(),
            distribution = ?class_distribution(&split.labels),
            "split part"
        );
        parts.push(split);
    }

    Ok(parts)
}

/// Read model_X / model_y, split them and write the six part files plus
/// split metadata
pub fn run_split(config: &PipelineConfig) -> Result<SplitMetadata> {
    let processed = config.paths.processed();
    let x = read_processed(&processed.join(MODEL_X_FILE), "model_X")?;
    let y = read_processed(&processed.join(MODEL_Y_FILE), "model_y")?;

    let seed = config.model.random_state;
    let mut parts = split_train_valid_test(&x, &y, seed)?;

    for split in parts.iter_mut() {
        write_parquet(&mut split.x, &processed.join(split.part.x_file()))?;
        write_parquet(&mut split.y, &processed.join(split.part.y_file()))?;
    }

    let dist = |i: usize| class_distribution(&parts[i].labels);
    let metadata = SplitMetadata {
        run_id: Uuid::new_v4(),
        created_at: Utc::now(),
        seed,
        train_size: parts[0].labels.len(),
        valid_size: parts[1].labels.len(),
        test_size: parts[2].labels.len(),
        train_target_dist: dist(0),
        valid_target_dist: dist(1),
        test_target_dist: dist(2),
    };

    let meta_path = processed.join(SPLIT_METADATA_FILE);
    write_json(&metadata, &meta_path)?;
    info!(path = %meta_path.display(), "split metadata saved");

    Ok(metadata)
}

/// Load the X / y files of one part written by `run_split`
pub fn load_part(config: &PipelineConfig, part: Part) -> Result<(DataFrame, Vec<i32>)> {
    let processed = config.paths.processed();
    let x = read_processed(&processed.join(part.x_file()), &format!("X_{}", part.name()))?;
    let y = read_processed(&processed.join(part.y_file()), &format!("y_{}", part.name()))?;
    let labels = target_labels(&y)?;
    Ok((x, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// 20 positives then 80 negatives
    fn labels() -> Vec<i32> {
        (0..100).map(|i| if i < 20 { 1 } else { 0 }).collect()
    }

    fn frames() -> (DataFrame, DataFrame) {
        let ids: Vec<i64> = (0..100).collect();
        let x = df!("SK_ID_CURR" => &ids, "AMT_CREDIT" => &ids).unwrap();
        let target: Vec<i8> = labels().into_iter().map(|l| l as i8).collect();
        let y = df!("TARGET" => &target).unwrap();
        (x, y)
    }

    #[test]
    fn test_stratified_split_keeps_class_shares() {
        let labels = labels();

        let (train, test) = stratified_split(&labels, 0.3, 42).unwrap();

        assert_eq!(train.len(), 70);
        assert_eq!(test.len(), 30);
        let test_pos = test.iter().filter(|&&r| labels[r] == 1).count();
        assert_eq!(test_pos, 6);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_split_is_deterministic() {
        let labels = labels();

        assert_eq!(
            stratified_split(&labels, 0.3, 7).unwrap(),
            stratified_split(&labels, 0.3, 7).unwrap()
        );
        assert_ne!(
            stratified_split(&labels, 0.3, 7).unwrap(),
            stratified_split(&labels, 0.3, 8).unwrap()
        );
    }

    #[test]
    fn test_stratified_split_rejects_bad_share() {
        assert!(stratified_split(&labels(), 0.0, 42).is_err());
        assert!(stratified_split(&labels(), 1.0, 42).is_err());
        assert!(stratified_split(&[], 0.3, 42).is_err());
    }

    #[test]
    fn test_train_valid_test_sizes() {
        let (x, y) = frames();

        let parts = split_train_valid_test(&x, &y, 42).unwrap();

        let sizes: Vec<usize> = parts.iter().map(|p| p.x.height()).collect();
        assert_eq!(sizes, vec![70, 15, 15]);
        for part in &parts {
            assert_eq!(part.x.height(), part.y.height());
            // X and y rows stay aligned
            let ids = part.x.column("SK_ID_CURR").unwrap().i64().unwrap();
            for (id, label) in ids.into_no_null_iter().zip(&part.labels) {
                assert_eq!(*label, i32::from(id < 20));
            }
        }
        assert_eq!(class_distribution(&parts[1].labels)["1"], 0.2);
    }

    #[test]
    fn test_null_target_rejected() {
        let y = df!("TARGET" => &[Some(1i8), None]).unwrap();
        assert!(matches!(target_labels(&y), Err(PipelineError::InvalidTarget(_))));
    }

    #[test]
    fn test_run_split_writes_parts() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::with_root(dir.path());
        let (mut x, mut y) = frames();
        let processed = config.paths.processed();
        write_parquet(&mut x, &processed.join(MODEL_X_FILE)).unwrap();
        write_parquet(&mut y, &processed.join(MODEL_Y_FILE)).unwrap();

        let meta = run_split(&config).unwrap();

        assert_eq!((meta.train_size, meta.valid_size, meta.test_size), (70, 15, 15));
        assert!(processed.join(SPLIT_METADATA_FILE).exists());
        let (x_test, y_test) = load_part(&config, Part::Test).unwrap();
        assert_eq!(x_test.height(), 15);
        assert_eq!(y_test.iter().filter(|&&l| l == 1).count(), 3);
    }
}
