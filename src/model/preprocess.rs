// 🧹 Preprocessor - imputation, scaling and one-hot encoding for the baseline
//
//   numeric:     median imputation -> standard scaling
//   categorical: most-frequent imputation -> one-hot (unknown -> all zeros)

use super::matrix::{categorical_columns, column_values, numeric_columns};
use crate::error::Result;
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStep {
    pub column: String,
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStep {
    pub column: String,
    pub most_frequent: Option<String>,
    /// Sorted categories seen during fit, one output column each
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric: Vec<NumericStep>,
    pub categorical: Vec<CategoricalStep>,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Median of the non-NaN values; 0.0 for an all-missing column
fn median(values: &[f64]) -> f64 {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return 0.0;
    }
    present.sort_by(f64::total_cmp);
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        (present[mid - 1] + present[mid]) / 2.0
    } else {
        present[mid]
    }
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let values = df.column(name)?.cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

impl NumericStep {
    fn fit(df: &DataFrame, column: &str) -> Result<Self> {
        let values = column_values(df, column)?;
        let median = median(&values);

        let imputed: Vec<f64> = values
            .iter()
            .map(|&v| if v.is_nan() { median } else { v })
            .collect();
        let n = imputed.len().max(1) as f64;
        let mean = imputed.iter().sum::<f64>() / n;
        let var = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();

        Ok(NumericStep {
            column: column.to_string(),
            median,
            mean,
            // constant columns are centered only
            scale: if std > 0.0 { std } else { 1.0 },
        })
    }

    fn apply(&self, v: f64) -> f64 {
        let v = if v.is_nan() { self.median } else { v };
        (v - self.mean) / self.scale
    }
}

impl CategoricalStep {
    fn fit(df: &DataFrame, column: &str) -> Result<Self> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for v in string_values(df, column)?.into_iter().flatten() {
            *counts.entry(v).or_insert(0) += 1;
        }

        // ties resolve to the smallest category
        let most_frequent = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(category, _)| category.clone());

        Ok(CategoricalStep {
            column: column.to_string(),
            most_frequent,
            categories: counts.into_keys().collect(),
        })
    }

    fn position(&self, value: Option<&str>) -> Option<usize> {
        let value = value.or(self.most_frequent.as_deref())?;
        self.categories.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }
}

// ============================================================================
// FIT / TRANSFORM
// ============================================================================

impl Preprocessor {
    /// Learn imputation, scaling and categories from the training frame
    pub fn fit(df: &DataFrame) -> Result<Self> {
        let numeric = numeric_columns(df)
            .iter()
            .map(|c| NumericStep::fit(df, c))
            .collect::<Result<Vec<_>>>()?;
        let categorical = categorical_columns(df)
            .iter()
            .map(|c| CategoricalStep::fit(df, c))
            .collect::<Result<Vec<_>>>()?;

        Ok(Preprocessor {
            numeric,
            categorical,
        })
    }

    pub fn n_outputs(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }

    /// Output column names: numeric names, then `{column}_{category}`
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|s| s.column.clone()).collect();
        for step in &self.categorical {
            for category in &step.categories {
                names.push(format!("{}_{}", step.column, category));
            }
        }
        names
    }

    /// Design matrix for `df`; columns absent from `df` are treated as missing
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let n_rows = df.height();
        let mut out = Array2::zeros((n_rows, self.n_outputs()));

        for (j, step) in self.numeric.iter().enumerate() {
            let values = if df.column(&step.column).is_ok() {
                column_values(df, &step.column)?
            } else {
                vec![f64::NAN; n_rows]
            };
            for (i, v) in values.into_iter().enumerate() {
                out[[i, j]] = step.apply(v);
            }
        }

        let mut offset = self.numeric.len();
        for step in &self.categorical {
            let values = if df.column(&step.column).is_ok() {
                string_values(df, &step.column)?
            } else {
                vec![None; n_rows]
            };
            for (i, v) in values.iter().enumerate() {
                if let Some(k) = step.position(v.as_deref()) {
                    out[[i, offset + k]] = 1.0;
                }
            }
            offset += step.categories.len();
        }

        Ok(out)
    }
}
