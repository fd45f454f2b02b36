// Feature matrices: polars frames -> dense row-major f64 arrays

use crate::config::ID_PREFIX;
use crate::error::{PipelineError, Result};
use ndarray::Array2;
use polars::prelude::*;

fn is_id(name: &str) -> bool {
    name.starts_with(ID_PREFIX)
}

/// Numeric model columns in frame order; identifier columns are excluded
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|s| s.dtype().is_numeric() && !is_id(s.name()))
        .map(|s| s.name().to_string())
        .collect()
}

/// Every non-numeric, non-identifier column (strings, booleans)
pub fn categorical_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|s| !s.dtype().is_numeric() && !is_id(s.name()))
        .map(|s| s.name().to_string())
        .collect()
}

/// Column values as f64 with null, NaN and +/-inf all mapped to NaN
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = df.column(name)?.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| match v {
            Some(x) if x.is_finite() => x,
            _ => f64::NAN,
        })
        .collect())
}

/// Dense `(rows, columns)` matrix in the given column order.
///
/// A column absent from `df` becomes all-NaN, so a frame can always be
/// reindexed to the column list a model was trained on.
pub fn to_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let mut matrix = Array2::from_elem((n_rows, columns.len()), f64::NAN);

    for (j, name) in columns.iter().enumerate() {
        if df.column(name).is_err() {
            continue;
        }
        for (i, v) in column_values(df, name)?.into_iter().enumerate() {
            matrix[[i, j]] = v;
        }
    }

    Ok(matrix)
}

/// Stack `top` over `bottom` (same column order)
pub fn concat_rows(top: &Array2<f64>, bottom: &Array2<f64>) -> Result<Array2<f64>> {
    ndarray::concatenate(ndarray::Axis(0), &[top.view(), bottom.view()])
        .map_err(|e| PipelineError::Model(format!("cannot stack matrices: {e}")))
}

/// Binary labels; anything other than 0 / 1 is rejected
pub fn check_binary(labels: &[i32]) -> Result<()> {
    match labels.iter().find(|&&l| l != 0 && l != 1) {
        Some(bad) => Err(PipelineError::InvalidTarget(format!(
            "expected 0/1 labels, found {bad}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame() -> DataFrame {
        df!(
            "SK_ID_CURR" => &[1i64, 2],
            "AMT_CREDIT" => &[Some(1.5), None],
            "bureau_debt_to_credit_ratio" => &[f64::INFINITY, 0.5],
            "CNT_CHILDREN" => &[0i32, 2],
            "NAME_CONTRACT_TYPE" => &["Cash loans", "Revolving loans"]
        )
        .unwrap()
    }

    #[test]
    fn test_column_selection_skips_ids() {
        let df = frame();

        assert_eq!(
            numeric_columns(&df),
            vec!["AMT_CREDIT", "bureau_debt_to_credit_ratio", "CNT_CHILDREN"]
        );
        assert_eq!(categorical_columns(&df), vec!["NAME_CONTRACT_TYPE"]);
    }

    #[test]
    fn test_matrix_maps_missing_and_inf_to_nan() {
        let df = frame();
        let columns = numeric_columns(&df);

        let m = to_matrix(&df, &columns).unwrap();

        assert_eq!(m.dim(), (2, 3));
        assert_eq!(m[[0, 0]], 1.5);
        assert!(m[[1, 0]].is_nan());
        assert!(m[[0, 1]].is_nan());
        assert_eq!(m[[1, 2]], 2.0);
    }

    #[test]
    fn test_matrix_reindexes_absent_columns() {
        let df = frame();
        let columns = vec!["CNT_CHILDREN".to_string(), "EXT_SOURCE_3".to_string()];

        let m = to_matrix(&df, &columns).unwrap();

        assert_eq!(m[[1, 0]], 2.0);
        assert!(m.column(1).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_check_binary() {
        assert!(check_binary(&[0, 1, 1]).is_ok());
        assert!(check_binary(&[0, 2]).is_err());
    }
}
