use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A raw table loaded by logical name
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub name: String,
    pub path: PathBuf,
    pub df: DataFrame,
}

/// Resolve a logical table name to its file inside the raw directory
pub fn table_path(config: &PipelineConfig, name: &str) -> Result<PathBuf> {
    let file = config
        .files
        .get(name)
        .ok_or_else(|| PipelineError::UnknownTable {
            name: name.to_string(),
            options: config.table_names(),
        })?;

    Ok(config.paths.raw().join(file))
}

/// Load a raw parquet table by logical name (e.g. "bureau")
///
/// `columns` projects the read; every projected column must exist.
pub fn load_table(
    config: &PipelineConfig,
    name: &str,
    columns: Option<&[&str]>,
) -> Result<LoadResult> {
    let path = table_path(config, name)?;
    let df = read_parquet(&path, columns)?;

    info!(table = name, rows = df.height(), cols = df.width(), "loaded table");

    Ok(LoadResult {
        name: name.to_string(),
        path,
        df,
    })
}

pub fn read_parquet(path: &Path, columns: Option<&[&str]>) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.to_path_buf()));
    }

    let file = File::open(path)?;
    let reader = ParquetReader::new(file)
        .with_columns(columns.map(|cols| cols.iter().map(|c| c.to_string()).collect()));

    Ok(reader.finish()?)
}

/// Read an intermediate table from the processed directory
pub fn read_processed(path: &Path, name: &str) -> Result<DataFrame> {
    let df = read_parquet(path, None)?;
    info!(table = name, shape = ?df.shape(), "loaded processed table");
    Ok(df)
}

pub fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)?;
    ParquetWriter::new(file).finish(df)?;
    debug!(path = %path.display(), rows = df.height(), "wrote parquet");
    Ok(())
}

pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    debug!(path = %path.display(), "wrote json");
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.to_path_buf()));
    }
    Ok(serde_json::from_reader(File::open(path)?)?)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Fail when any required column is absent; reports all of them at once
pub fn require_columns(df: &DataFrame, required: &[&str], table: &str) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|c| df.column(c).is_err())
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingColumns {
            table: table.to_string(),
            missing,
        })
    }
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| *c == name)
}

/// Null count, plus NaN for float columns
pub fn missing_count(series: &Series) -> Result<usize> {
    if series.dtype().is_float() {
        let values = series.cast(&DataType::Float64)?;
        Ok(values
            .f64()?
            .into_iter()
            .filter(|v| v.map_or(true, f64::is_nan))
            .count())
    } else {
        Ok(series.null_count())
    }
}

pub fn total_nulls(df: &DataFrame) -> Result<usize> {
    df.get_columns().iter().map(missing_count).sum()
}

/// One-line console summary of a table
pub fn report_basic(df: &DataFrame, name: &str, max_cols: usize) -> Result<String> {
    let preview: Vec<&str> = df.get_column_names().into_iter().take(max_cols).collect();
    Ok(format!(
        "{}: shape=({}, {}), cols_preview={:?}, nulls_total={}",
        name,
        df.height(),
        df.width(),
        preview,
        total_nulls(df)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_frame() -> DataFrame {
        df!(
            "SK_ID_CURR" => &[1i64, 2, 3],
            "AMT_CREDIT" => &[Some(100.0), None, Some(300.0)],
            "NAME" => &[Some("a"), Some("b"), None]
        )
        .unwrap()
    }

    #[test]
    fn test_require_columns_reports_all_missing() {
        let df = sample_frame();

        let err = require_columns(&df, &["SK_ID_CURR", "SK_ID_PREV", "MONTHS_BALANCE"], "pos")
            .unwrap_err();

        match err {
            PipelineError::MissingColumns { table, missing } => {
                assert_eq!(table, "pos");
                assert_eq!(missing, vec!["SK_ID_PREV", "MONTHS_BALANCE"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(require_columns(&df, &["SK_ID_CURR"], "pos").is_ok());
    }

    #[test]
    fn test_report_basic() {
        let df = sample_frame();

        let report = report_basic(&df, "application", 2).unwrap();

        assert_eq!(
            report,
            "application: shape=(3, 3), cols_preview=[\"SK_ID_CURR\", \"AMT_CREDIT\"], nulls_total=2"
        );
    }

    #[test]
    fn test_missing_count_includes_nan() {
        let series = Series::new("x", &[Some(1.0), Some(f64::NAN), None]);
        assert_eq!(missing_count(&series).unwrap(), 2);
    }

    #[test]
    fn test_report_counts_nan_as_missing() {
        let df = df!(
            "SK_ID_CURR" => &[1i64, 2, 3],
            "AMT_ANNUITY" => &[Some(f64::NAN), None, Some(3.0)]
        )
        .unwrap();

        let report = report_basic(&df, "application", 1).unwrap();

        assert!(report.ends_with("nulls_total=2"), "{report}");
    }

    #[test]
    fn test_unknown_table() {
        let config = PipelineConfig::default();

        let err = load_table(&config, "loans", None).unwrap_err();

        assert!(matches!(err, PipelineError::UnknownTable { .. }));
        assert!(err.to_string().contains("bureau_balance"));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::with_root(dir.path());

        let err = load_table(&config, "bureau", None).unwrap_err();

        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }

    #[test]
    fn test_parquet_round_trip_with_projection() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::with_root(dir.path());
        let mut df = sample_frame();

        write_parquet(&mut df, &config.paths.raw().join("bureau.parquet")).unwrap();
        let loaded = load_table(&config, "bureau", Some(&["SK_ID_CURR"])).unwrap();

        assert_eq!(loaded.name, "bureau");
        assert_eq!(loaded.df.shape(), (3, 1));
        assert!(loaded.path.ends_with("data/raw/bureau.parquet"));
    }
}
