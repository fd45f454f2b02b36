// 🧱 Base Table - one row per application, target separated from features

use crate::config::{PipelineConfig, SK_ID_CURR, TARGET_COL};
use crate::error::Result;
use crate::io::{has_column, load_table, require_columns, write_json, write_parquet};
use crate::profile::id_columns;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const BASE_X_FILE: &str = "base_X.parquet";
pub const BASE_Y_FILE: &str = "base_y.parquet";
pub const BASE_METADATA_FILE: &str = "base_metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseMetadata {
    pub rows: usize,
    pub n_features: usize,
    pub id_columns: Vec<String>,
    pub has_target: bool,
}

#[derive(Debug, Clone)]
pub struct BaseTable {
    pub x: DataFrame,
    /// Single `TARGET` column (Int8), absent for unlabeled exports
    pub y: Option<DataFrame>,
    pub metadata: BaseMetadata,
}

pub fn build_base(df: DataFrame) -> Result<BaseTable> {
    require_columns(&df, &[SK_ID_CURR], "application")?;

    let (x, y) = if has_column(&df, TARGET_COL) {
        let target = df.column(TARGET_COL)?.cast(&DataType::Int8)?;
        let y = DataFrame::new(vec![target])?;
        let x = df.drop(TARGET_COL)?;
        info!("TARGET column found and separated");
        (x, Some(y))
    } else {
        info!("no TARGET column found (test set)");
        (df, None)
    };

    let ids = id_columns(&x);
    info!(id_columns = ?ids, "ID columns detected");

    let metadata = BaseMetadata {
        rows: x.height(),
        n_features: x.width(),
        id_columns: ids,
        has_target: y.is_some(),
    };

    Ok(BaseTable { x, y, metadata })
}

/// Load `application`, split off the target and persist the base table
pub fn run_build_base(config: &PipelineConfig) -> Result<BaseMetadata> {
    let res = load_table(config, "application", None)?;
    info!(shape = ?res.df.shape(), "loaded application");

    let mut base = build_base(res.df)?;
    let out_dir = config.paths.processed();

    let x_path = out_dir.join(BASE_X_FILE);
    write_parquet(&mut base.x, &x_path)?;
    info!(path = %x_path.display(), "base features saved");

    if let Some(y) = base.y.as_mut() {
        let y_path = out_dir.join(BASE_Y_FILE);
        write_parquet(y, &y_path)?;
        info!(path = %y_path.display(), "target saved");
    }

    let meta_path = out_dir.join(BASE_METADATA_FILE);
    write_json(&base.metadata, &meta_path)?;
    info!(path = %meta_path.display(), "metadata saved");

    Ok(base.metadata)
}
