// Credit Default Risk - Core Library
// Exposes all stages for use in the CLI, the prediction server, and tests

pub mod base;
pub mod config;
pub mod error;
pub mod features;   // Secondary-table aggregators, one row per SK_ID_CURR
pub mod io;
pub mod merge;      // Left joins onto the base table
pub mod model;      // Baseline + champion, metrics
pub mod pipeline;   // Model stages and run-all
pub mod profile;    // Data understanding (smoke test, EDA summaries)
pub mod split;

#[cfg(feature = "server")]
pub mod service;

// Re-export commonly used types
pub use base::{build_base, run_build_base, BaseMetadata, BaseTable};
pub use config::{PipelineConfig, SK_ID_BUREAU, SK_ID_CURR, SK_ID_PREV, TARGET_COL};
pub use error::{PipelineError, Result};
pub use features::{
    all_aggregators, get_aggregator, run_features, FeatureAggregator, FeatureSet, SourceTables,
};
pub use io::{load_table, report_basic, require_columns, LoadResult};
pub use merge::{check_unique_key, merge_features, run_merge, MergeMetadata};
pub use model::{ChampionArtifact, ClassificationReport, Evaluation};
pub use pipeline::{
    run_all, run_compare, run_evaluate, run_train_baseline, run_train_champion, run_train_final,
};
pub use profile::{profile_application, profile_secondary, run_application_eda, smoke_test};
pub use split::{run_split, split_train_valid_test, stratified_split, Part};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
