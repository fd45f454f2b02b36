// 🔎 Data Understanding - profiles the raw tables before any feature work
// Application overview (nulls, dtypes, target balance, constant columns)
// and key/granularity checks for the secondary tables

use crate::config::{PipelineConfig, ID_PREFIX, SK_ID_BUREAU, SK_ID_CURR, SK_ID_PREV, TARGET_COL};
use crate::error::Result;
use crate::io::{has_column, load_table, missing_count, report_basic, write_json};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Columns above this missing ratio are flagged
const HIGH_NULL_RATIO: f64 = 0.5;

/// Tables a smoke test loads, in catalog order
pub const ALL_TABLES: [&str; 8] = [
    "application",
    "bureau",
    "bureau_balance",
    "previous_application",
    "pos_cash_balance",
    "installments_payments",
    "credit_card_balance",
    "columns_description",
];

/// Secondary tables and the keys that define their granularity
pub const SECONDARY_KEYS: [(&str, &[&str]); 6] = [
    ("bureau", &[SK_ID_CURR, SK_ID_BUREAU]),
    ("bureau_balance", &[SK_ID_BUREAU]),
    ("previous_application", &[SK_ID_CURR, SK_ID_PREV]),
    ("pos_cash_balance", &[SK_ID_PREV]),
    ("installments_payments", &[SK_ID_PREV]),
    ("credit_card_balance", &[SK_ID_PREV]),
];

// ============================================================================
// QUALITY ISSUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Table cannot be used as-is
    Warning,  // Column is mostly empty
    Info,     // Column carries no signal
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub column: String,
    pub issue: String,
    pub recommendation: String,
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSummary {
    pub shape: (usize, usize),
    pub n_columns: usize,
    pub dtype_counts: BTreeMap<String, usize>,
    /// Highest missing ratios first
    pub top_null_columns: Vec<(String, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_counts: Option<BTreeMap<i64, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_distribution: Option<BTreeMap<i64, f64>>,
    pub id_columns: Vec<String>,
    pub constant_columns: Vec<String>,
    pub n_constant_columns: usize,
    pub issues: Vec<QualityIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyProfile {
    pub table: String,
    pub rows: usize,
    pub key: String,
    pub n_unique: Option<usize>,
    pub missing: Option<usize>,
    pub avg_rows_per_key: Option<f64>,
    pub top_5_key_counts: Option<Vec<(i64, usize)>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryProfile {
    pub profiles: Vec<KeyProfile>,
    /// Rows repeating an SK_ID_BUREAU already seen in bureau
    pub bureau_duplicated_ids: Option<usize>,
    /// Rows repeating an SK_ID_PREV already seen in previous_application
    pub previous_duplicated_ids: Option<usize>,
}

// ============================================================================
// HELPERS
// ============================================================================

pub fn id_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|c| c.starts_with(ID_PREFIX))
        .map(str::to_string)
        .collect()
}

/// Rows whose key value already appeared earlier in the column
pub fn duplicated_count(series: &Series) -> Result<usize> {
    Ok(series.len() - series.n_unique()?)
}

fn value_counts_i64(series: &Series) -> Result<HashMap<i64, usize>> {
    let values = series.cast(&DataType::Int64)?;
    let mut counts = HashMap::new();
    for v in values.i64()?.into_iter().flatten() {
        *counts.entry(v).or_insert(0) += 1;
    }
    Ok(counts)
}

// ============================================================================
// APPLICATION OVERVIEW
// ============================================================================

pub fn profile_application(df: &DataFrame) -> Result<ApplicationSummary> {
    let rows = df.height();
    let mut dtype_counts = BTreeMap::new();
    let mut null_ratios = Vec::new();
    let mut constant_columns = Vec::new();
    let mut issues = Vec::new();

    for series in df.get_columns() {
        let name = series.name().to_string();
        *dtype_counts.entry(series.dtype().to_string()).or_insert(0) += 1;

        let ratio = if rows == 0 {
            0.0
        } else {
            missing_count(series)? as f64 / rows as f64
        };
        if ratio > HIGH_NULL_RATIO {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                column: name.clone(),
                issue: format!("{:.1}% missing", ratio * 100.0),
                recommendation: "Rely on imputation or drop the column".to_string(),
            });
        }
        null_ratios.push((name.clone(), ratio));

        if series.drop_nulls().n_unique()? <= 1 {
            issues.push(QualityIssue {
                severity: Severity::Info,
                column: name.clone(),
                issue: "constant column".to_string(),
                recommendation: "Exclude from modeling".to_string(),
            });
            constant_columns.push(name);
        }
    }

    null_ratios.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    null_ratios.truncate(20);

    let (target_counts, target_distribution) = if has_column(df, TARGET_COL) {
        let counts: BTreeMap<i64, usize> = value_counts_i64(df.column(TARGET_COL)?)?
            .into_iter()
            .collect();
        let total: usize = counts.values().sum();
        let distribution = counts
            .iter()
            .map(|(k, v)| (*k, *v as f64 / total.max(1) as f64))
            .collect();
        (Some(counts), Some(distribution))
    } else {
        info!("no TARGET column found (likely test set)");
        (None, None)
    };

    if !has_column(df, SK_ID_CURR) {
        issues.push(QualityIssue {
            severity: Severity::Critical,
            column: SK_ID_CURR.to_string(),
            issue: "customer key is missing".to_string(),
            recommendation: "Check the application export".to_string(),
        });
    }

    Ok(ApplicationSummary {
        shape: df.shape(),
        n_columns: df.width(),
        dtype_counts,
        top_null_columns: null_ratios,
        target_counts,
        target_distribution,
        id_columns: id_columns(df),
        n_constant_columns: constant_columns.len(),
        constant_columns,
        issues,
    })
}

// ============================================================================
// KEY / GRANULARITY CHECKS
// ============================================================================

pub fn key_profile(df: &DataFrame, key: &str, table: &str) -> Result<KeyProfile> {
    let rows = df.height();

    if !has_column(df, key) {
        return Ok(KeyProfile {
            table: table.to_string(),
            rows,
            key: key.to_string(),
            n_unique: None,
            missing: None,
            avg_rows_per_key: None,
            top_5_key_counts: None,
        });
    }

    let series = df.column(key)?;
    let n_unique = series.drop_nulls().n_unique()?;
    let missing = series.null_count();

    let mut top: Vec<(i64, usize)> = value_counts_i64(series)?.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(5);

    Ok(KeyProfile {
        table: table.to_string(),
        rows,
        key: key.to_string(),
        n_unique: Some(n_unique),
        missing: Some(missing),
        avg_rows_per_key: (n_unique > 0).then(|| rows as f64 / n_unique as f64),
        top_5_key_counts: Some(top),
    })
}

// ============================================================================
// STAGE RUNNERS
// ============================================================================

/// Load every catalog table and log a one-line report for each
pub fn smoke_test(config: &PipelineConfig) -> Result<Vec<String>> {
    let mut reports = Vec::new();
    for name in ALL_TABLES {
        let res = load_table(config, name, None)?;
        let report = report_basic(&res.df, name, 10)?;
        info!("{}", report);
        reports.push(report);
    }
    Ok(reports)
}

pub fn run_application_eda(config: &PipelineConfig) -> Result<ApplicationSummary> {
    let res = load_table(config, "application", None)?;
    info!("{}", report_basic(&res.df, "application", 10)?);

    let summary = profile_application(&res.df)?;
    for issue in summary
        .issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
    {
        warn!(column = %issue.column, "{}", issue.issue);
    }
    info!(
        id_columns = ?summary.id_columns,
        constant_columns = summary.n_constant_columns,
        "application profiled"
    );

    let out_path = config.paths.interim().join("eda_application_summary.json");
    write_json(&summary, &out_path)?;
    info!(path = %out_path.display(), "EDA summary saved");

    Ok(summary)
}

pub fn profile_secondary(config: &PipelineConfig) -> Result<SecondaryProfile> {
    let mut profiles = Vec::new();
    let mut bureau_duplicated_ids = None;
    let mut previous_duplicated_ids = None;

    for (name, keys) in SECONDARY_KEYS {
        let res = load_table(config, name, None)?;
        info!("{}", report_basic(&res.df, name, 10)?);

        for key in keys.iter().filter(|k| has_column(&res.df, k)) {
            let profile = key_profile(&res.df, key, name)?;
            info!(
                table = name,
                key = *key,
                unique = ?profile.n_unique,
                missing = ?profile.missing,
                avg_rows_per_key = ?profile.avg_rows_per_key,
                "key profile"
            );
            profiles.push(profile);
        }

        if name == "bureau" && has_column(&res.df, SK_ID_BUREAU) {
            let dup = duplicated_count(res.df.column(SK_ID_BUREAU)?)?;
            info!(duplicated = dup, "duplicated SK_ID_BUREAU rows in bureau");
            bureau_duplicated_ids = Some(dup);
        }
        if name == "previous_application" && has_column(&res.df, SK_ID_PREV) {
            let dup = duplicated_count(res.df.column(SK_ID_PREV)?)?;
            info!(duplicated = dup, "duplicated SK_ID_PREV rows in previous_application");
            previous_duplicated_ids = Some(dup);
        }
    }

    let profile = SecondaryProfile {
        profiles,
        bureau_duplicated_ids,
        previous_duplicated_ids,
    };

    let out_path = config.paths.interim().join("eda_secondary_key_profiles.json");
    write_json(&profile, &out_path)?;
    info!(path = %out_path.display(), "key profiles saved");

    Ok(profile)
}
