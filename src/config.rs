// ⚙️ Pipeline Configuration
// Layered: built-in defaults < credit-risk.toml < CREDIT_RISK_* environment
//
// Nested keys use `__` in the environment, e.g.
//   CREDIT_RISK_PATHS__RAW_DIR=/mnt/raw  ->  paths.raw_dir
//   CREDIT_RISK_MODEL__THRESHOLD=0.4     ->  model.threshold

use crate::error::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// KEYS
// ============================================================================

/// Customer identifier, primary join key of the modeling table
pub const SK_ID_CURR: &str = "SK_ID_CURR";

/// Previous application identifier (many-to-one with SK_ID_CURR)
pub const SK_ID_PREV: &str = "SK_ID_PREV";

/// Bureau credit line identifier (many-to-one with SK_ID_CURR)
pub const SK_ID_BUREAU: &str = "SK_ID_BUREAU";

/// Binary default label (1 = default)
pub const TARGET_COL: &str = "TARGET";

/// Prefix shared by every identifier column
pub const ID_PREFIX: &str = "SK_ID";

pub const DEFAULT_CONFIG_FILE: &str = "credit-risk.toml";
pub const ENV_PREFIX: &str = "CREDIT_RISK_";

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub project_root: PathBuf,
    pub raw_dir: PathBuf,
    pub interim_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            project_root: PathBuf::from("."),
            raw_dir: PathBuf::from("data/raw"),
            interim_dir: PathBuf::from("data/interim"),
            processed_dir: PathBuf::from("data/processed"),
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

impl PathsConfig {
    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.project_root.join(dir)
        }
    }

    pub fn raw(&self) -> PathBuf {
        self.resolve(&self.raw_dir)
    }

    pub fn interim(&self) -> PathBuf {
        self.resolve(&self.interim_dir)
    }

    pub fn processed(&self) -> PathBuf {
        self.resolve(&self.processed_dir)
    }

    pub fn artifacts(&self) -> PathBuf {
        self.resolve(&self.artifacts_dir)
    }
}

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChampionParams {
    pub max_depth: u32,
    pub learning_rate: f32,
    pub max_iter: usize,
    pub max_leaf_nodes: usize,
    pub min_leaf_size: usize,
    /// Sample weight for TARGET = 1 (TARGET = 0 weighs 1.0)
    pub positive_class_weight: f32,
}

impl Default for ChampionParams {
    fn default() -> Self {
        ChampionParams {
            max_depth: 6,
            learning_rate: 0.05,
            max_iter: 300,
            max_leaf_nodes: 31,
            min_leaf_size: 20,
            positive_class_weight: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineParams {
    pub max_iter: usize,
    /// Inverse L2 regularization strength
    pub c: f64,
    pub learning_rate: f64,
    pub tolerance: f64,
    /// Reweight classes by n / (2 * n_class)
    pub balanced: bool,
}

impl Default for BaselineParams {
    fn default() -> Self {
        BaselineParams {
            max_iter: 1000,
            c: 1.0,
            learning_rate: 0.5,
            tolerance: 1e-6,
            balanced: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub random_state: u64,
    pub threshold: f64,
    pub champion: ChampionParams,
    pub baseline: BaselineParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            random_state: 42,
            threshold: 0.5,
            champion: ChampionParams::default(),
            baseline: BaselineParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_files() -> BTreeMap<String, String> {
    [
        ("application", "application_.parquet"),
        ("bureau", "bureau.parquet"),
        ("bureau_balance", "bureau_balance.parquet"),
        ("previous_application", "previous_application.parquet"),
        ("pos_cash_balance", "POS_CASH_balance.parquet"),
        ("installments_payments", "installments_payments.parquet"),
        ("credit_card_balance", "credit_card_balance.parquet"),
        ("columns_description", "HomeCredit_columns_description.parquet"),
    ]
    .into_iter()
    .map(|(name, file)| (name.to_string(), file.to_string()))
    .collect()
}

// ============================================================================
// ROOT CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    /// Logical table name -> file name inside the raw directory
    pub files: BTreeMap<String, String>,
    pub model: ModelConfig,
    pub server: ServerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            paths: PathsConfig::default(),
            files: default_files(),
            model: ModelConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from defaults, an optional TOML file and the environment.
    ///
    /// Without an explicit path, `credit-risk.toml` in the working
    /// directory is used when it exists.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Ok(Self::figment(config_file).extract()?)
    }

    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Config rooted at `root`, everything else default
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.project_root = root.into();
        config
    }

    pub fn table_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}
