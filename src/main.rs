use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credit_default_risk::{
    pipeline, profile, run_build_base, run_features, run_merge, run_split, FeatureSet,
    PipelineConfig, VERSION,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "credit-risk", version = VERSION, about = "Credit default risk pipeline")]
struct Cli {
    /// TOML config file (default: ./credit-risk.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every raw table and print a one-line report
    SmokeTest,
    /// Application overview + secondary key profiles
    Eda,
    /// Split TARGET off the application table
    BuildBase,
    /// Aggregate secondary tables to one row per customer
    Features {
        /// Only this feature set (e.g. bureau, pos_cash)
        #[arg(long)]
        table: Option<String>,
    },
    /// Join every feature table onto the base table
    Merge,
    /// Stratified train / valid / test split
    Split,
    TrainBaseline,
    TrainChampion,
    /// Valid ROC-AUC of baseline vs champion
    Compare,
    /// Champion on train + valid, scored on test
    Evaluate,
    /// Champion on train + valid, saved for serving
    TrainFinal,
    /// Every stage from build-base to train-final
    RunAll,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_env("CREDIT_RISK_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::SmokeTest => {
            println!("🔎 Smoke test - loading every table");
            for line in profile::smoke_test(&config)? {
                println!("  {}", line);
            }
        }
        Command::Eda => {
            let summary = profile::run_application_eda(&config)?;
            println!(
                "📊 application: {} rows x {} columns, {} constant",
                summary.shape.0, summary.shape.1, summary.n_constant_columns
            );
            for issue in &summary.issues {
                println!("  ⚠️  {:?} {}: {}", issue.severity, issue.column, issue.issue);
            }
            let secondary = profile::profile_secondary(&config)?;
            println!("✓ {} key profiles written", secondary.profiles.len());
        }
        Command::BuildBase => {
            let meta = run_build_base(&config)?;
            println!("✓ base table: {} rows, {} features", meta.rows, meta.n_features);
        }
        Command::Features { table } => {
            let only = match table {
                Some(name) => Some(
                    FeatureSet::from_name(&name)
                        .with_context(|| format!("unknown feature table '{}'", name))?,
                ),
                None => None,
            };
            for out in run_features(&config, only)? {
                println!("✓ {}: {} rows x {} columns", out.feature_set, out.rows, out.columns);
            }
        }
        Command::Merge => {
            let meta = run_merge(&config)?;
            println!(
                "✓ model table: {} rows, {} features ({} added)",
                meta.rows, meta.n_features, meta.n_added_features
            );
        }
        Command::Split => {
            let meta = run_split(&config)?;
            println!(
                "✓ train={} valid={} test={}",
                meta.train_size, meta.valid_size, meta.test_size
            );
        }
        Command::TrainBaseline => {
            let metrics = pipeline::run_train_baseline(&config)?;
            println!("Baseline ROC-AUC (valid): {:.4}", metrics.roc_auc_valid);
        }
        Command::TrainChampion => {
            let metrics = pipeline::run_train_champion(&config)?;
            println!("Champion ROC-AUC (valid): {:.4}", metrics.roc_auc_valid);
        }
        Command::Compare => {
            println!("MODEL COMPARISON (VALID SET)");
            for row in pipeline::run_compare(&config)? {
                println!("  {:<22}{:.4}", row.model, row.roc_auc_valid);
            }
        }
        Command::Evaluate => {
            let eval = pipeline::run_evaluate(&config)?;
            println!("FINAL TEST ROC-AUC: {:.4}\n", eval.roc_auc);
            println!("{}", eval.report);
        }
        Command::TrainFinal => {
            let meta = pipeline::run_train_final(&config)?;
            println!(
                "✓ champion saved to {} (n_features={})",
                config.paths.artifacts().display(),
                meta.n_features
            );
        }
        Command::RunAll => {
            pipeline::run_all(&config)?;
            println!("🎉 pipeline complete");
        }
    }

    Ok(())
}
