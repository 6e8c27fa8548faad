use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memtriage_codegen::{write_forest_module, DEFAULT_MODULE_NAME};
use memtriage_data::{group_records, select_source, SyntheticConfig};
use memtriage_ml::{
    build_dataset, evaluate, train_test_split, Action, FeatureVector, ForestConfig, Normalization,
    RandomForest, RateForm, FEATURE_NAMES,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// memtriage - DRAM error triage and decision-engine generation
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the triage ensemble and emit the SystemVerilog decision engine
    Generate {
        /// Error-log CSV (falls back to synthetic data when absent)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output path for the generated module
        #[arg(short, long, default_value = "ML_engine_RF.sv")]
        output: PathBuf,

        /// Name of the generated module
        #[arg(long, default_value = DEFAULT_MODULE_NAME)]
        module_name: String,

        /// Number of trees in the ensemble
        #[arg(long, default_value_t = 5)]
        trees: usize,

        /// Maximum tree depth
        #[arg(long, default_value_t = 6)]
        max_depth: usize,

        /// Cap on CSV rows read
        #[arg(long, default_value_t = 200_000)]
        max_rows: usize,

        /// Fraction of groups held out for evaluation
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,

        /// RNG seed for splitting and training
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Also persist the trained ensemble as JSON
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Extract per-group features and labels to CSV without training
    Features {
        /// Error-log CSV (falls back to synthetic data when absent)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV path
        #[arg(short, long, default_value = "features.csv")]
        output: PathBuf,

        /// Emit the error rate as a raw ratio instead of the scaled
        /// integer, and persist min/max normalization constants
        #[arg(long)]
        ratio: bool,

        /// Normalization constants path (ratio form only)
        #[arg(long, default_value = "normalization.json")]
        normalization: PathBuf,

        /// Cap on CSV rows read
        #[arg(long, default_value_t = 200_000)]
        max_rows: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Generate {
            input,
            output,
            module_name,
            trees,
            max_depth,
            max_rows,
            test_fraction,
            seed,
            model,
        } => {
            run_generate(
                input.as_deref(),
                &output,
                &module_name,
                trees,
                max_depth,
                max_rows,
                test_fraction,
                seed,
                model.as_deref(),
            )?;
        }

        Commands::Features {
            input,
            output,
            ratio,
            normalization,
            max_rows,
        } => {
            run_features(input.as_deref(), &output, ratio, &normalization, max_rows)?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_generate(
    input: Option<&Path>,
    output: &Path,
    module_name: &str,
    trees: usize,
    max_depth: usize,
    max_rows: usize,
    test_fraction: f64,
    seed: u64,
    model: Option<&Path>,
) -> Result<()> {
    let (features, labels) = load_dataset(input, max_rows, RateForm::ScaledInt)?;
    let rows: Vec<Vec<f64>> = features.iter().map(|f| f.to_array().to_vec()).collect();

    let split = train_test_split(&rows, &labels, test_fraction, seed);
    info!(
        "split dataset: {} training groups, {} test groups",
        split.train_x.len(),
        split.test_x.len()
    );

    let config = ForestConfig {
        num_trees: trees,
        max_depth,
        seed,
        ..ForestConfig::default()
    };
    let forest = RandomForest::fit(&split.train_x, &split.train_y, &config)
        .context("training the triage ensemble")?;

    let report = evaluate(&forest, &split.test_x, &split.test_y);
    println!("{}", report);

    if let Some(model_path) = model {
        forest
            .save(model_path)
            .with_context(|| format!("saving model to {}", model_path.display()))?;
        println!("Model saved to: {}", model_path.display());
    }

    write_forest_module(&forest, &FEATURE_NAMES, module_name, output)
        .with_context(|| format!("writing hardware module to {}", output.display()))?;
    println!("Hardware module written to: {}", output.display());

    Ok(())
}

fn run_features(
    input: Option<&Path>,
    output: &Path,
    ratio: bool,
    normalization: &Path,
    max_rows: usize,
) -> Result<()> {
    let form = if ratio {
        RateForm::Ratio
    } else {
        RateForm::ScaledInt
    };
    let (features, labels) = load_dataset(input, max_rows, form)?;
    let rows: Vec<Vec<f64>> = features.iter().map(|f| f.to_array().to_vec()).collect();

    let mut csv = FEATURE_NAMES.join(",");
    csv.push_str(",action\n");
    for (row, action) in rows.iter().zip(&labels) {
        for value in row {
            csv.push_str(&format!("{},", value));
        }
        csv.push_str(&format!("{}\n", action.to_index()));
    }
    std::fs::write(output, csv)
        .with_context(|| format!("writing features to {}", output.display()))?;
    println!("Features written to: {}", output.display());

    if ratio {
        match Normalization::fit(&rows) {
            Some(norm) => {
                norm.save(normalization).with_context(|| {
                    format!("saving normalization to {}", normalization.display())
                })?;
                println!("Normalization written to: {}", normalization.display());
            }
            None => warn!("dataset is empty, skipping normalization constants"),
        }
    }

    Ok(())
}

fn load_dataset(
    input: Option<&Path>,
    max_rows: usize,
    form: RateForm,
) -> Result<(Vec<FeatureVector>, Vec<Action>)> {
    let source = select_source(input, max_rows, SyntheticConfig::default());
    let records = source
        .load()
        .with_context(|| format!("loading error records from {}", source.describe()))?;
    info!("loaded {} error records", records.len());

    let groups = group_records(records);
    info!("aggregated {} error groups", groups.len());

    let (features, labels) = build_dataset(&groups, form).context("extracting group features")?;
    Ok((features, labels))
}
