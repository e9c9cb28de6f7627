//! HAM10000 Skin Lesion Classifier CLI
//!
//! Trains the lesion CNN end to end, classifies single images with a saved
//! model and prints metadata statistics.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use ham10000_cnn::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use ham10000_cnn::dataset::{lesion_type_name, MetadataTable};
use ham10000_cnn::inference::{load_model, predict_image};
use ham10000_cnn::model::config::PipelineConfig;
use ham10000_cnn::pipeline::{run_pipeline, PipelineReport};
use ham10000_cnn::utils::logging::{init_logging, LogConfig};
use ham10000_cnn::utils::{format_duration, format_progress_bar};

/// HAM10000 Skin Lesion Classification
///
/// Balances the HAM10000 metadata, trains a small CNN with the Burn framework
/// and reports test accuracy, the confusion matrix and per-class error.
#[derive(Parser, Debug)]
#[command(name = "ham10000_cnn")]
#[command(version)]
#[command(about = "Skin lesion classification on HAM10000 with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose
    #[arg(long)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline: balance, load, split, train, evaluate
    Train {
        /// JSON pipeline configuration; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to HAM10000_metadata.csv
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Directory holding the image folders (searched recursively)
        #[arg(long)]
        image_dir: Option<PathBuf>,

        /// Samples drawn per class when balancing
        #[arg(long)]
        samples_per_class: Option<usize>,

        /// Side length images are resized to
        #[arg(long)]
        image_size: Option<usize>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Fraction of the balanced set held out for testing
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Random seed for balancing, splitting and shuffling
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for charts, the confusion matrix and the model
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Save the trained model under <output-dir>/model
        #[arg(long, default_value = "false")]
        save_model: bool,

        /// Classify this image with the trained model
        #[arg(long)]
        predict: Option<PathBuf>,
    },

    /// Classify a single image with a saved model
    Predict {
        /// Directory written by `train --save-model`
        #[arg(short, long)]
        model: PathBuf,

        /// Path to the lesion image
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Show metadata statistics
    Stats {
        /// Path to HAM10000_metadata.csv
        #[arg(short, long, default_value = "data/HAM10000_metadata.csv")]
        metadata: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = match (&cli.log_level, cli.verbose) {
        (Some(name), _) => LogConfig::with_level_name(name)?,
        (None, true) => LogConfig::verbose(),
        (None, false) => LogConfig::default(),
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            metadata,
            image_dir,
            samples_per_class,
            image_size,
            epochs,
            batch_size,
            learning_rate,
            test_fraction,
            seed,
            output_dir,
            save_model,
            predict,
        } => {
            let mut pipeline = match config {
                Some(path) => PipelineConfig::load(&path)
                    .with_context(|| format!("Failed to read config {:?}", path))?,
                None => PipelineConfig::default(),
            };

            if let Some(v) = metadata {
                pipeline.metadata_path = v;
            }
            if let Some(v) = image_dir {
                pipeline.image_dir = v;
            }
            if let Some(v) = samples_per_class {
                pipeline.samples_per_class = v;
            }
            if let Some(v) = image_size {
                pipeline.image_size = v;
            }
            if let Some(v) = epochs {
                pipeline.training.epochs = v;
            }
            if let Some(v) = batch_size {
                pipeline.training.batch_size = v;
            }
            if let Some(v) = learning_rate {
                pipeline.training.learning_rate = v;
            }
            if let Some(v) = test_fraction {
                pipeline.split.test_fraction = v;
            }
            if let Some(v) = seed {
                pipeline.balance_seed = v;
                pipeline.split.seed = v;
                pipeline.training.seed = v;
            }
            if output_dir.is_some() {
                pipeline.output_dir = output_dir;
            }
            pipeline.save_model |= save_model;
            if predict.is_some() {
                pipeline.predict_image = predict;
            }

            cmd_train(&pipeline)?;
        }

        Commands::Predict { model, image } => {
            cmd_predict(&model, &image)?;
        }

        Commands::Stats { metadata } => {
            cmd_stats(&metadata)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   HAM10000 Skin Lesion Classification                            ║
 ║   Convolutional Network with Burn + Rust                         ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: &PipelineConfig) -> Result<()> {
    info!("Starting pipeline on the {} backend", backend_name());
    info!("  Metadata: {:?}", config.metadata_path);
    info!("  Images: {:?}", config.image_dir);
    info!(
        "  {} samples/class, {}x{} images, {} epochs, batch {}",
        config.samples_per_class,
        config.image_size,
        config.image_size,
        config.training.epochs,
        config.training.batch_size
    );

    let start = std::time::Instant::now();
    let report = run_pipeline::<TrainingBackend>(config).context("Pipeline failed")?;

    print_report(&report);
    println!(
        "{} {}",
        "Total time:".cyan(),
        format_duration(start.elapsed().as_secs_f64())
    );

    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!();
    println!("{}", "Dataset:".cyan().bold());
    println!("  Metadata records:  {}", report.metadata_records);
    println!("  Balanced samples:  {}", report.balanced_samples);
    println!("  Distinct images:   {}", report.distinct_images);
    println!("  Train / test:      {} / {}", report.train_size, report.test_size);
    println!();

    println!(
        "{} {:.2}%",
        "Test accuracy:".green().bold(),
        report.test_accuracy() * 100.0
    );
    println!();

    println!("{}", "Confusion Matrix:".cyan().bold());
    println!("{}", report.confusion_matrix().display(Some(&report.class_names)));

    println!("{}", "Per-class Metrics:".cyan().bold());
    println!("{}", report.evaluation.metrics.display());

    println!("{}", "Fraction Classified Incorrectly:".cyan().bold());
    for (name, error) in report.class_names.iter().zip(report.per_class_error()) {
        println!("  {:8} {}", name, format_progress_bar(error, 30));
    }
    println!();

    if let Some(prediction) = &report.prediction {
        println!("{}", "Prediction:".yellow().bold());
        println!("{}", prediction);
    }

    if let Some(dir) = &report.model_dir {
        println!("{} {:?}", "Model saved to:".green(), dir);
    }
    for path in &report.artifacts {
        println!("  {} {:?}", "wrote".dimmed(), path);
    }
}

fn cmd_predict(model_dir: &Path, image: &Path) -> Result<()> {
    info!("Loading model from {:?}", model_dir);

    let device = default_device();
    let (model, manifest) = load_model::<DefaultBackend>(model_dir, &device)
        .with_context(|| format!("Failed to load model from {:?}", model_dir))?;

    let result = predict_image(
        &model,
        image,
        &manifest.class_names,
        manifest.image_size,
        &device,
    )?;

    println!("{}", "Prediction:".yellow().bold());
    println!("{}", result);

    Ok(())
}

fn cmd_stats(metadata: &Path) -> Result<()> {
    info!("Computing metadata statistics for: {:?}", metadata);

    if !metadata.exists() {
        println!(
            "{} Metadata file not found: {:?}",
            "Error:".red(),
            metadata
        );
        return Ok(());
    }

    let table = MetadataTable::from_csv(metadata)?;
    let summary = table.summary();
    let total = summary.total_records.max(1) as f64;

    println!("{}", "Metadata Statistics:".cyan().bold());
    println!("  Total records: {}", summary.total_records);
    println!();

    println!("{}", "Diagnosis Distribution:".cyan().bold());
    for (code, count) in &summary.by_diagnosis {
        let name = lesion_type_name(code).unwrap_or("Unknown");
        println!(
            "  {:6} {:32} {:>5} ({:>5.1}%)",
            code,
            name,
            count,
            100.0 * *count as f64 / total
        );
    }
    println!();

    println!("{}", "Sex:".cyan().bold());
    for (sex, count) in &summary.by_sex {
        println!("  {:12} {:>5}", sex, count);
    }
    println!();

    println!("{}", "Localization:".cyan().bold());
    for (site, count) in &summary.by_localization {
        println!("  {:18} {:>5}", site, count);
    }
    println!();

    println!("{}", "Age:".cyan().bold());
    for (bucket, count) in &summary.age_histogram {
        println!("  {:>3}-{:<3} {:>5}", bucket, bucket + 9, count);
    }
    if summary.missing_age > 0 {
        println!("  missing {:>5}", summary.missing_age);
    }

    Ok(())
}
