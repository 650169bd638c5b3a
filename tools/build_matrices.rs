//! Feature/Target Matrix Build Tool
//!
//! Configuration-driven batch builder: one feature matrix and one target
//! matrix per day file found in `dataset.input_dir`.
//!
//! # Output Format
//!
//! - **Features**: `{day}_features.{csv|npy}`
//! - **Targets**: `{day}_targets.{csv|npy}`
//! - **Metadata**: `{day}_metadata.json`
//! - **Manifest**: `manifest.json` - per-day state, rows, errors
//!
//! # Usage
//!
//! ```bash
//! # From TOML config
//! cargo run --release --bin build_matrices -- --config configs/hawaii.toml
//!
//! # Override worker count
//! cargo run --release --bin build_matrices -- --config configs/hawaii.toml --jobs 8
//!
//! # Generate sample config
//! cargo run --release --bin build_matrices -- --generate-config hawaii.toml
//! ```
//!
//! Exit status is non-zero when the configuration is invalid or any day
//! failed. Failed day ids are listed in the manifest for resubmission.

use clap::Parser;
use solarnc_features::batch::{discover_day_files, BatchProcessor, ConsoleProgress};
use solarnc_features::export::DayExporter;
use solarnc_features::schema::{ColumnScope, Station};
use solarnc_features::source::{CsvDaySource, DaySource};
use solarnc_features::transforms::TransformKind;
use solarnc_features::{Pipeline, PipelineConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "build_matrices", about = "Build lagged feature and horizon target matrices")]
struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(long, value_name = "FILE", required_unless_present = "generate_config")]
    config: Option<PathBuf>,

    /// Worker count (overrides batch.threads)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Write a sample configuration and exit
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if let Some(path) = cli.generate_config {
        return generate_sample_config(&path);
    }

    match cli.config {
        Some(path) => run_from_config(&path, cli.jobs),
        None => ExitCode::FAILURE,
    }
}

/// Generate a sample configuration file
fn generate_sample_config(path: &Path) -> ExitCode {
    let sample = PipelineConfig::default()
        .with_stations(vec![Station::named("AP1"), Station::named("AP3")])
        .with_timezone("Pacific/Honolulu")
        .with_transform(TransformKind::Ratio {
            numerator: "GHI".to_string(),
            denominator: "ineichen_ghi".to_string(),
            output: "K_ineichen".to_string(),
            scope: ColumnScope::PerStation,
        });

    match sample.save(path) {
        Ok(()) => {
            println!("✅ Generated sample config: {}", path.display());
            println!("\nEdit the following fields before running:");
            println!("  - dataset.input_dir: Directory with one CSV file per day");
            println!("  - dataset.stations: Stations present in the day files");
            println!("  - features / horizons: Columns, window and lead times");
            println!("  - output.dir: Where matrices are written");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error generating config: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the batch from a configuration file
fn run_from_config(config_path: &Path, jobs: Option<usize>) -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Feature/Target Matrix Builder                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut config = match PipelineConfig::load(config_path) {
        Ok(c) => {
            println!("✅ Loaded configuration: {}", config_path.display());
            c
        }
        Err(e) => {
            eprintln!("❌ Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(n) = jobs {
        config = config.with_threads(n);
    }

    match run_batch(&config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ Build failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_config_summary(config: &PipelineConfig, n_features: usize, n_targets: usize) {
    let stations: Vec<&str> = config.dataset.stations.iter().map(|s| s.name.as_str()).collect();
    println!("┌─ Configuration Summary ───────────────────────────────────────┐");
    println!("│ Dataset:    {:<49} │", config.dataset.name);
    println!("│ Timezone:   {:<49} │", config.dataset.timezone);
    println!("│ Stations:   {:<49} │", stations.join(", "));
    println!("│");
    println!("│   Period:          {}", config.features.period);
    println!("│   Window:          {}", config.features.window);
    println!("│   Feature columns: {n_features}");
    println!("│   Target columns:  {n_targets}");
    println!("│   Transforms:      {}", config.transforms.len());
    println!("│");
    println!("│ Input:      {}", config.dataset.input_dir.display());
    println!("│ Output:     {} ({})", config.output.dir.display(), config.output.format.extension());
    println!("└────────────────────────────────────────────────────────────────┘");
    println!();
}

/// Returns whether every day succeeded.
fn run_batch(config: &PipelineConfig) -> solarnc_features::Result<bool> {
    let spec = Arc::new(config.build_spec()?);
    println!("✅ Configuration validated");
    print_config_summary(config, spec.feature_names().len(), spec.target_names().len());

    let source = CsvDaySource::new().with_columns(spec.input_columns());
    let files = discover_day_files(&config.dataset.input_dir, source.extension())?;
    if files.is_empty() {
        println!("⚠️  No day files found in {}", config.dataset.input_dir.display());
        return Ok(true);
    }
    println!("📁 Found {} day files", files.len());

    let batch_config = config.batch_config();
    println!(
        "🚀 Starting build (using {} threads)...",
        batch_config.effective_threads()
    );
    println!();

    let exporter = DayExporter::new(&config.output.dir, config.output.format);
    let processor = BatchProcessor::new(
        Arc::new(Pipeline::new(spec)),
        Arc::new(source),
        exporter,
        batch_config,
    )
    .with_progress_callback(Box::new(ConsoleProgress::new()));

    let manifest = processor.process_files(&files)?;

    std::fs::create_dir_all(&config.output.dir)?;
    let manifest_path = config.output.dir.join("manifest.json");
    manifest.save_json(&manifest_path)?;
    println!("📋 Saved manifest: {}", manifest_path.display());

    for id in manifest.failed_ids() {
        if let Some(err) = manifest.record(id).and_then(|r| r.error.as_deref()) {
            eprintln!("    ❌ {id}: {err}");
        }
    }

    Ok(manifest.failed_count() == 0)
}
