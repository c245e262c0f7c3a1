use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use splat_sweep::aggregate::Aggregator;
use splat_sweep::baseline::run_baseline;
use splat_sweep::compare::{diff_clouds, read_vertex_columns, reencode_ply, CloudDiff};
use splat_sweep::compressor::CompressorTool;
use splat_sweep::config::ExperimentConfig;
use splat_sweep::gaussian_ply::{load_gaussian_ply, write_draco_ply};
use splat_sweep::layout::Family;
use splat_sweep::materialize::materialize_all;
use splat_sweep::sweep::{ReusePolicy, SweepDriver, SweepSummary};
use splat_sweep::table::write_table;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
enum Commands {
    /// Convert a Gaussian-Splatting .ply into the flat layout the compressor reads
    Convert {
        #[arg(value_name = "INPUT")]
        /// The trained point cloud
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        /// The compressor input .ply
        output: PathBuf,

        #[arg(short, long)]
        /// Write ASCII instead of binary little endian
        ascii: bool,
    },

    /// Rewrite any .ply with a different encoding
    Reencode {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[arg(short, long)]
        /// Write ASCII instead of binary little endian
        ascii: bool,
    },

    /// Encode and decode every scene with every parameter combination
    Sweep {
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Run the gzip/bzip2 baselines listed in the config
    Baseline {
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Merge per-combination tables into results/<NAME>.csv
    Merge {
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,

        #[arg(short, long)]
        /// Overrides `results_name` from the config
        name: Option<String>,
    },

    /// Build render directories for every decoded point cloud
    Materialize {
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Sweep, then materialize
    Run {
        #[arg(short, long, value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Compare a reconstructed point cloud against its original
    Diff {
        #[arg(value_name = "ORIGINAL")]
        original: PathBuf,

        #[arg(value_name = "RECONSTRUCTED")]
        reconstructed: PathBuf,

        #[arg(short, long)]
        /// The compressed artifact, to report its size
        encoded: Option<PathBuf>,

        #[arg(long, value_name = "CSV")]
        /// Write per-property statistics to a CSV file instead of stdout
        csv: Option<PathBuf>,
    },
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    better_panic::install();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            input,
            output,
            ascii,
        } => {
            let attributes = load_gaussian_ply(&input)?;
            info!("{} gaussians read from {}", attributes.len(), input.display());
            write_draco_ply(&attributes, &output, ascii)
        }
        Commands::Reencode {
            input,
            output,
            ascii,
        } => reencode_ply(&input, &output, ascii),
        Commands::Sweep { config } => sweep(&ExperimentConfig::load(&config)?).map(|_| ()),
        Commands::Baseline { config } => baseline(&ExperimentConfig::load(&config)?),
        Commands::Merge { config, name } => merge(&ExperimentConfig::load(&config)?, name),
        Commands::Materialize { config } => {
            materialize(&ExperimentConfig::load(&config)?)
        }
        Commands::Run { config } => {
            let config = ExperimentConfig::load(&config)?;
            sweep(&config)?;
            materialize(&config)
        }
        Commands::Diff {
            original,
            reconstructed,
            encoded,
            csv,
        } => diff(&original, &reconstructed, encoded.as_deref(), csv.as_deref()),
    }
}

fn sweep(config: &ExperimentConfig) -> Result<SweepSummary> {
    let layout = config.layout();
    let combinations = config.combinations()?;
    info!(
        "sweeping {} combinations over {:?}, {} repetition(s)",
        combinations.len(),
        config.scenes,
        config.repetitions
    );
    let reuse = if config.reuse_artifacts {
        ReusePolicy::ReuseArtifacts
    } else {
        ReusePolicy::Rerun
    };
    let driver = SweepDriver::new(
        &layout,
        CompressorTool::new(&config.encoder, &config.decoder),
        config.repetitions,
        reuse,
    );
    let summary = driver.run(&config.scenes, &combinations)?;
    info!("{:?}", summary);
    if summary.failed > 0 || summary.tool_failures > 0 {
        warn!(
            "{} combination(s) aborted, {} repetition(s) with tool failures",
            summary.failed, summary.tool_failures
        );
    }
    Ok(summary)
}

fn baseline(config: &ExperimentConfig) -> Result<()> {
    let layout = config.layout();
    let mut failed = 0;
    for scene in &config.scenes {
        for (family, levels) in [
            (Family::Gzip, &config.baselines.gzip),
            (Family::Bzip2, &config.baselines.bzip2),
        ] {
            if !levels.is_empty() {
                failed += run_baseline(&layout, family, scene, levels, config.repetitions)?;
            }
        }
    }
    if failed > 0 {
        warn!("{} baseline level(s) aborted", failed);
    }
    Ok(())
}

fn merge(config: &ExperimentConfig, name: Option<String>) -> Result<()> {
    let layout = config.layout();
    let aggregator = Aggregator::new(&layout, config.repetitions);
    let rows = aggregator.merge(&config.scenes, &config.combinations()?, &config.baselines)?;
    let name = name.unwrap_or_else(|| config.results_name.clone());
    match aggregator.write(&name, &rows)? {
        Some(path) => info!("{} rows written to {}", rows.len(), path.display()),
        None => warn!("no tables found, nothing merged"),
    }
    Ok(())
}

fn materialize(config: &ExperimentConfig) -> Result<()> {
    let layout = config.layout();
    let written = materialize_all(&layout, &config.scenes, &config.combinations()?);
    info!("{} render directories written", written);
    Ok(())
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

fn diff(
    original: &Path,
    reconstructed: &Path,
    encoded: Option<&Path>,
    csv: Option<&Path>,
) -> Result<()> {
    let result: CloudDiff = diff_clouds(
        &read_vertex_columns(original)?,
        &read_vertex_columns(reconstructed)?,
    )?;

    if let Some(csv) = csv {
        write_table(csv, &result.properties)?;
    } else {
        let width = result
            .properties
            .iter()
            .map(|p| p.property.len())
            .max()
            .unwrap_or(0);
        println!(
            "{:<width$} {:>14} {:>14} {:>9} {:>5} {:>5}",
            "property",
            "mean_abs",
            "max_abs",
            "differing",
            "nan",
            "inf",
            width = width
        );
        for p in &result.properties {
            println!(
                "{:<width$} {:>14.6e} {:>14.6e} {:>9} {:>5} {:>5}",
                p.property,
                p.mean_abs_error,
                p.max_abs_error,
                p.differing,
                p.reconstructed_nan as i64 - p.original_nan as i64,
                p.reconstructed_inf as i64 - p.original_inf as i64,
                width = width
            );
        }
    }

    if !result.unmatched.is_empty() {
        println!("Unmatched properties: {}", result.unmatched.join(", "));
    }
    println!("Vertices: {}", result.vertex_count);
    println!("Original size: {} bytes", file_size(original)?);
    if let Some(encoded) = encoded {
        println!("Encoded size: {} bytes", file_size(encoded)?);
    }
    println!("Reconstructed size: {} bytes", file_size(reconstructed)?);
    Ok(())
}
