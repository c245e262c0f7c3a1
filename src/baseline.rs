//! Generic byte-level compressors run over the raw point cloud, as a reference
//! point for the geometry compressor. gzip runs in-process; bzip2 goes
//! through the system `bzip2` utility.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, info, warn};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use crate::combination::baseline_suffix;
use crate::compressor::{run_logged, ToolOutcome};
use crate::layout::{ArtifactDirs, ExperimentLayout, Family};
use crate::table::{write_table, MetricRow, ParamColumns, RowStatus};

/// Token written into every quantization column of a baseline row.
pub fn placeholder_token(family: Family) -> Option<&'static str> {
    match family {
        Family::Draco => None,
        Family::Gzip => Some("x"),
        Family::Bzip2 => Some("y"),
    }
}

fn extension(family: Family) -> &'static str {
    match family {
        Family::Gzip => "gz",
        _ => "bz2",
    }
}

fn gzip_compress(input: &Path, output: &Path, level: u32) -> Result<ToolOutcome> {
    let mut reader = BufReader::new(File::open(input)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(output)?), Compression::new(level));
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(ToolOutcome::Succeeded)
}

fn gzip_decompress(input: &Path, output: &Path) -> Result<ToolOutcome> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(input)?));
    let mut writer = BufWriter::new(File::create(output)?);
    io::copy(&mut decoder, &mut writer)?;
    writer.flush()?;
    Ok(ToolOutcome::Succeeded)
}

fn bzip2_compress(input: &Path, output: &Path, level: u32) -> Result<ToolOutcome> {
    let mut command = Command::new("bzip2");
    command.arg("-c").arg(format!("-{}", level)).arg(input);
    run_logged(command, output)
}

fn bzip2_decompress(input: &Path, output: &Path) -> Result<ToolOutcome> {
    let mut command = Command::new("bzip2");
    command.arg("-d").arg("-c").arg(input);
    run_logged(command, output)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Compresses and decompresses the scene's reference cloud `repetitions`
/// times per level and writes one table per level. Levels outside 1-9 are an
/// error; an I/O or launch failure aborts only its level, is logged, and
/// counts toward the returned number of failed levels.
pub fn run_baseline(
    layout: &ExperimentLayout,
    family: Family,
    scene: &str,
    levels: &[u32],
    repetitions: usize,
) -> Result<usize> {
    let token = placeholder_token(family)
        .ok_or_else(|| anyhow::anyhow!("{} is not a generic baseline", family.name()))?;
    if let Some(level) = levels.iter().find(|level| !(1..=9).contains(*level)) {
        return Err(anyhow::anyhow!(
            "{} level {} outside 1-9",
            family.name(),
            level
        ));
    }

    let input = layout.reference_cloud(scene);
    if !input.is_file() {
        warn!("{}: no reference cloud at {}, skipping {}", scene, input.display(), family.name());
        return Ok(0);
    }
    let dirs = layout.artifact_dirs(family, scene);
    if let Err(err) = dirs.create() {
        error!("{} {}: {:#}", family.name(), scene, err);
        return Ok(levels.len());
    }
    let baseline = Baseline {
        family,
        token,
        input,
        encoded: dirs
            .encoded
            .join(format!("point_cloud.ply.{}", extension(family))),
        decoded: dirs.decoded.join("point_cloud.ply"),
        dirs,
    };

    let mut failed = 0;
    for &level in levels {
        let suffix = baseline_suffix(token, level);
        match baseline.run_level(level, &suffix, repetitions) {
            Ok(()) => info!("{} {} {} done", family.name(), scene, suffix),
            Err(err) => {
                error!("{} {} {} failed: {:#}", family.name(), scene, suffix, err);
                failed += 1;
            }
        }
    }
    Ok(failed)
}

/// Paths of one (scene, family) baseline.
struct Baseline {
    family: Family,
    token: &'static str,
    input: PathBuf,
    encoded: PathBuf,
    decoded: PathBuf,
    dirs: ArtifactDirs,
}

impl Baseline {
    fn compress(&self, level: u32) -> Result<ToolOutcome> {
        let outcome = match self.family {
            Family::Gzip => gzip_compress(&self.input, &self.encoded, level),
            _ => bzip2_compress(&self.input, &self.encoded, level),
        };
        outcome.with_context(|| format!("{} compressing {}", self.family.name(), self.input.display()))
    }

    fn decompress(&self) -> Result<ToolOutcome> {
        let outcome = match self.family {
            Family::Gzip => gzip_decompress(&self.encoded, &self.decoded),
            _ => bzip2_decompress(&self.encoded, &self.decoded),
        };
        outcome.with_context(|| {
            format!("{} decompressing {}", self.family.name(), self.encoded.display())
        })
    }

    fn run_level(&self, level: u32, suffix: &str, repetitions: usize) -> Result<()> {
        let mut rows = Vec::with_capacity(repetitions);
        for i in 0..repetitions {
            let mut row = MetricRow::new(
                i,
                ParamColumns::placeholder(self.token, level),
                suffix.to_string(),
            );

            let start = Instant::now();
            let compressed = self.compress(level)?;
            row.encode_time = Some(elapsed_ms(start));
            if !compressed.succeeded() {
                row.status = RowStatus::EncodeFailed;
                rows.push(row);
                continue;
            }
            row.encode_size = Some(fs::metadata(&self.encoded)?.len());

            let start = Instant::now();
            let decompressed = self.decompress()?;
            row.decode_time = Some(elapsed_ms(start));
            if !decompressed.succeeded() {
                row.status = RowStatus::DecodeFailed;
            }
            rows.push(row);
        }
        write_table(&self.dirs.table(suffix), &rows)
    }
}
