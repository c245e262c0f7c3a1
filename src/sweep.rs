use anyhow::{Context, Result};
use log::{error, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::combination::ParameterCombination;
use crate::compressor::{CompressorTool, ToolOutcome};
use crate::layout::{ArtifactDirs, ExperimentLayout, Family};
use crate::scraper::{scrape_decode_log, scrape_encode_log};
use crate::table::{write_table, MetricRow, RowStatus};

/// What to do when an artifact from an earlier run is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReusePolicy {
    /// Always run encode and decode, overwriting artifacts.
    Rerun,
    /// Skip a step whose output exists. Rows are marked `reused` and their
    /// metrics come from whatever log that step left behind.
    ReuseArtifacts,
}

impl ReusePolicy {
    fn skips(&self, artifact: &Path) -> bool {
        matches!(self, ReusePolicy::ReuseArtifacts) && artifact.is_file()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Combinations whose table was written.
    pub completed: usize,
    /// Combinations aborted by an I/O or launch error.
    pub failed: usize,
    /// Scenes skipped because their compressor input was missing.
    pub skipped_scenes: usize,
    /// Repetitions in which the encoder or decoder reported failure.
    pub tool_failures: usize,
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            Err(err).with_context(|| format!("removing {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// Paths of one (scene, combination) pair.
struct Job<'a> {
    scene: &'a str,
    combination: &'a ParameterCombination,
    suffix: String,
    input: PathBuf,
    encoded: PathBuf,
    decoded: PathBuf,
    dirs: &'a ArtifactDirs,
}

/// Runs the external compressor over every scene and combination, strictly
/// sequentially, and records one table per combination.
pub struct SweepDriver<'a> {
    layout: &'a ExperimentLayout,
    tool: CompressorTool,
    repetitions: usize,
    reuse: ReusePolicy,
}

impl<'a> SweepDriver<'a> {
    pub fn new(
        layout: &'a ExperimentLayout,
        tool: CompressorTool,
        repetitions: usize,
        reuse: ReusePolicy,
    ) -> Self {
        Self {
            layout,
            tool,
            repetitions,
            reuse,
        }
    }

    pub fn run(
        &self,
        scenes: &[String],
        combinations: &[ParameterCombination],
    ) -> Result<SweepSummary> {
        let mut summary = SweepSummary::default();
        for scene in scenes {
            let input = self.layout.compressor_input(scene);
            if !input.is_file() {
                warn!("{}: no compressor input at {}, skipping", scene, input.display());
                summary.skipped_scenes += 1;
                continue;
            }
            let dirs = self.layout.artifact_dirs(Family::Draco, scene);
            if let Err(err) = dirs.create() {
                error!("{}: {:#}", scene, err);
                summary.failed += combinations.len();
                continue;
            }

            for combination in combinations {
                let job = Job {
                    scene,
                    combination,
                    suffix: combination.suffix(),
                    input: input.clone(),
                    encoded: self.layout.encoded_artifact(scene, combination),
                    decoded: self.layout.decoded_artifact(scene, combination),
                    dirs: &dirs,
                };
                match self.run_combination(&job) {
                    Ok(rows) => {
                        summary.completed += 1;
                        summary.tool_failures += rows
                            .iter()
                            .filter(|row| {
                                matches!(
                                    row.status,
                                    RowStatus::EncodeFailed | RowStatus::DecodeFailed
                                )
                            })
                            .count();
                        info!("{} {} done", scene, job.suffix);
                    }
                    Err(err) => {
                        error!("{} {} failed: {:#}", scene, job.suffix, err);
                        summary.failed += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    fn run_combination(&self, job: &Job) -> Result<Vec<MetricRow>> {
        let table = job.dirs.table(&job.suffix);
        let mut rows = Vec::with_capacity(self.repetitions);
        for i in 0..self.repetitions {
            rows.push(self.run_repetition(job, i)?);
            write_table(&table, &rows)?;
        }
        Ok(rows)
    }

    fn run_repetition(&self, job: &Job, i: usize) -> Result<MetricRow> {
        let encode_log = job.dirs.logs.join(format!("encode_{}_{}.log", job.suffix, i));
        let decode_log = job.dirs.logs.join(format!("decode_{}_{}.log", job.suffix, i));
        let mut row = MetricRow::new(i, job.combination.into(), job.suffix.clone());

        let encoded = if self.reuse.skips(&job.encoded) {
            warn!("reusing {}; encode metrics may be stale", job.encoded.display());
            row.status = RowStatus::Reused;
            ToolOutcome::Succeeded
        } else {
            // A fresh encode invalidates both artifacts of an earlier run.
            remove_stale(&job.encoded)?;
            remove_stale(&job.decoded)?;
            self.tool
                .encode(&job.input, &job.encoded, job.combination, &encode_log)?
        };
        (row.encode_time, row.encode_size) = scrape_encode_log(&encode_log);

        if !encoded.succeeded() || !job.encoded.is_file() {
            warn!(
                "{} {}: encoder failed ({:?}), skipping decode",
                job.scene, job.suffix, encoded
            );
            row.status = RowStatus::EncodeFailed;
            return Ok(row);
        }

        let decoded = if self.reuse.skips(&job.decoded) {
            warn!("reusing {}; decode metrics may be stale", job.decoded.display());
            row.status = RowStatus::Reused;
            ToolOutcome::Succeeded
        } else {
            self.tool.decode(&job.encoded, &job.decoded, &decode_log)?
        };
        row.decode_time = scrape_decode_log(&decode_log);

        if !decoded.succeeded() {
            warn!(
                "{} {}: decoder failed ({:?})",
                job.scene, job.suffix, decoded
            );
            row.status = RowStatus::DecodeFailed;
        }
        Ok(row)
    }
}
