use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::combination::ParameterCombination;

/// How an external tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Succeeded,
    /// Non-zero exit, or killed by a signal (`None`).
    Failed(Option<i32>),
}

impl ToolOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, ToolOutcome::Succeeded)
    }
}

/// Runs `command` to completion with stdout redirected into `log`.
/// Stderr stays attached to the terminal.
pub(crate) fn run_logged(mut command: Command, log: &Path) -> Result<ToolOutcome> {
    let log_file =
        File::create(log).with_context(|| format!("creating log {}", log.display()))?;
    command.stdout(Stdio::from(log_file));
    debug!("running {:?}", command);
    let status = command
        .status()
        .with_context(|| format!("launching {}", command.get_program().to_string_lossy()))?;
    if status.success() {
        Ok(ToolOutcome::Succeeded)
    } else {
        Ok(ToolOutcome::Failed(status.code()))
    }
}

/// The external point-cloud encoder/decoder pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressorTool {
    encoder: PathBuf,
    decoder: PathBuf,
}

impl CompressorTool {
    pub fn new(encoder: impl Into<PathBuf>, decoder: impl Into<PathBuf>) -> Self {
        Self {
            encoder: encoder.into(),
            decoder: decoder.into(),
        }
    }

    pub fn encode(
        &self,
        input: &Path,
        output: &Path,
        combination: &ParameterCombination,
        log: &Path,
    ) -> Result<ToolOutcome> {
        let mut command = Command::new(&self.encoder);
        command
            .arg("-point_cloud")
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .args(combination.encoder_args());
        run_logged(command, log)
    }

    pub fn decode(&self, input: &Path, output: &Path, log: &Path) -> Result<ToolOutcome> {
        let mut command = Command::new(&self.decoder);
        command.arg("-i").arg(input).arg("-o").arg(output);
        run_logged(command, log)
    }
}
