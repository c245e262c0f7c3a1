use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::combination::{ParameterCombination, ParameterGrid};
use crate::layout::{resolve, ExperimentLayout};
use crate::npy::load_npy;

/// Where the sweep's parameter combinations come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    Grid(ParameterGrid),
    /// A `.npy` array with rows `[qp, qn, qfd, qfr, qo, qs, qr, cl, qt, qg]`.
    File(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaselineLevels {
    #[serde(default)]
    pub gzip: Vec<u32>,
    #[serde(default)]
    pub bzip2: Vec<u32>,
}

fn default_data_root() -> PathBuf {
    PathBuf::from("expData")
}

fn default_render_root() -> PathBuf {
    PathBuf::from("gaussian-splatting/output")
}

fn default_repetitions() -> usize {
    1
}

fn default_results_name() -> String {
    "results".to_string()
}

/// Experiment description read from a JSON file. Relative paths are taken
/// relative to the file's own directory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    pub encoder: PathBuf,
    pub decoder: PathBuf,
    #[serde(default = "default_render_root")]
    pub render_root: PathBuf,
    pub scenes: Vec<String>,
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    /// Skip encode/decode when the artifact already exists.
    #[serde(default)]
    pub reuse_artifacts: bool,
    pub parameters: ParameterSource,
    #[serde(default)]
    pub baselines: BaselineLevels,
    #[serde(default = "default_results_name")]
    pub results_name: String,
}

impl ExperimentConfig {
    pub fn from_json(text: &str, base: &Path) -> Result<Self> {
        let mut config: ExperimentConfig = serde_json::from_str(text)?;
        config.data_root = resolve(base, &config.data_root);
        config.render_root = resolve(base, &config.render_root);
        config.encoder = resolve(base, &config.encoder);
        config.decoder = resolve(base, &config.decoder);
        if let ParameterSource::File(path) = &config.parameters {
            config.parameters = ParameterSource::File(resolve(base, path));
        }
        if config.repetitions == 0 {
            return Err(anyhow::anyhow!("`repetitions` must be at least 1"));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&text, base).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn layout(&self) -> ExperimentLayout {
        ExperimentLayout::new(&self.data_root, &self.render_root)
    }

    pub fn combinations(&self) -> Result<Vec<ParameterCombination>> {
        match &self.parameters {
            ParameterSource::Grid(grid) => Ok(grid.combinations()),
            ParameterSource::File(path) => {
                let array = load_npy(path)
                    .with_context(|| format!("loading parameters from {}", path.display()))?;
                debug!(
                    "{} parameter rows x {} columns from {}",
                    array.rows,
                    array.cols,
                    path.display()
                );
                array.iter_rows().map(ParameterCombination::from_row).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "encoder": "build_dir/draco_encoder",
        "decoder": "/opt/draco/draco_decoder",
        "scenes": ["lego"],
        "parameters": {
            "grid": { "qp": [16], "qn": [1], "features": [16], "transforms": [4, 9], "cl": [7] }
        },
        "baselines": { "gzip": [1, 9] }
    }"#;

    #[test]
    fn test_defaults_and_resolution() {
        let config = ExperimentConfig::from_json(CONFIG, Path::new("/work")).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/work/expData"));
        assert_eq!(config.encoder, PathBuf::from("/work/build_dir/draco_encoder"));
        assert_eq!(config.decoder, PathBuf::from("/opt/draco/draco_decoder"));
        assert_eq!(
            config.render_root,
            PathBuf::from("/work/gaussian-splatting/output")
        );
        assert_eq!(config.repetitions, 1);
        assert!(!config.reuse_artifacts);
        assert_eq!(config.baselines.gzip, vec![1, 9]);
        assert!(config.baselines.bzip2.is_empty());
        assert_eq!(config.results_name, "results");
        assert_eq!(config.combinations().unwrap().len(), 2);
    }

    #[test]
    fn test_file_source() {
        let json = r#"{
            "encoder": "e", "decoder": "d", "scenes": [],
            "parameters": { "file": "random_data/lego_19.npy" }
        }"#;
        let config = ExperimentConfig::from_json(json, Path::new("/work")).unwrap();
        assert_eq!(
            config.parameters,
            ParameterSource::File(PathBuf::from("/work/random_data/lego_19.npy"))
        );
        assert!(config.combinations().is_err());
    }

    #[test]
    fn test_rejects_bad_config() {
        let zero = CONFIG.replace("\"scenes\"", "\"repetitions\": 0, \"scenes\"");
        assert!(ExperimentConfig::from_json(&zero, Path::new("/work")).is_err());

        let typo = CONFIG.replace("\"scenes\"", "\"scene\"");
        assert!(ExperimentConfig::from_json(&typo, Path::new("/work")).is_err());
    }
}
