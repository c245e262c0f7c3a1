use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::combination::ParameterCombination;

/// A compressor whose results land in the tables: the geometry compressor
/// under test, or one of the generic byte-level baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Draco,
    Gzip,
    Bzip2,
}

impl Family {
    /// Value of the `alg` column and prefix of the family's directories.
    pub fn name(&self) -> &'static str {
        match self {
            Family::Draco => "draco",
            Family::Gzip => "gzip",
            Family::Bzip2 => "bzip2",
        }
    }

    fn encoded_dir(&self) -> &'static str {
        match self {
            Family::Draco => "draco_output_drc",
            Family::Gzip => "gzip_output_gzip",
            Family::Bzip2 => "bzip2_output_bzip2",
        }
    }
}

/// Per-scene output directories of one family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDirs {
    pub encoded: PathBuf,
    pub decoded: PathBuf,
    pub logs: PathBuf,
    pub tables: PathBuf,
}

impl ArtifactDirs {
    pub fn create(&self) -> Result<()> {
        for dir in [&self.encoded, &self.decoded, &self.logs, &self.tables] {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn table(&self, suffix: &str) -> PathBuf {
        self.tables.join(format!("log_{}.csv", suffix))
    }
}

/// Every base path the harness reads or writes, resolved once at startup.
///
/// ```text
/// <data_root>/draco_input/<scene>/point_cloud.ply    compressor input
/// <data_root>/raw_ply/<scene>/point_cloud.ply        reference cloud
/// <data_root>/<family>_.../<scene>/                  artifacts, logs, tables
/// <data_root>/results/<name>.csv                     merged table
/// <render_root>/<scene>/                             pretrained model
/// <render_root>/<scene>_<suffix>/                    materialized render dir
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentLayout {
    pub data_root: PathBuf,
    pub render_root: PathBuf,
}

impl ExperimentLayout {
    pub fn new(data_root: impl Into<PathBuf>, render_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            render_root: render_root.into(),
        }
    }

    pub fn compressor_input(&self, scene: &str) -> PathBuf {
        self.data_root
            .join("draco_input")
            .join(scene)
            .join("point_cloud.ply")
    }

    pub fn reference_cloud(&self, scene: &str) -> PathBuf {
        self.data_root
            .join("raw_ply")
            .join(scene)
            .join("point_cloud.ply")
    }

    pub fn artifact_dirs(&self, family: Family, scene: &str) -> ArtifactDirs {
        let prefix = family.name();
        ArtifactDirs {
            encoded: self.data_root.join(family.encoded_dir()).join(scene),
            decoded: self
                .data_root
                .join(format!("{}_output_ply", prefix))
                .join(scene),
            logs: self.data_root.join(format!("{}_log", prefix)).join(scene),
            tables: self.data_root.join(format!("{}_csv", prefix)).join(scene),
        }
    }

    pub fn encoded_artifact(&self, scene: &str, combination: &ParameterCombination) -> PathBuf {
        self.artifact_dirs(Family::Draco, scene)
            .encoded
            .join(format!("{}_{}.drc", scene, combination.suffix()))
    }

    pub fn decoded_artifact(&self, scene: &str, combination: &ParameterCombination) -> PathBuf {
        self.artifact_dirs(Family::Draco, scene)
            .decoded
            .join(format!("{}_{}.ply", scene, combination.suffix()))
    }

    pub fn results_table(&self, name: &str) -> PathBuf {
        self.data_root.join("results").join(format!("{}.csv", name))
    }

    pub fn pretrained_model(&self, scene: &str) -> PathBuf {
        self.render_root.join(scene)
    }

    pub fn render_dir(&self, scene: &str, combination: &ParameterCombination) -> PathBuf {
        self.render_root
            .join(format!("{}_{}", scene, combination.suffix()))
    }
}

/// Joins `path` onto `base` unless it is already absolute.
pub(crate) fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
