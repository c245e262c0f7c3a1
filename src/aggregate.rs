use anyhow::{Context, Result};
use log::{debug, warn};
use ply_rs::parser;
use ply_rs::ply::DefaultElement;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::baseline::placeholder_token;
use crate::combination::{baseline_suffix, ParameterCombination};
use crate::config::BaselineLevels;
use crate::layout::{ExperimentLayout, Family};
use crate::table::{read_table, write_table, MergedRow, MetricRow, SceneInfo};

/// Vertex count from the PLY header alone; the payload is not read.
pub fn point_count(path: &Path) -> Result<usize> {
    let mut stream = BufReader::new(File::open(path)?);
    let header = parser::Parser::<DefaultElement>::new().read_header(&mut stream)?;
    header
        .elements
        .get("vertex")
        .map(|element| element.count)
        .ok_or_else(|| anyhow::anyhow!("no `vertex` element in {}", path.display()))
}

/// Merges per-combination tables from every family into one wide table.
pub struct Aggregator<'a> {
    layout: &'a ExperimentLayout,
    repetitions: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(layout: &'a ExperimentLayout, repetitions: usize) -> Self {
        Self {
            layout,
            repetitions,
        }
    }

    pub fn scene_info(&self, scene: &str) -> Result<SceneInfo> {
        let reference = self.layout.reference_cloud(scene);
        let original_size = fs::metadata(&reference)
            .with_context(|| format!("reading {}", reference.display()))?
            .len();
        Ok(SceneInfo {
            name: scene.to_string(),
            original_size,
            point_count: point_count(&reference)?,
        })
    }

    /// Rows of one table, truncated to the configured repetitions. A missing
    /// table yields nothing.
    fn load(&self, path: &Path) -> Result<Vec<MetricRow>> {
        if !path.is_file() {
            debug!("no table at {}", path.display());
            return Ok(Vec::new());
        }
        let mut rows: Vec<MetricRow> = read_table(path)?;
        rows.truncate(self.repetitions);
        Ok(rows)
    }

    /// Family by family, then scene by scene, then combination by combination.
    /// No sorting or deduplication.
    pub fn merge(
        &self,
        scenes: &[String],
        combinations: &[ParameterCombination],
        baselines: &BaselineLevels,
    ) -> Result<Vec<MergedRow>> {
        let mut infos = Vec::new();
        for scene in scenes {
            match self.scene_info(scene) {
                Ok(info) => infos.push(info),
                Err(err) => warn!("{}: skipping scene: {:#}", scene, err),
            }
        }

        let mut merged = Vec::new();
        for info in &infos {
            let dirs = self.layout.artifact_dirs(Family::Draco, &info.name);
            for combination in combinations {
                for row in self.load(&dirs.table(&combination.suffix()))? {
                    merged.push(MergedRow::new(row, Family::Draco.name(), info));
                }
            }
        }

        for (family, levels) in [(Family::Gzip, &baselines.gzip), (Family::Bzip2, &baselines.bzip2)] {
            let Some(token) = placeholder_token(family) else {
                continue;
            };
            for info in &infos {
                let dirs = self.layout.artifact_dirs(family, &info.name);
                for &level in levels {
                    for row in self.load(&dirs.table(&baseline_suffix(token, level)))? {
                        merged.push(MergedRow::new(row, family.name(), info));
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Writes `results/<name>.csv` unless there is nothing to write.
    pub fn write(&self, name: &str, rows: &[MergedRow]) -> Result<Option<PathBuf>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let path = self.layout.results_table(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_table(&path, rows)?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{MetricRow, ParamColumns, RowStatus};

    fn write_reference(layout: &ExperimentLayout, scene: &str, vertices: usize) -> u64 {
        let path = layout.reference_cloud(scene);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut text = format!(
            "ply\nformat ascii 1.0\nelement vertex {}\nproperty float x\nend_header\n",
            vertices
        );
        for i in 0..vertices {
            text.push_str(&format!("{}\n", i));
        }
        fs::write(&path, &text).unwrap();
        text.len() as u64
    }

    fn write_rows(layout: &ExperimentLayout, scene: &str, combination: &ParameterCombination, n: usize) {
        let dirs = layout.artifact_dirs(Family::Draco, scene);
        dirs.create().unwrap();
        let rows: Vec<MetricRow> = (0..n)
            .map(|i| {
                let mut row = MetricRow::new(i, combination.into(), combination.suffix());
                row.encode_time = Some(10 + i as u64);
                row
            })
            .collect();
        write_table(&dirs.table(&combination.suffix()), &rows).unwrap();
    }

    #[test]
    fn test_merge_present_subset() {
        let root = tempfile::tempdir().unwrap();
        let layout = ExperimentLayout::new(root.path().join("expData"), root.path().join("output"));
        let lego_size = write_reference(&layout, "lego", 4);
        let truck_size = write_reference(&layout, "truck", 7);

        let combinations = [
            ParameterCombination::tied(4, 1, 16, 16, 7),
            ParameterCombination::tied(9, 1, 16, 16, 7),
            ParameterCombination::tied(16, 1, 16, 16, 7),
        ];
        write_rows(&layout, "lego", &combinations[0], 3);
        write_rows(&layout, "lego", &combinations[2], 1);
        write_rows(&layout, "truck", &combinations[1], 1);

        let aggregator = Aggregator::new(&layout, 2);
        let scenes = vec!["lego".to_string(), "truck".to_string()];
        let rows = aggregator
            .merge(&scenes, &combinations, &BaselineLevels::default())
            .unwrap();

        let keys: Vec<(String, String, usize)> = rows
            .iter()
            .map(|row| (row.scene_name.clone(), row.suffix.clone(), row.i))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("lego".to_string(), combinations[0].suffix(), 0),
                ("lego".to_string(), combinations[0].suffix(), 1),
                ("lego".to_string(), combinations[2].suffix(), 0),
                ("truck".to_string(), combinations[1].suffix(), 0),
            ]
        );
        assert!(rows.iter().all(|row| row.alg == "draco"));
        assert_eq!(rows[0].num_of_3dgs, 4);
        assert_eq!(rows[0].original_size, lego_size);
        assert_eq!(rows[3].num_of_3dgs, 7);
        assert_eq!(rows[3].original_size, truck_size);

        let path = aggregator.write("position", &rows).unwrap().unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text
            .lines()
            .next()
            .unwrap()
            .ends_with("suffix,status,alg,scene_name,original_size,numOf3DGS"));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_merge_baselines_and_missing_scene() {
        let root = tempfile::tempdir().unwrap();
        let layout = ExperimentLayout::new(root.path().join("expData"), root.path().join("output"));
        write_reference(&layout, "lego", 2);

        let dirs = layout.artifact_dirs(Family::Bzip2, "lego");
        dirs.create().unwrap();
        let suffix = baseline_suffix("y", 3);
        let mut row = MetricRow::new(0, ParamColumns::placeholder("y", 3), suffix.clone());
        row.status = RowStatus::DecodeFailed;
        write_table(&dirs.table(&suffix), &[row]).unwrap();

        let aggregator = Aggregator::new(&layout, 1);
        let baselines = BaselineLevels {
            gzip: vec![1],
            bzip2: vec![3, 5],
        };
        let scenes = vec!["lego".to_string(), "ghost".to_string()];
        let rows = aggregator.merge(&scenes, &[], &baselines).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alg, "bzip2");
        assert_eq!(rows[0].status, RowStatus::DecodeFailed);
        assert_eq!(rows[0].num_of_3dgs, 2);

        assert_eq!(aggregator.write("empty", &[]).unwrap(), None);
    }
}
