use anyhow::{Context, Result};
use log::{debug, error, info};
use std::fs;
use std::path::Path;

use crate::combination::ParameterCombination;
use crate::layout::ExperimentLayout;

const COMPANION_FILES: [&str; 2] = ["input.ply", "cameras.json"];
const DESCRIPTOR_FILE: &str = "cfg_args";

/// The renderer's argument namespace. The renderer parses this text back, so
/// spelling and field order are fixed.
pub fn render_descriptor(dir_name: &str, scene: &str) -> String {
    format!(
        "Namespace(data_device='cuda', eval=True, images='images', model_path='./output/{}', \
         resolution=-1, sh_degree=3, source_path='./data/{}', white_background=False)",
        dir_name, scene
    )
}

fn copy(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to)
        .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Builds `<render_root>/<scene>_<suffix>/` from the pretrained model and the
/// decoded point cloud. Returns `false`, touching nothing, when either input
/// is missing.
pub fn materialize(
    layout: &ExperimentLayout,
    scene: &str,
    combination: &ParameterCombination,
) -> Result<bool> {
    let decoded = layout.decoded_artifact(scene, combination);
    let pretrained = layout.pretrained_model(scene);
    if !decoded.is_file() || !pretrained.is_dir() {
        debug!(
            "not materializing {} {}: decoded present {}, model present {}",
            scene,
            combination.suffix(),
            decoded.is_file(),
            pretrained.is_dir()
        );
        return Ok(false);
    }

    let target = layout.render_dir(scene, combination);
    let checkpoint = target.join("point_cloud").join("iteration_30000");
    fs::create_dir_all(&checkpoint)
        .with_context(|| format!("creating {}", checkpoint.display()))?;

    for name in COMPANION_FILES {
        copy(&pretrained.join(name), &target.join(name))?;
    }
    copy(&decoded, &checkpoint.join("point_cloud.ply"))?;

    let dir_name = format!("{}_{}", scene, combination.suffix());
    fs::write(target.join(DESCRIPTOR_FILE), render_descriptor(&dir_name, scene))
        .with_context(|| format!("writing descriptor in {}", target.display()))?;
    Ok(true)
}

/// Materializes every pair, continuing past failures. Returns how many
/// directories were written.
pub fn materialize_all(
    layout: &ExperimentLayout,
    scenes: &[String],
    combinations: &[ParameterCombination],
) -> usize {
    let mut written = 0;
    for scene in scenes {
        for combination in combinations {
            match materialize(layout, scene, combination) {
                Ok(true) => {
                    info!("materialized {}_{}", scene, combination.suffix());
                    written += 1;
                }
                Ok(false) => {}
                Err(err) => error!("{} {}: {:#}", scene, combination.suffix(), err),
            }
        }
    }
    written
}
