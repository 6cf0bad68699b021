//! The end-to-end run: atlas to subject space, fibers to tracts, tracts to end points.

use std::fs;
use std::path::Path;

use crate::anatomy::{mm_to_voxels, ReferenceImage};
use crate::atlas::{cluster_pattern, cluster_streamlines, process_atlas};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::matching::{map_clusters_to_tracts, match_fibers_to_clusters, stream_ends, TractEndpoints};
use crate::mrml::TractMap;
use crate::staging::Converter;
use crate::tools::ToolRunner;

/// Name of the subdirectory of the working directory holding converted clusters.
pub const CLUSTER_WORK_DIR: &str = "clusters";


/// Run the pipeline with the given tool runner, using the configured working directory or a temporary one.
///
/// A temporary working directory is always removed afterwards, whether the run succeeds or not.
pub fn run(config: &PipelineConfig, runner: &mut dyn ToolRunner) -> Result<TractEndpoints> {
    config.validate()?;
    match &config.work_dir {
        Some(work_dir) => run_in(config, work_dir, runner),
        None => {
            let tmp = tempfile::Builder::new().prefix("tractmap_").tempdir()?;
            tracing::debug!("Working in {}", tmp.path().display());
            let endpoints = run_in(config, tmp.path(), runner)?;
            tmp.close()?;
            Ok(endpoints)
        }
    }
}


/// Run the pipeline in `work_dir`, which is created if needed.
///
/// The stages run strictly in order, each one on the files the previous ones produced:
/// register the atlas and read its fibers before and after registration, read the atlas clusters,
/// find each fiber's cluster and thereby its tract, then collect the registered fibers' end points by tract.
pub fn run_in(config: &PipelineConfig, work_dir: &Path, runner: &mut dyn ToolRunner) -> Result<TractEndpoints> {
    let cluster_work_dir = work_dir.join(CLUSTER_WORK_DIR);
    fs::create_dir_all(&cluster_work_dir)?;

    let anatomy = config.anatomy();
    let pattern = cluster_pattern(&config.cluster_pattern)?;
    let mut converter = Converter::new(runner, config.container.clone());

    let atlas = process_atlas(&mut converter, &config.atlas_file, &config.subject_file, work_dir, anatomy)?;
    let clusters = cluster_streamlines(&mut converter, &config.cluster_dir, &pattern, &cluster_work_dir, anatomy)?;
    let tract_map = TractMap::from_file(&config.mrml_file)?;
    tracing::info!("{}", tract_map);

    let cluster_labels = match_fibers_to_clusters(&atlas.raw, &clusters)?;
    let tract_labels = map_clusters_to_tracts(&cluster_labels, &tract_map)?;
    let endpoints = stream_ends(&atlas.registered, &tract_labels)?;

    let endpoints = match anatomy {
        Some(anatomy) => {
            let image = ReferenceImage::from_file(anatomy)?;
            tracing::debug!("Reference image {} with dimensions {:?}", anatomy.display(), image.dim);
            mm_to_voxels(&endpoints, &image.affine)?
        }
        None => {
            tracing::warn!("No anatomy image given, end points are reported in millimeters");
            endpoints
        }
    };
    tracing::info!("{}", endpoints);

    if config.cleanup && config.work_dir.is_some() {
        tracing::debug!("Cleaning up: {}", work_dir.display());
        fs::remove_dir_all(work_dir)?;
    }

    Ok(endpoints)
}
