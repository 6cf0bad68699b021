//! Loading the tract atlas, before and after registration to the subject, and its fiber clusters.

use glob::{glob, Pattern};
use regex::Regex;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, TractmapError};
use crate::staging::{most_advanced_file, Converter};
use crate::streamline::Streamline;
use crate::tools::registered_file;
use crate::util::streamline_stem;

/// Selects the cluster files of an atlas cluster directory, so other files in the folder are not processed.
pub const DEFAULT_CLUSTER_PATTERN: &str = r"^.*cluster_\d{5}";

/// The atlas streamlines in atlas space and in subject space. Both hold the same fibers in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasStreamlines {
    pub raw: Vec<Streamline>,
    pub registered: Vec<Streamline>,
}


/// Compile a cluster pattern. Like the default, it must match at the start of the cluster name.
pub fn cluster_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})", pattern))?)
}


/// Read the atlas streamlines, registering the atlas to the subject first.
///
/// Work done in an earlier run with the same `work_dir` is reused: the most processed version of the
/// atlas in `work_dir` is preferred over the original file, and registration only runs if the registered
/// atlas does not exist yet.
pub fn process_atlas(
    converter: &mut Converter,
    atlas_file: &Path,
    subject_file: &Path,
    work_dir: &Path,
    anatomy: Option<&Path>,
) -> Result<AtlasStreamlines> {
    let atlas_name = streamline_stem(atlas_file);

    let atlas_raw = most_advanced_file(work_dir.join(&atlas_name))
        .or_else(|| most_advanced_file(atlas_file))
        .ok_or_else(|| TractmapError::MissingInput(atlas_file.to_path_buf()))?;
    tracing::debug!("Using atlas file {}", atlas_raw.display());
    let raw = converter.streamlines_from_file(&atlas_raw, anatomy, Some(work_dir))?;

    let mut atlas_reg = registered_file(work_dir, atlas_file);
    if atlas_reg.is_file() {
        tracing::info!("Atlas already registered: {}", atlas_reg.display());
    } else {
        atlas_reg = converter.register(atlas_file, subject_file, work_dir)?;
    }

    // the registered atlas may already have been converted to trk
    let atlas_reg = most_advanced_file(&atlas_reg).unwrap_or(atlas_reg);
    let reg_dir = atlas_reg.parent().map(Path::to_path_buf).unwrap_or_else(|| work_dir.to_path_buf());
    let registered = converter.streamlines_from_file(&atlas_reg, anatomy, Some(&reg_dir))?;

    tracing::info!("Atlas has {} fibers, {} after registration", raw.len(), registered.len());
    Ok(AtlasStreamlines { raw, registered })
}


/// Find the clusters in `cluster_dir` whose names match `pattern`, keyed by cluster name.
///
/// A cluster is any file stem in the directory, ignoring `.gz`; several files with the same stem (e.g. `.vtp`
/// and `.trk.gz`) are one cluster.
pub fn find_clusters(cluster_dir: &Path, pattern: &Regex) -> Result<BTreeMap<String, PathBuf>> {
    let dir_pattern = Pattern::escape(&cluster_dir.to_string_lossy());
    let mut clusters = BTreeMap::new();
    for entry in glob(&format!("{}/*", dir_pattern))? {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            TractmapError::ReadFile(path, e.into())
        })?;
        let name = streamline_stem(&path);
        if pattern.is_match(&name) {
            clusters.entry(name).or_insert(path);
        }
    }
    tracing::info!("Found {} cluster files.", clusters.len());
    Ok(clusters)
}


/// Read the streamlines of every cluster in `cluster_dir` matching `pattern`.
///
/// Converted versions of a cluster in `out_dir` are preferred over the files in `cluster_dir`, and new
/// conversions are written to `out_dir`.
pub fn cluster_streamlines(
    converter: &mut Converter,
    cluster_dir: &Path,
    pattern: &Regex,
    out_dir: &Path,
    anatomy: Option<&Path>,
) -> Result<BTreeMap<String, Vec<Streamline>>> {
    let mut cluster_streams = BTreeMap::new();
    for (cluster_id, found) in find_clusters(cluster_dir, pattern)? {
        let target = most_advanced_file(out_dir.join(&cluster_id))
            .or_else(|| most_advanced_file(cluster_dir.join(&cluster_id)))
            .ok_or(TractmapError::UnsupportedStreamlineFormat(found))?;

        tracing::info!("Converting file: {}", target.display());
        let streams = converter.streamlines_from_file(&target, anatomy, Some(out_dir))?;
        cluster_streams.insert(cluster_id, streams);
    }
    Ok(cluster_streams)
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::tools::{Container, Invocation, ToolRunner};
    use crate::trk::{write_trk, Trk, TrkHeader};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn the_default_pattern_selects_numbered_clusters() {
        let pattern = cluster_pattern(DEFAULT_CLUSTER_PATTERN).unwrap();
        assert!(pattern.is_match("cluster_00001"));
        assert!(pattern.is_match("left_cluster_00421"));
        assert!(!pattern.is_match("cluster_1"));
        assert!(!pattern.is_match("clustered_whole_brain"));
    }

    #[test]
    fn custom_patterns_are_anchored_at_the_start() {
        let pattern = cluster_pattern(r"cluster_0000\d").unwrap();
        assert!(pattern.is_match("cluster_00003"));
        assert!(!pattern.is_match("x_cluster_00003"));
        assert!(cluster_pattern("(unclosed").is_err());
    }

    #[test]
    fn clusters_are_found_by_stem() {
        let dir = tempdir().unwrap();
        for name in ["cluster_00001.vtp", "cluster_00001.trk", "cluster_00002.vtp", "notes.txt"].iter() {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let pattern = cluster_pattern(DEFAULT_CLUSTER_PATTERN).unwrap();
        let clusters = find_clusters(dir.path(), &pattern).unwrap();
        assert_eq!(vec!["cluster_00001", "cluster_00002"], clusters.keys().collect::<Vec<_>>());
    }

    fn write_trk_gz(path: &Path, streams: Vec<Streamline>) {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
        Trk::from_streamlines(TrkHeader::default(), streams).to_writer(&mut encoder).unwrap();
        encoder.finish().unwrap();
    }

    struct RefusingRunner;

    impl ToolRunner for RefusingRunner {
        fn run(&mut self, invocation: &Invocation) -> Result<()> {
            Err(TractmapError::ToolFailed(invocation.command_line(), Some(1)))
        }
    }

    #[test]
    fn gzipped_clusters_are_found_and_read() {
        let dir = tempdir().unwrap();
        let out = tempdir().unwrap();
        let streams = vec![Streamline::new(vec![[1.0, 2.0, 3.0]])];
        write_trk_gz(&dir.path().join("cluster_00004.trk.gz"), streams.clone());

        let pattern = cluster_pattern(DEFAULT_CLUSTER_PATTERN).unwrap();
        let mut runner = RefusingRunner;
        let mut converter = Converter::new(&mut runner, Container::default());
        let clusters = cluster_streamlines(&mut converter, dir.path(), &pattern, out.path(), None).unwrap();
        assert_eq!(vec!["cluster_00004"], clusters.keys().collect::<Vec<_>>());
        assert_eq!(streams, clusters["cluster_00004"]);
    }

    #[test]
    fn a_gzipped_atlas_is_read_when_already_registered() {
        let dir = tempdir().unwrap();
        let work = tempdir().unwrap();
        let atlas_file = dir.path().join("atlas.trk.gz");
        let raw = vec![Streamline::new(vec![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]])];
        write_trk_gz(&atlas_file, raw.clone());

        let reg_vtk = registered_file(work.path(), &atlas_file);
        fs::create_dir_all(reg_vtk.parent().unwrap()).unwrap();
        fs::write(&reg_vtk, b"").unwrap();
        let registered = vec![Streamline::new(vec![[5.0, 5.0, 5.0], [6.0, 6.0, 6.0]])];
        write_trk(reg_vtk.with_extension("trk"), &Trk::from_streamlines(TrkHeader::default(), registered.clone()))
            .unwrap();

        let mut runner = RefusingRunner;
        let mut converter = Converter::new(&mut runner, Container::default());
        let atlas = process_atlas(&mut converter, &atlas_file, Path::new("subject.vtk"), work.path(), None).unwrap();
        assert_eq!(AtlasStreamlines { raw, registered }, atlas);
    }
}
