//! Bringing streamline files into trk format, reusing conversions left over from earlier runs.
//!
//! Files move through `.vtp` → `.vtk` → `.trk`. The first conversion is done by MIRTK, the second by
//! TractConverter; only trk files are read in-process.

use tempfile::TempDir;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, TractmapError};
use crate::streamline::Streamline;
use crate::tools::{run_tool, Container, Invocation, ToolRunner};
use crate::trk::read_trk;
use crate::util::{file_stem_string, is_gz_file, streamline_stem};

/// The streamline file formats the pipeline handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamlineFormat {
    /// VTK XML poly data, as written by Slicer and whitematteranalysis.
    Vtp,
    /// Legacy VTK poly data.
    Vtk,
    /// TrackVis.
    Trk,
}

/// File name suffixes searched for a base name, from most to least processed.
const CANDIDATE_SUFFIXES: [&str; 4] = ["trk", "trk.gz", "vtk", "vtp"];


impl StreamlineFormat {

    /// Detect the format from the file extension. Gzipped trk files (`.trk.gz`) are trk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<StreamlineFormat> {
        let path = path.as_ref();
        let inner = if is_gz_file(path) { path.with_extension("") } else { path.to_path_buf() };
        let ext = inner.extension().map(|e| e.to_string_lossy().to_lowercase());
        match (ext.as_deref(), is_gz_file(path)) {
            (Some("vtp"), false) => Ok(StreamlineFormat::Vtp),
            (Some("vtk"), false) => Ok(StreamlineFormat::Vtk),
            (Some("trk"), _) => Ok(StreamlineFormat::Trk),
            _ => Err(TractmapError::UnsupportedStreamlineFormat(path.to_path_buf())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            StreamlineFormat::Vtp => "vtp",
            StreamlineFormat::Vtk => "vtk",
            StreamlineFormat::Trk => "trk",
        }
    }
}


impl fmt::Display for StreamlineFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}


/// Find the most processed version of a file: the first of `<base>.trk`, `<base>.trk.gz`, `<base>.vtk` and
/// `<base>.vtp` that exists. An extension on `base` (including `.trk.gz`) is replaced.
pub fn most_advanced_file<P: AsRef<Path>>(base: P) -> Option<PathBuf> {
    let base = base.as_ref();
    let stem = streamline_stem(base);
    let dir = base.parent().unwrap_or_else(|| Path::new(""));
    CANDIDATE_SUFFIXES
        .iter()
        .map(|suffix| dir.join(format!("{}.{}", stem, suffix)))
        .find(|candidate| candidate.is_file())
}


/// Runs the conversion tools and reads their results.
pub struct Converter<'r> {
    runner: &'r mut dyn ToolRunner,
    container: Container,
}


impl<'r> Converter<'r> {

    pub fn new(runner: &'r mut dyn ToolRunner, container: Container) -> Converter<'r> {
        Converter { runner, container }
    }


    /// Register the `source` tractography to `target`. Returns the registered `.vtk` file.
    pub fn register(&mut self, source: &Path, target: &Path, out_dir: &Path) -> Result<PathBuf> {
        tracing::info!("Registering {} to {}", source.display(), target.display());
        run_tool(&mut *self.runner, &Invocation::register(source, target, out_dir))
    }


    /// Convert a `.vtp` file to `.vtk` in `out_dir`. Returns the new file.
    pub fn vtp_to_vtk(&mut self, path: &Path, out_dir: &Path) -> Result<PathBuf> {
        tracing::info!("Converting file to vtk: {}", path.display());
        let invocation = Invocation::convert_pointset(path, out_dir, &self.container)?;
        run_tool(&mut *self.runner, &invocation)
    }


    /// Convert a `.vtk` file to `.trk` in `out_dir`, in the space of the `anatomy` image. Returns the new file.
    pub fn vtk_to_trk(&mut self, path: &Path, anatomy: &Path, out_dir: &Path) -> Result<PathBuf> {
        tracing::info!("Converting file to trk: {}", path.display());
        let output = out_dir.join(format!("{}.trk", file_stem_string(path)));
        run_tool(&mut *self.runner, &Invocation::tract_convert(path, output, anatomy))
    }


    /// Read the streamlines of a file in any supported format, converting it to trk first if needed.
    ///
    /// Conversions are written to `out_dir`, or to a temporary directory that is removed afterwards.
    /// Converting needs the `anatomy` image the tractography was computed on.
    pub fn streamlines_from_file(
        &mut self,
        path: &Path,
        anatomy: Option<&Path>,
        out_dir: Option<&Path>,
    ) -> Result<Vec<Streamline>> {
        let format = StreamlineFormat::from_path(path)?;

        let mut tmp_dir: Option<TempDir> = None;
        let trk_file = if format == StreamlineFormat::Trk {
            path.to_path_buf()
        } else {
            let anatomy = anatomy.ok_or_else(|| TractmapError::AnatomyRequired(path.to_path_buf()))?;
            let out_dir = match out_dir {
                Some(dir) => dir.to_path_buf(),
                None => tmp_dir.insert(tempfile::Builder::new().prefix("tractmap_").tempdir()?).path().to_path_buf(),
            };
            let vtk_file = if format == StreamlineFormat::Vtp {
                self.vtp_to_vtk(path, &out_dir)?
            } else {
                path.to_path_buf()
            };
            self.vtk_to_trk(&vtk_file, anatomy, &out_dir)?
        };

        tracing::info!("Extracting streamlines from file: {}", trk_file.display());
        let streamlines = read_trk(&trk_file)?.streamlines;

        if let Some(dir) = tmp_dir {
            tracing::debug!("Cleaning up: {}", dir.path().display());
            dir.close()?;
        }
        Ok(streamlines)
    }
}
