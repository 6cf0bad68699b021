//! Configuration of a pipeline run, and of logging.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::path::{Path, PathBuf};

use crate::atlas::{cluster_pattern, DEFAULT_CLUSTER_PATTERN};
use crate::error::{Result, TractmapError};
use crate::staging::StreamlineFormat;
use crate::tools::Container;
use crate::util::require_exists;

/// Everything one run of the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// The whole-brain tractography atlas (`.vtp`, `.vtk` or `.trk`).
    pub atlas_file: PathBuf,
    /// The directory holding one file per atlas fiber cluster.
    pub cluster_dir: PathBuf,
    /// The Slicer MRML scene assigning clusters to tracts.
    pub mrml_file: PathBuf,
    /// The subject's tractography, the registration target.
    pub subject_file: PathBuf,
    /// The subject's diffusion image. Needed for format conversion; end points are reported in its voxel
    /// grid when given, in millimeters otherwise.
    pub anatomy_file: Option<PathBuf>,
    pub cluster_pattern: String,
    pub container: Container,
    /// Where intermediate files go. A temporary directory is used if unset.
    pub work_dir: Option<PathBuf>,
    /// Remove the working directory when done.
    pub cleanup: bool,
}


impl PipelineConfig {

    pub fn new<P: Into<PathBuf>>(atlas_file: P, cluster_dir: P, mrml_file: P, subject_file: P) -> PipelineConfig {
        PipelineConfig {
            atlas_file: atlas_file.into(),
            cluster_dir: cluster_dir.into(),
            mrml_file: mrml_file.into(),
            subject_file: subject_file.into(),
            anatomy_file: None,
            cluster_pattern: String::from(DEFAULT_CLUSTER_PATTERN),
            container: Container::default(),
            work_dir: None,
            cleanup: false,
        }
    }


    /// Check that all inputs exist and the cluster pattern compiles, before any tool is run.
    pub fn validate(&self) -> Result<()> {
        require_exists(&self.atlas_file)?;
        StreamlineFormat::from_path(&self.atlas_file)?;
        if !self.cluster_dir.is_dir() {
            return Err(TractmapError::MissingInput(self.cluster_dir.clone()));
        }
        require_exists(&self.mrml_file)?;
        require_exists(&self.subject_file)?;
        if let Some(anatomy) = &self.anatomy_file {
            require_exists(anatomy)?;
        }
        cluster_pattern(&self.cluster_pattern)?;
        Ok(())
    }


    pub fn anatomy(&self) -> Option<&Path> {
        self.anatomy_file.as_deref()
    }
}


/// How much is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}


impl Verbosity {

    /// `debug` wins over `quiet`.
    pub fn from_flags(debug: bool, quiet: bool) -> Verbosity {
        if debug {
            Verbosity::Debug
        } else if quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    pub fn directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "tractmap=error",
            Verbosity::Normal => "tractmap=info",
            Verbosity::Debug => "tractmap=debug",
        }
    }
}


/// The log filter: `rust_log` (the value of `RUST_LOG`) if set, else the verbosity's directive.
pub fn log_filter(verbosity: Verbosity, rust_log: Option<&str>) -> std::result::Result<EnvFilter, ParseError> {
    match rust_log.map(str::trim) {
        Some(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(verbosity.directive()),
    }
}


/// Log to stderr, so stdout stays free for results.
pub fn init_tracing(verbosity: Verbosity) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(log_filter(verbosity, rust_log.as_deref())?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
