use clap::Parser;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use tractmap::tools::DEFAULT_MIRTK_IMAGE;
use tractmap::{
    init_tracing, run, Container, ContainerRuntime, PipelineConfig, ProcessRunner, Verbosity,
    DEFAULT_CLUSTER_PATTERN,
};

/// Calculate tract coordinates in subject space.
///
/// Transforms a DTI atlas to subject space and reports the start and end coordinates of its fibers,
/// organised by tract, as JSON: {"tract": {"starts": [[x, y, z], ..], "ends": [[x, y, z], ..]}}.
/// Coordinates are voxel indices of ANAT_FILE, or millimeters if it is not given.
///
/// wm_register_to_atlas_new.py and TractConverter.py must be on the PATH, and singularity (or docker)
/// must be able to run the MIRTK image.
#[derive(Parser, Debug)]
#[command(name = "tractmap", version)]
struct Cli {
    /// Tractography atlas file (vtp, vtk or trk)
    atlas_file: PathBuf,

    /// Folder containing the atlas tract clusters
    cluster_dir: PathBuf,

    /// Atlas mrml (Slicer) file mapping clusters to tracts
    mrml_file: PathBuf,

    /// Subject tractography file
    subject_file: PathBuf,

    /// Subject nifti format DTI file
    anat_file: Option<PathBuf>,

    /// Path to the MIRTK container image
    #[arg(long, env = "TRACTMAP_MIRTK_FILE", default_value = DEFAULT_MIRTK_IMAGE)]
    mirtk_file: String,

    /// Container runtime used to run MIRTK
    #[arg(long, env = "TRACTMAP_CONTAINER_RUNTIME", value_enum, default_value_t = ContainerRuntime::Singularity)]
    container_runtime: ContainerRuntime,

    /// Regular expression limiting the files in CLUSTER_DIR
    #[arg(long, env = "TRACTMAP_CLUSTER_PATTERN", default_value = DEFAULT_CLUSTER_PATTERN)]
    cluster_pattern: String,

    /// Where to create and keep intermediate files [default: a temporary directory, removed afterwards]
    #[arg(long, env = "TRACTMAP_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Path to the output file [default: stdout]
    #[arg(long, short, env = "TRACTMAP_OUTPUT")]
    output: Option<PathBuf>,

    /// Delete WORK_DIR when done
    #[arg(long, env = "TRACTMAP_CLEANUP")]
    cleanup: bool,

    /// Extra logging information
    #[arg(long, env = "TRACTMAP_DEBUG")]
    debug: bool,

    /// Only log errors
    #[arg(long, env = "TRACTMAP_QUIET")]
    quiet: bool,
}

impl Cli {
    fn into_config(self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.atlas_file, self.cluster_dir, self.mrml_file, self.subject_file);
        config.anatomy_file = self.anat_file;
        config.cluster_pattern = self.cluster_pattern;
        config.container = Container {
            runtime: self.container_runtime,
            image: self.mirtk_file,
        };
        config.work_dir = self.work_dir;
        config.cleanup = self.cleanup;
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(Verbosity::from_flags(cli.debug, cli.quiet)) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    let output = cli.output.clone();
    let config = cli.into_config();

    let result = run(&config, &mut ProcessRunner).and_then(|endpoints| {
        let json = endpoints.to_json()?;
        match &output {
            Some(path) => {
                fs::write(path, json)?;
                tracing::info!("Wrote end points to {}", path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
