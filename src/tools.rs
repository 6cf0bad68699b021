//! Invocations of the external tools the pipeline delegates to.
//!
//! * `wm_register_to_atlas_new.py` from whitematteranalysis registers one tractography to another.
//! * `convert-pointset` from MIRTK, run inside a container image, converts `.vtp` point sets to `.vtk`.
//! * `TractConverter.py` from tractconverter converts `.vtk` streamlines to TrackVis `.trk`.
//!
//! The tools are opaque: each is handed file paths and is expected to write a known output file.

use clap::ValueEnum;

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, TractmapError};
use crate::util::file_stem_string;

pub const REGISTER_PROGRAM: &str = "wm_register_to_atlas_new.py";
pub const TRACT_CONVERTER_PROGRAM: &str = "TractConverter.py";
pub const POINTSET_COMMAND: &str = "convert-pointset";
pub const DEFAULT_MIRTK_IMAGE: &str = "MIRTK.img";

/// The container runtime MIRTK is run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContainerRuntime {
    /// `singularity run` with a local image file.
    Singularity,
    /// `docker run` with an image name, e.g. `biomedia/mirtk`.
    Docker,
}

impl ContainerRuntime {
    pub fn program(&self) -> &'static str {
        match self {
            ContainerRuntime::Singularity => "singularity",
            ContainerRuntime::Docker => "docker",
        }
    }

    /// Mount points of the source and destination directories inside the container.
    fn mount_points(&self) -> (&'static str, &'static str) {
        match self {
            ContainerRuntime::Singularity => ("/input", "/output"),
            ContainerRuntime::Docker => ("/srcDir", "/dstDir"),
        }
    }
}

/// The MIRTK container: a runtime and the image (a file for singularity, a name for docker).
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub runtime: ContainerRuntime,
    pub image: String,
}

impl Default for Container {
    fn default() -> Container {
        Container {
            runtime: ContainerRuntime::Singularity,
            image: String::from(DEFAULT_MIRTK_IMAGE),
        }
    }
}


/// A single call of an external tool.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Register the `source` tractography to the `target`, writing into `out_dir`.
    Register {
        source: PathBuf,
        target: PathBuf,
        out_dir: PathBuf,
    },
    /// Convert the `.vtp` file at `input` to a `.vtk` file of the same name in `output_dir`. Both paths are absolute.
    ConvertPointset {
        input: PathBuf,
        output_dir: PathBuf,
        container: Container,
    },
    /// Convert the `.vtk` file at `input` to the `.trk` file `output` in the space of `anatomy`.
    TractConvert {
        input: PathBuf,
        output: PathBuf,
        anatomy: PathBuf,
    },
}


impl Invocation {

    pub fn register<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(source: P, target: Q, out_dir: R) -> Invocation {
        Invocation::Register {
            source: source.as_ref().to_path_buf(),
            target: target.as_ref().to_path_buf(),
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    /// The container sees the directories through bind mounts, so both are made absolute here.
    pub fn convert_pointset<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output_dir: Q, container: &Container) -> Result<Invocation> {
        Ok(Invocation::ConvertPointset {
            input: fs::canonicalize(input.as_ref())?,
            output_dir: fs::canonicalize(output_dir.as_ref())?,
            container: container.clone(),
        })
    }

    pub fn tract_convert<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(input: P, output: Q, anatomy: R) -> Invocation {
        Invocation::TractConvert {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            anatomy: anatomy.as_ref().to_path_buf(),
        }
    }


    /// The executable to run.
    pub fn program(&self) -> &str {
        match self {
            Invocation::Register { .. } => REGISTER_PROGRAM,
            Invocation::ConvertPointset { container, .. } => container.runtime.program(),
            Invocation::TractConvert { .. } => TRACT_CONVERTER_PROGRAM,
        }
    }


    /// The arguments passed to [`Invocation::program`].
    pub fn args(&self) -> Vec<OsString> {
        match self {
            Invocation::Register { source, target, out_dir } => {
                vec![source.into(), target.into(), out_dir.into()]
            }
            Invocation::ConvertPointset { input, output_dir, container } => {
                let src_dir = input.parent().unwrap_or_else(|| Path::new("/"));
                let file_name = input.file_name().map(PathBuf::from).unwrap_or_default();
                let (src_mount, dst_mount) = container.runtime.mount_points();
                let in_container = Path::new(src_mount).join(&file_name);
                let out_container = Path::new(dst_mount).join(vtk_name(input));

                let mut args: Vec<OsString> = match container.runtime {
                    ContainerRuntime::Singularity => vec![
                        "run".into(),
                        "-B".into(), bind(src_dir, src_mount),
                        "-B".into(), bind(output_dir, dst_mount),
                    ],
                    ContainerRuntime::Docker => vec![
                        "run".into(), "--rm".into(),
                        "-v".into(), bind(src_dir, src_mount),
                        "-v".into(), bind(output_dir, dst_mount),
                    ],
                };
                args.push(container.image.clone().into());
                args.push(POINTSET_COMMAND.into());
                args.push(in_container.into());
                args.push(out_container.into());
                args
            }
            Invocation::TractConvert { input, output, anatomy } => vec![
                "-i".into(), input.into(),
                "-o".into(), output.into(),
                "-a".into(), anatomy.into(),
                "-f".into(),
            ],
        }
    }


    /// The file the tool is expected to write.
    pub fn output(&self) -> PathBuf {
        match self {
            Invocation::Register { source, out_dir, .. } => registered_file(out_dir, source),
            Invocation::ConvertPointset { input, output_dir, .. } => output_dir.join(vtk_name(input)),
            Invocation::TractConvert { output, .. } => output.clone(),
        }
    }


    /// The full command line, for logging and error messages.
    pub fn command_line(&self) -> String {
        let mut line = String::from(self.program());
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}


impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}


/// Where `wm_register_to_atlas_new.py` writes the registered version of `source`:
/// `<out_dir>/<name>/output_tractography/<name>_reg.vtk`.
pub fn registered_file<P: AsRef<Path>, Q: AsRef<Path>>(out_dir: P, source: Q) -> PathBuf {
    let name = file_stem_string(source);
    out_dir
        .as_ref()
        .join(&name)
        .join("output_tractography")
        .join(format!("{}_reg.vtk", name))
}


fn vtk_name(input: &Path) -> String {
    format!("{}.vtk", file_stem_string(input))
}


fn bind(host: &Path, container: &str) -> OsString {
    let mut mount = OsString::from(host.as_os_str());
    mount.push(":");
    mount.push(container);
    mount
}


/// Runs external tool invocations.
pub trait ToolRunner {
    /// Run the invocation to completion.
    fn run(&mut self, invocation: &Invocation) -> Result<()>;
}


/// Runs tools as blocking subprocesses, inheriting stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<()> {
        run_command(invocation.program(), invocation.args(), invocation.command_line())
    }
}


fn run_command(program: &str, args: Vec<OsString>, command_line: String) -> Result<()> {
    tracing::debug!("Running: {}", command_line);

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => TractmapError::ToolNotFound(command_line.clone()),
            _ => TractmapError::Io(e),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(TractmapError::ToolFailed(command_line, status.code()))
    }
}


/// Run the invocation and check that it wrote its output file, which is returned.
pub fn run_tool<R: ToolRunner + ?Sized>(runner: &mut R, invocation: &Invocation) -> Result<PathBuf> {
    runner.run(invocation)?;
    let output = invocation.output();
    if output.exists() {
        Ok(output)
    } else {
        Err(TractmapError::ToolOutputMissing(invocation.command_line(), output))
    }
}
