use quick_error::quick_error;
use std::io::Error as IOError;
use std::path::PathBuf;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    pub enum TractmapError {
        /// An input file or directory given by the user does not exist.
        MissingInput(path: PathBuf) {
            display("Input not found: {}", path.display())
        }

        /// Invalid trk file: wrong magic or header size.
        InvalidTrkFormat(reason: String) {
            display("Invalid TrackVis trk file: {}", reason)
        }

        UnsupportedStreamlineFormat(path: PathBuf) {
            display("Unrecognised streamline file: {}", path.display())
        }

        AnatomyRequired(path: PathBuf) {
            display("An anatomy file is required to convert {}", path.display())
        }

        /// The executable of an external tool could not be started.
        ToolNotFound(command: String) {
            display("Failed to find command: {}. Did you load the required modules?", command)
        }

        /// An external tool exited with a non-zero status.
        ToolFailed(command: String, code: Option<i32>) {
            display("{} failed with exit code: {}", command, code.map_or_else(|| String::from("none (killed by signal)"), |c| c.to_string()))
        }

        /// An external tool exited cleanly but did not write the expected file.
        ToolOutputMissing(command: String, path: PathBuf) {
            display("{} did not produce {}", command, path.display())
        }

        /// Structurally invalid MRML scene.
        Mrml(reason: String) {
            display("Invalid MRML file: {}", reason)
        }

        Xml(err: roxmltree::Error) {
            from()
            source(err)
            display("XML error: {}", err)
        }

        /// The NIfTI header of the anatomy image could not be read.
        ReadNifti(path: PathBuf, err: nifti::NiftiError) {
            source(err)
            display("Failed to read NIfTI header {}: {}", path.display(), err)
        }

        Pattern(err: regex::Error) {
            from()
            source(err)
            display("Invalid cluster pattern: {}", err)
        }

        Glob(err: glob::PatternError) {
            from()
            source(err)
            display("Invalid glob pattern: {}", err)
        }

        Json(err: serde_json::Error) {
            from()
            source(err)
            display("JSON error: {}", err)
        }

        /// A fiber of the raw atlas has no identical streamline in any cluster.
        UnmatchedStreamline(index: usize) {
            display("Atlas fiber {} does not match any cluster streamline", index)
        }

        UnknownCluster(name: String) {
            display("Cluster {} is not assigned to any tract", name)
        }

        CountMismatch(streamlines: usize, labels: usize) {
            display("All streamlines should be defined in the tract map ({} streamlines, {} labels)", streamlines, labels)
        }

        EmptyStreamline(index: usize) {
            display("Streamline {} has no points", index)
        }

        SingularAffine {
            display("The anatomy affine is singular and cannot be inverted")
        }

        /// An input file could not be read, or ended early.
        ReadFile(path: PathBuf, err: IOError) {
            source(err)
            display("Failed to read {}: {}", path.display(), err)
        }

        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, TractmapError>;
