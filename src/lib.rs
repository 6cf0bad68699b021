//! Map a clustered DTI tract atlas to subject space and extract fiber end coordinates by tract.
//!
//! The atlas is registered to the subject's tractography with whitematteranalysis, converted to TrackVis
//! format with MIRTK and tractconverter, and its fibers are assigned to tracts through the atlas clusters
//! and a Slicer MRML scene. The result holds the start and end points of the registered fibers, grouped by
//! tract, in the voxel grid of the subject's diffusion image.

pub mod anatomy;
pub mod atlas;
pub mod config;
pub mod error;
pub mod matching;
pub mod mrml;
pub mod pipeline;
pub mod staging;
pub mod streamline;
pub mod tools;
pub mod trk;
pub mod util;

pub use anatomy::{mm_to_voxels, Affine, ReferenceImage};
pub use atlas::{cluster_streamlines, process_atlas, AtlasStreamlines, DEFAULT_CLUSTER_PATTERN};
pub use config::{init_tracing, log_filter, PipelineConfig, Verbosity};
pub use error::{Result, TractmapError};
pub use matching::{map_clusters_to_tracts, match_fibers_to_clusters, stream_ends, TractEndpoints, TractEnds};
pub use mrml::{read_mrml, ClusterRef, TractMap};
pub use pipeline::{run, run_in};
pub use staging::{most_advanced_file, Converter, StreamlineFormat};
pub use streamline::{Point3, Streamline};
pub use tools::{Container, ContainerRuntime, Invocation, ProcessRunner, ToolRunner};
pub use trk::{read_trk, write_trk, Trk, TrkHeader};
