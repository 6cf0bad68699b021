//! Common test utilities for tractmap integration tests: a study layout on disk and stand-ins for the external tools.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tractmap::{
    write_trk, Invocation, PipelineConfig, Result, Streamline, ToolRunner, Trk, TrkHeader,
};

pub const ATLAS_NAME: &str = "clustered_whole_brain";

/// A fiber along x = `x`, from `[x, 0, 0]` to `[x, 5, 5]`.
pub fn fiber(x: f32) -> Streamline {
    Streamline::new(vec![[x, 0.0, 0.0], [x, 5.0, 0.0], [x, 5.0, 5.0]])
}

/// The atlas fibers in subject millimeters. The subject image maps millimeters `m` to voxels `(m + [10, 20, 30]) / 2`,
/// so these register to voxel coordinates equal to the atlas coordinates.
pub fn registered(s: &Streamline) -> Streamline {
    Streamline::new(
        s.points
            .iter()
            .map(|p| [p[0] * 2.0 - 10.0, p[1] * 2.0 - 20.0, p[2] * 2.0 - 30.0])
            .collect(),
    )
}

pub fn raw_atlas() -> Vec<Streamline> {
    vec![fiber(0.0), fiber(2.0), fiber(4.0), fiber(6.0)]
}

/// Stands in for whitematteranalysis, MIRTK and tractconverter: writes each tool's output file, and records the calls.
///
/// Converting to trk writes the streamlines registered for the output's file stem.
pub struct FakeRunner {
    pub streams_by_stem: HashMap<String, Vec<Streamline>>,
    pub invocations: Vec<Invocation>,
}

impl FakeRunner {
    pub fn for_study() -> FakeRunner {
        let mut streams_by_stem = HashMap::new();
        streams_by_stem.insert(String::from(ATLAS_NAME), raw_atlas());
        streams_by_stem.insert(format!("{}_reg", ATLAS_NAME), raw_atlas().iter().map(registered).collect());
        streams_by_stem.insert(String::from("cluster_00001"), vec![fiber(2.0), fiber(6.0)]);
        streams_by_stem.insert(String::from("cluster_00002"), vec![fiber(0.0)]);
        streams_by_stem.insert(String::from("cluster_00003"), vec![fiber(4.0)]);
        FakeRunner { streams_by_stem, invocations: Vec::new() }
    }

    pub fn programs(&self) -> Vec<&str> {
        self.invocations.iter().map(|i| i.program()).collect()
    }
}

impl ToolRunner for FakeRunner {
    fn run(&mut self, invocation: &Invocation) -> Result<()> {
        self.invocations.push(invocation.clone());
        let output = invocation.output();
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        match invocation {
            Invocation::TractConvert { .. } => {
                let stem = output.file_stem().unwrap().to_string_lossy().into_owned();
                let streams = self.streams_by_stem.get(&stem).cloned().unwrap_or_default();
                write_trk(&output, &Trk::from_streamlines(TrkHeader::default(), streams))?;
            }
            _ => fs::write(&output, b"# vtk DataFile Version 3.0\n")?,
        }
        Ok(())
    }
}

pub const MRML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MRML version="Slicer4.4.0">
  <ModelHierarchy id="vtkMRMLModelHierarchyNode1" name="ModelHierarchy" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode2" name="CST_left" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode3" name="AF_right" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode4" name="ModelHierarchy_4" parentNodeRef="vtkMRMLModelHierarchyNode2" associatedNodeRef="vtkMRMLFiberBundleNode1" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode5" name="ModelHierarchy_5" parentNodeRef="vtkMRMLModelHierarchyNode3" associatedNodeRef="vtkMRMLFiberBundleNode2" />
  <ModelHierarchy id="vtkMRMLModelHierarchyNode6" name="ModelHierarchy_6" parentNodeRef="vtkMRMLModelHierarchyNode3" associatedNodeRef="vtkMRMLFiberBundleNode3" />
  <FiberBundle id="vtkMRMLFiberBundleNode1" name="cluster_00001" storageNodeRef="vtkMRMLFiberBundleStorageNode1" />
  <FiberBundle id="vtkMRMLFiberBundleNode2" name="cluster_00002" storageNodeRef="vtkMRMLFiberBundleStorageNode2" />
  <FiberBundle id="vtkMRMLFiberBundleNode3" name="cluster_00003" storageNodeRef="vtkMRMLFiberBundleStorageNode3" />
  <FiberBundleStorage id="vtkMRMLFiberBundleStorageNode1" fileName="clusters/cluster_00001.vtp" />
  <FiberBundleStorage id="vtkMRMLFiberBundleStorageNode2" fileName="clusters/cluster_00002.vtp" />
  <FiberBundleStorage id="vtkMRMLFiberBundleStorageNode3" fileName="clusters/cluster_00003.vtp" />
</MRML>"#;

/// A study on disk: the atlas with three clusters and its MRML scene, a subject tractography and DTI image.
pub struct Study {
    pub root: TempDir,
}

impl Study {
    pub fn new() -> Study {
        let root = tempfile::tempdir().unwrap();
        let atlas_dir = root.path().join("atlas");
        fs::create_dir_all(atlas_dir.join("clusters")).unwrap();
        fs::write(atlas_dir.join(format!("{}.vtp", ATLAS_NAME)), b"<VTKFile/>").unwrap();
        for name in ["cluster_00001.vtp", "cluster_00002.vtp", "cluster_00003.vtp", "README.txt"].iter() {
            fs::write(atlas_dir.join("clusters").join(name), b"<VTKFile/>").unwrap();
        }
        fs::write(atlas_dir.join("atlas.mrml"), MRML).unwrap();

        let subject_dir = root.path().join("subject");
        fs::create_dir_all(&subject_dir).unwrap();
        fs::write(subject_dir.join("tracts.vtk"), b"# vtk DataFile Version 3.0\n").unwrap();
        write_nifti_header(
            &subject_dir.join("dti.nii"),
            [[2.0, 0.0, 0.0, -10.0], [0.0, 2.0, 0.0, -20.0], [0.0, 0.0, 2.0, -30.0]],
        );
        Study { root }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path().join("work")
    }

    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(
            self.path().join("atlas").join(format!("{}.vtp", ATLAS_NAME)),
            self.path().join("atlas").join("clusters"),
            self.path().join("atlas").join("atlas.mrml"),
            self.path().join("subject").join("tracts.vtk"),
        );
        config.anatomy_file = Some(self.path().join("subject").join("dti.nii"));
        config.work_dir = Some(self.work_dir());
        config
    }
}

/// Write a single-file NIfTI-1 header for a 10x10x10 uint8 volume with the given sform rows, without voxel data.
pub fn write_nifti_header(path: &Path, sform: [[f32; 4]; 3]) {
    let mut hdr = vec![0u8; 352];
    let mut put = |offset: usize, bytes: &[u8]| hdr[offset..offset + bytes.len()].copy_from_slice(bytes);

    put(0, &348i32.to_le_bytes());
    for (i, d) in [3i16, 10, 10, 10, 1, 1, 1, 1].iter().enumerate() {
        put(40 + 2 * i, &d.to_le_bytes());
    }
    put(70, &2i16.to_le_bytes()); // datatype: uint8
    put(72, &8i16.to_le_bytes()); // bitpix
    for (i, p) in [1.0f32, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0].iter().enumerate() {
        put(76 + 4 * i, &p.to_le_bytes());
    }
    put(108, &352.0f32.to_le_bytes()); // vox_offset
    put(112, &1.0f32.to_le_bytes()); // scl_slope
    put(254, &1i16.to_le_bytes()); // sform_code
    for (row, values) in sform.iter().enumerate() {
        for (col, v) in values.iter().enumerate() {
            put(280 + 16 * row + 4 * col, &v.to_le_bytes());
        }
    }
    put(344, b"n+1\0");
    fs::write(path, hdr).unwrap();
}
