//! The anatomical reference image of a subject, and conversion of millimeter coordinates into its voxel grid.

use approx::abs_diff_eq;
use ndarray::{arr2, Array2};
use nifti::NiftiHeader;

use std::path::Path;

use crate::error::{Result, TractmapError};
use crate::matching::TractEndpoints;

/// Determinants below this are treated as zero when inverting an affine.
const SINGULAR_EPSILON: f64 = 1e-12;

/// A 4x4 homogeneous voxel-to-world transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Affine {
    pub matrix: Array2<f64>,
}


impl Affine {

    pub fn identity() -> Affine {
        Affine { matrix: Array2::eye(4) }
    }

    /// Build an affine from its top three rows. The bottom row is always `[0, 0, 0, 1]`.
    pub fn from_rows(rows: [[f64; 4]; 3]) -> Affine {
        Affine {
            matrix: arr2(&[rows[0], rows[1], rows[2], [0.0, 0.0, 0.0, 1.0]]),
        }
    }


    /// Invert the affine.
    ///
    /// Only the upper-left 3x3 block needs a general inverse, the translation follows from it.
    pub fn inverse(&self) -> Result<Affine> {
        let m = &self.matrix;
        let a = |r: usize, c: usize| m[[r, c]];

        let cof00 = a(1, 1) * a(2, 2) - a(1, 2) * a(2, 1);
        let cof01 = a(1, 2) * a(2, 0) - a(1, 0) * a(2, 2);
        let cof02 = a(1, 0) * a(2, 1) - a(1, 1) * a(2, 0);
        let det = a(0, 0) * cof00 + a(0, 1) * cof01 + a(0, 2) * cof02;

        if abs_diff_eq!(det, 0.0, epsilon = SINGULAR_EPSILON) {
            return Err(TractmapError::SingularAffine);
        }

        let inv = [
            [
                cof00 / det,
                (a(0, 2) * a(2, 1) - a(0, 1) * a(2, 2)) / det,
                (a(0, 1) * a(1, 2) - a(0, 2) * a(1, 1)) / det,
            ],
            [
                cof01 / det,
                (a(0, 0) * a(2, 2) - a(0, 2) * a(2, 0)) / det,
                (a(0, 2) * a(1, 0) - a(0, 0) * a(1, 2)) / det,
            ],
            [
                cof02 / det,
                (a(0, 1) * a(2, 0) - a(0, 0) * a(2, 1)) / det,
                (a(0, 0) * a(1, 1) - a(0, 1) * a(1, 0)) / det,
            ],
        ];

        let t = [a(0, 3), a(1, 3), a(2, 3)];
        let mut rows = [[0.0; 4]; 3];
        for r in 0..3 {
            rows[r][..3].copy_from_slice(&inv[r]);
            rows[r][3] = -(inv[r][0] * t[0] + inv[r][1] * t[1] + inv[r][2] * t[2]);
        }
        Ok(Affine::from_rows(rows))
    }


    /// Apply the affine to a point.
    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        let m = &self.matrix;
        let mut out = [0.0; 3];
        for r in 0..3 {
            out[r] = m[[r, 0]] * point[0] + m[[r, 1]] * point[1] + m[[r, 2]] * point[2] + m[[r, 3]];
        }
        out
    }
}


/// The subject's anatomical reference volume, reduced to what is needed to map coordinates: its grid and affine.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub dim: [usize; 3],
    pub voxel_size: [f64; 3],
    pub affine: Affine,
}


impl ReferenceImage {

    /// Read the header of a NIfTI-1 file (`.nii` or `.nii.gz`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ReferenceImage> {
        let path = path.as_ref();
        let header = NiftiHeader::from_file(path).map_err(|e| TractmapError::ReadNifti(path.to_path_buf(), e))?;
        Ok(ReferenceImage::from_header(&header))
    }


    pub fn from_header(header: &NiftiHeader) -> ReferenceImage {
        ReferenceImage {
            dim: [header.dim[1] as usize, header.dim[2] as usize, header.dim[3] as usize],
            voxel_size: [header.pixdim[1] as f64, header.pixdim[2] as f64, header.pixdim[3] as f64],
            affine: affine_from_header(header),
        }
    }
}


/// Pick the best voxel-to-world affine of a NIfTI header: the sform if set, else the qform if set, else
/// the base affine which centers the volume at the origin with a flipped x axis.
pub fn affine_from_header(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        Affine::from_rows([row(&header.srow_x), row(&header.srow_y), row(&header.srow_z)])
    } else if header.qform_code > 0 {
        qform_affine(header)
    } else {
        base_affine(header)
    }
}


fn qform_affine(header: &NiftiHeader) -> Affine {
    let b = header.quatern_b as f64;
    let c = header.quatern_c as f64;
    let d = header.quatern_d as f64;
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();

    let rotation = [
        [1.0 - 2.0 * (c * c + d * d), 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
        [2.0 * (b * c + a * d), 1.0 - 2.0 * (b * b + d * d), 2.0 * (c * d - a * b)],
        [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), 1.0 - 2.0 * (b * b + c * c)],
    ];

    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    let zooms = [header.pixdim[1] as f64, header.pixdim[2] as f64, header.pixdim[3] as f64 * qfac];
    let offset = [header.quatern_x as f64, header.quatern_y as f64, header.quatern_z as f64];

    let mut rows = [[0.0; 4]; 3];
    for r in 0..3 {
        for col in 0..3 {
            rows[r][col] = rotation[r][col] * zooms[col];
        }
        rows[r][3] = offset[r];
    }
    Affine::from_rows(rows)
}


fn base_affine(header: &NiftiHeader) -> Affine {
    let zooms = [-(header.pixdim[1] as f64), header.pixdim[2] as f64, header.pixdim[3] as f64];
    let mut rows = [[0.0; 4]; 3];
    for r in 0..3 {
        let origin = (header.dim[r + 1] as f64 - 1.0) / 2.0;
        rows[r][r] = zooms[r];
        rows[r][3] = -origin * zooms[r];
    }
    Affine::from_rows(rows)
}


/// Map all start and end points from millimeters into the voxel grid of the image with the given affine.
pub fn mm_to_voxels(endpoints: &TractEndpoints, affine: &Affine) -> Result<TractEndpoints> {
    let inverse = affine.inverse()?;
    let mut voxels = TractEndpoints::default();
    for (tract, ends) in endpoints.iter() {
        let converted = voxels.entry(tract.clone());
        converted.starts = ends.starts.iter().map(|p| inverse.apply(*p)).collect();
        converted.ends = ends.ends.iter().map(|p| inverse.apply(*p)).collect();
    }
    Ok(voxels)
}
