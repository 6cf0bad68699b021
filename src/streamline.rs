//! Streamlines: ordered 3D point sequences reconstructed by tractography.

use std::fmt;

/// A point in 3D space, in the coordinate system of the file it was read from.
pub type Point3 = [f32; 3];

/// A single fiber trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Streamline {
    pub points: Vec<Point3>,
}

impl Streamline {
    pub fn new(points: Vec<Point3>) -> Streamline {
        Streamline { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The first point of the streamline, if any.
    pub fn start(&self) -> Option<Point3> {
        self.points.first().copied()
    }

    /// The last point of the streamline, if any. Equals the start for single-point streamlines.
    pub fn end(&self) -> Option<Point3> {
        self.points.last().copied()
    }

    /// An exact, hashable key of the streamline's coordinates.
    ///
    /// Two streamlines have equal keys iff all their coordinates compare equal, so `0.0` and `-0.0` are folded together.
    pub fn exact_key(&self) -> Vec<[u32; 3]> {
        self.points
            .iter()
            .map(|p| [canonical_bits(p[0]), canonical_bits(p[1]), canonical_bits(p[2])])
            .collect()
    }
}

fn canonical_bits(v: f32) -> u32 {
    if v == 0.0 {
        0.0f32.to_bits()
    } else {
        v.to_bits()
    }
}

impl From<Vec<Point3>> for Streamline {
    fn from(points: Vec<Point3>) -> Streamline {
        Streamline::new(points)
    }
}

impl fmt::Display for Streamline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Streamline with {} points.", self.points.len())
    }
}
