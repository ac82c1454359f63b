//! Planar checkerboard targets.

use serde::{Deserialize, Serialize};

use crate::{Iso3, Pt3, Real};

/// A planar grid of known 3D corner coordinates in its own frame (Z = 0).
///
/// Corners are ordered row-major (Y major), matching the detector convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkerboard {
    /// Human-readable identifier.
    pub name: String,
    /// Inner corners along X.
    pub cols: usize,
    /// Inner corners along Y.
    pub rows: usize,
    /// Square edge length in meters.
    pub cell_size: Real,
}

impl Checkerboard {
    pub fn new(name: impl Into<String>, cols: usize, rows: usize, cell_size: Real) -> Self {
        Self {
            name: name.into(),
            cols,
            rows,
            cell_size,
        }
    }

    /// Number of inner corners.
    pub fn num_corners(&self) -> usize {
        self.cols * self.rows
    }

    /// Corner positions in the target frame.
    pub fn corners(&self) -> Vec<Pt3> {
        let mut out = Vec::with_capacity(self.num_corners());
        for j in 0..self.rows {
            for i in 0..self.cols {
                out.push(Pt3::new(
                    i as Real * self.cell_size,
                    j as Real * self.cell_size,
                    0.0,
                ));
            }
        }
        out
    }

    /// Corner positions mapped through a target pose.
    pub fn corners_in(&self, pose: &Iso3) -> Vec<Pt3> {
        self.corners().iter().map(|p| pose * p).collect()
    }

    /// Geometric center of the corner grid under a target pose.
    pub fn center_in(&self, pose: &Iso3) -> Pt3 {
        pose * Pt3::new(
            (self.cols - 1) as Real * self.cell_size * 0.5,
            (self.rows - 1) as Real * self.cell_size * 0.5,
            0.0,
        )
    }
}

/// Validity predicate applied to candidate targets before a stage uses them.
pub trait TargetConstraint: Send + Sync {
    /// True when a target at `pose` (in the reference frame) is usable.
    fn is_valid(&self, target: &Checkerboard, pose: &Iso3) -> bool;
}

/// Accepts targets whose center lies within a fixed radius of a point.
#[derive(Debug, Clone, Copy)]
pub struct CheckerboardDistanceConstraint {
    pub max_distance: Real,
    pub from: Pt3,
}

impl CheckerboardDistanceConstraint {
    /// Constraint measured from the reference (depth sensor) origin.
    pub fn new(max_distance: Real) -> Self {
        Self {
            max_distance,
            from: Pt3::origin(),
        }
    }
}

impl TargetConstraint for CheckerboardDistanceConstraint {
    fn is_valid(&self, target: &Checkerboard, pose: &Iso3) -> bool {
        (target.center_in(pose) - self.from).norm() <= self.max_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec3;

    #[test]
    fn corner_count_and_order() {
        let cb = Checkerboard::new("cb", 3, 2, 0.1);
        let corners = cb.corners();
        assert_eq!(corners.len(), 6);
        assert_eq!(corners[0], Pt3::new(0.0, 0.0, 0.0));
        assert_eq!(corners[1], Pt3::new(0.1, 0.0, 0.0));
        assert_eq!(corners[3], Pt3::new(0.0, 0.1, 0.0));
    }

    #[test]
    fn distance_constraint_filters_far_targets() {
        let cb = Checkerboard::new("cb", 4, 3, 0.05);
        let near = Iso3::new(Vec3::new(0.0, 0.0, 1.0), Vec3::zeros());
        let far = Iso3::new(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros());
        let constraint = CheckerboardDistanceConstraint::new(2.0);
        assert!(constraint.is_valid(&cb, &near));
        assert!(!constraint.is_valid(&cb, &far));
    }
}
