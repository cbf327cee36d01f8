//! # Pose estimation
//!
//! Two-view geometry: recovering relative camera pose and 3D structure from 2D correspondences.
//!
//! - [`fundamental`]: fundamental matrix (epipolar geometry in pixel space, 7 DOF)
//! - [`essential`]: essential matrix (epipolar geometry in normalized space, 5 DOF)
//! - [`decompose`]: essential matrix decomposition and chirality based pose selection
//! - [`triangulation`]: linear triangulation with depth and reprojection filtering

pub mod decompose;
pub use decompose::*;

pub mod essential;
pub use essential::*;

pub mod fundamental;
pub use fundamental::*;

pub mod triangulation;
pub use triangulation::*;

#[cfg(test)]
pub(crate) mod synthetic;

use crate::camera::CameraIntrinsic;
use crate::linalg::{mat3_from_rows, mat3_to_rows, IDENTITY3};
use glam::{DMat3, DVec3};

/// A 3x4 camera projection matrix.
pub type ProjectionMatrix = [[f64; 4]; 3];

/// Rigid transform mapping points from the reference camera frame into another camera frame.
///
/// `X_cam = rotation * X_ref + translation`
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pose {
    /// Rotation matrix, orthonormal with determinant +1.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Pose {
    /// The pose of the reference camera.
    pub fn identity() -> Self {
        Self {
            rotation: IDENTITY3,
            translation: [0.0; 3],
        }
    }

    /// Create a pose from a rotation and a translation.
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The rotation and translation as `glam` types.
    #[inline]
    pub fn to_rt(&self) -> (DMat3, DVec3) {
        (
            mat3_from_rows(&self.rotation),
            DVec3::from_array(self.translation),
        )
    }

    /// Transform a point from the reference frame into this camera frame.
    #[inline]
    pub fn transform(&self, point: &[f64; 3]) -> [f64; 3] {
        let (r, t) = self.to_rt();
        (r * DVec3::from_array(*point) + t).to_array()
    }

    /// The normalized camera matrix `[R | t]`.
    pub fn extrinsic_matrix(&self) -> ProjectionMatrix {
        let (r, t) = self.to_rt();
        stack_columns(&r, t)
    }

    /// The camera matrix `K * [R | t]`.
    pub fn projection_matrix(&self, camera: &CameraIntrinsic) -> ProjectionMatrix {
        let (r, t) = self.to_rt();
        let k = camera.matrix();
        stack_columns(&(k * r), k * t)
    }
}

/// Append a column to a 3x3 matrix, `[M | v]`.
pub(crate) fn stack_columns(m: &DMat3, v: DVec3) -> ProjectionMatrix {
    let rows = mat3_to_rows(m);
    let v = v.to_array();
    [0, 1, 2].map(|i| [rows[i][0], rows[i][1], rows[i][2], v[i]])
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_projection_matrix() {
        let k = CameraIntrinsic::new(500.0, 500.0, 320.0, 240.0);
        let pose = Pose::new(IDENTITY3, [1.0, 0.0, 0.0]);
        let p = pose.projection_matrix(&k);

        // project [0, 0, 2] -> camera frame [1, 0, 2] -> pixel (570, 240)
        let x = [0.0, 0.0, 2.0, 1.0];
        let proj = p
            .iter()
            .map(|row| row.iter().zip(x.iter()).map(|(a, b)| a * b).sum::<f64>())
            .collect::<Vec<_>>();
        assert_relative_eq!(proj[0] / proj[2], 570.0, epsilon = 1e-9);
        assert_relative_eq!(proj[1] / proj[2], 240.0, epsilon = 1e-9);

        let t = pose.transform(&[0.0, 0.0, 2.0]);
        assert_eq!(t, [1.0, 0.0, 2.0]);
        assert_eq!(Pose::default(), Pose::identity());
    }
}
