//! Essential matrix construction and projection onto the essential manifold.

use super::fundamental::{fundamental_8point, FundamentalError, FundamentalMatrix};
use crate::camera::CameraIntrinsic;
use crate::linalg::{mat3_from_rows, mat3_to_rows, svd3};
use glam::{DMat3, DVec3};

/// An essential matrix `E = [t]x R` relating normalized camera coordinates.
///
/// Its singular values are `(1, 1, 0)`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EssentialMatrix(pub [[f64; 3]; 3]);

impl EssentialMatrix {
    /// The matrix as a `glam` matrix.
    pub fn matrix(&self) -> DMat3 {
        mat3_from_rows(&self.0)
    }
}

/// Epipolar geometry of an image pair.
///
/// The essential matrix is only available when the camera intrinsics are known.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EpipolarGeometry {
    /// Fundamental matrix in pixel coordinates.
    pub fundamental: FundamentalMatrix,
    /// Essential matrix, for calibrated cameras.
    pub essential: Option<EssentialMatrix>,
}

/// Enforce the (1,1,0) singular value constraint on an essential matrix.
pub fn enforce_essential_constraints(e: &DMat3) -> EssentialMatrix {
    let svd = svd3(e);
    EssentialMatrix(mat3_to_rows(&svd.recompose(DVec3::new(1.0, 1.0, 0.0))))
}

/// Build an essential matrix from a fundamental matrix and the camera intrinsics.
///
/// Both images are assumed to come from the same camera, `E = K^T * F * K`, and the
/// result is projected onto the essential manifold.
pub fn essential_from_fundamental(f: &FundamentalMatrix, k: &CameraIntrinsic) -> EssentialMatrix {
    let k = k.matrix();
    enforce_essential_constraints(&(k.transpose() * f.matrix() * k))
}

/// Estimate the essential matrix directly from normalized camera coordinates.
///
/// Runs the normalized eight-point algorithm on `K^-1`-normalized points and
/// projects the result onto the essential manifold.
pub fn essential_8point(
    x1n: &[[f64; 2]],
    x2n: &[[f64; 2]],
) -> Result<EssentialMatrix, FundamentalError> {
    let f = fundamental_8point(x1n, x2n)?;
    Ok(enforce_essential_constraints(&f.matrix()))
}

/// Estimate the epipolar geometry of a pair of images.
///
/// The fundamental matrix is always estimated from the pixel correspondences. When
/// the intrinsics are known the essential matrix is derived from it as well.
pub fn estimate_geometry(
    x1: &[[f64; 2]],
    x2: &[[f64; 2]],
    camera: Option<&CameraIntrinsic>,
) -> Result<EpipolarGeometry, FundamentalError> {
    let fundamental = fundamental_8point(x1, x2)?;
    let essential = camera.map(|k| essential_from_fundamental(&fundamental, k));
    log::debug!(
        "estimated epipolar geometry from {} correspondences ({})",
        x1.len(),
        if essential.is_some() {
            "calibrated"
        } else {
            "uncalibrated"
        }
    );
    Ok(EpipolarGeometry {
        fundamental,
        essential,
    })
}
