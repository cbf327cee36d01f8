//! Fundamental matrix estimation with the normalized eight-point algorithm.

use crate::linalg::{frobenius_norm, mat3_from_rows, mat3_to_rows, svd3};
use glam::{DMat3, DVec3};

/// Relative tolerance on singular values below which a matrix is considered rank deficient.
const RANK_TOLERANCE: f64 = 1e-8;

/// Minimum number of correspondences of the eight-point algorithm.
pub const MIN_CORRESPONDENCES: usize = 8;

/// Error types for the fundamental matrix estimation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FundamentalError {
    /// The two point sets have different lengths.
    #[error("Point sets have different lengths ({0} != {1})")]
    LengthMismatch(usize, usize),

    /// The correspondences do not constrain a unique fundamental matrix.
    #[error("Degenerate correspondences ({found} points): {reason}")]
    DegenerateCorrespondence {
        /// Number of correspondences supplied.
        found: usize,
        /// What made the configuration degenerate.
        reason: &'static str,
    },
}

/// A fundamental matrix satisfying `x2^T * F * x1 = 0` for corresponding pixels.
///
/// Always rank 2 and scaled to unit Frobenius norm.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FundamentalMatrix(pub [[f64; 3]; 3]);

impl FundamentalMatrix {
    /// The matrix as a `glam` matrix.
    pub fn matrix(&self) -> DMat3 {
        mat3_from_rows(&self.0)
    }
}

/// Similarity transform moving a point set to zero mean and mean distance sqrt(2).
#[derive(Clone, Copy, Debug)]
pub struct Normalization {
    /// Centroid of the point set.
    pub mean: [f64; 2],
    /// Isotropic scale factor.
    pub scale: f64,
}

impl Normalization {
    /// Compute the normalization of a point set.
    pub fn from_points(x: &[[f64; 2]]) -> Self {
        let n = x.len().max(1) as f64;
        let (mx, my) = x
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
        let (mx, my) = (mx / n, my / n);

        let mean_dist = x
            .iter()
            .map(|p| ((p[0] - mx).powi(2) + (p[1] - my).powi(2)).sqrt())
            .sum::<f64>()
            / n;
        let scale = if mean_dist > f64::EPSILON {
            std::f64::consts::SQRT_2 / mean_dist
        } else {
            1.0
        };

        Self {
            mean: [mx, my],
            scale,
        }
    }

    /// Apply the normalization to a point.
    #[inline]
    pub fn apply(&self, p: &[f64; 2]) -> [f64; 2] {
        [
            (p[0] - self.mean[0]) * self.scale,
            (p[1] - self.mean[1]) * self.scale,
        ]
    }

    /// The similarity transform `T = [[s, 0, -s*mx], [0, s, -s*my], [0, 0, 1]]`.
    pub fn matrix(&self) -> DMat3 {
        let s = self.scale;
        DMat3::from_cols(
            DVec3::new(s, 0.0, 0.0),
            DVec3::new(0.0, s, 0.0),
            DVec3::new(-s * self.mean[0], -s * self.mean[1], 1.0),
        )
    }

    /// The inverse similarity transform.
    pub fn inverse_matrix(&self) -> DMat3 {
        let inv = 1.0 / self.scale;
        DMat3::from_cols(
            DVec3::new(inv, 0.0, 0.0),
            DVec3::new(0.0, inv, 0.0),
            DVec3::new(self.mean[0], self.mean[1], 1.0),
        )
    }
}

/// Estimate the fundamental matrix using the normalized 8-point algorithm.
///
/// Both point sets are normalized to zero mean and mean distance sqrt(2), the null
/// vector of the N x 9 design matrix is extracted by SVD, the rank 2 constraint is
/// enforced by zeroing the smallest singular value, and the result is denormalized
/// with `F = T2^T * F_hat * T1` and scaled to unit Frobenius norm.
///
/// # Arguments
///
/// * `x1` - Pixel coordinates in the first image (at least 8 points).
/// * `x2` - Corresponding pixel coordinates in the second image.
///
/// # Errors
///
/// Returns [`FundamentalError::DegenerateCorrespondence`] when fewer than 8
/// correspondences are given, when they do not span 8 independent constraints
/// (coincident points, planar scenes without parallax) or when the estimate
/// collapses below rank 2.
pub fn fundamental_8point(
    x1: &[[f64; 2]],
    x2: &[[f64; 2]],
) -> Result<FundamentalMatrix, FundamentalError> {
    if x1.len() != x2.len() {
        return Err(FundamentalError::LengthMismatch(x1.len(), x2.len()));
    }
    let n = x1.len();
    if n < MIN_CORRESPONDENCES {
        return Err(FundamentalError::DegenerateCorrespondence {
            found: n,
            reason: "fewer than 8 correspondences",
        });
    }

    let norm1 = Normalization::from_points(x1);
    let norm2 = Normalization::from_points(x2);

    // Build design matrix A (N x 9) for x2' * F * x1 = 0
    let mut a = faer::Mat::<f64>::zeros(n, 9);
    for (i, (p1, p2)) in x1.iter().zip(x2.iter()).enumerate() {
        let [x, y] = norm1.apply(p1);
        let [xp, yp] = norm2.apply(p2);
        let row = [xp * x, xp * y, xp, yp * x, yp * y, yp, x, y, 1.0];
        for (j, v) in row.into_iter().enumerate() {
            a.write(i, j, v);
        }
    }

    // Solve Af = 0 via SVD: take last column of V
    let svd = a.svd();
    let s = svd.s_diagonal();
    if s.read(7) <= RANK_TOLERANCE * s.read(0) {
        return Err(FundamentalError::DegenerateCorrespondence {
            found: n,
            reason: "correspondences span fewer than 8 independent constraints",
        });
    }
    let fvec = svd.v().col(8);
    let f_hat = mat3_from_rows(&[
        [fvec.read(0), fvec.read(1), fvec.read(2)],
        [fvec.read(3), fvec.read(4), fvec.read(5)],
        [fvec.read(6), fvec.read(7), fvec.read(8)],
    ]);

    // Enforce rank-2 constraint on F by zeroing the smallest singular value
    let f_svd = svd3(&f_hat);
    if f_svd.s.y <= RANK_TOLERANCE * f_svd.s.x {
        return Err(FundamentalError::DegenerateCorrespondence {
            found: n,
            reason: "estimated matrix has rank below 2",
        });
    }
    let f_rank2 = f_svd.recompose(f_svd.s.with_z(0.0));

    // Denormalize: F = T2^T * F * T1
    let f = norm2.matrix().transpose() * f_rank2 * norm1.matrix();

    Ok(FundamentalMatrix(mat3_to_rows(&normalize_frobenius(&f))))
}

/// Scale a matrix to unit Frobenius norm.
pub(crate) fn normalize_frobenius(m: &DMat3) -> DMat3 {
    let norm = frobenius_norm(m);
    if norm <= f64::EPSILON {
        return *m;
    }
    *m * (1.0 / norm)
}

#[inline]
fn homogeneous(p: &[f64; 2]) -> DVec3 {
    DVec3::new(p[0], p[1], 1.0)
}

/// Algebraic epipolar error `x2^T * F * x1` of a single correspondence.
#[inline]
pub fn epipolar_error(f: &DMat3, x1: &[f64; 2], x2: &[f64; 2]) -> f64 {
    homogeneous(x2).dot(*f * homogeneous(x1))
}

/// Mean absolute epipolar residual of a fundamental matrix in normalized coordinates.
///
/// The correspondences are Hartley-normalized and `F` is moved into the same frame,
/// `F_hat = T2^-T * F * T1^-1`, and rescaled to unit norm, which makes the residual
/// independent of image resolution. Returns 0 for empty input.
pub fn epipolar_residual(f: &FundamentalMatrix, x1: &[[f64; 2]], x2: &[[f64; 2]]) -> f64 {
    let n = x1.len().min(x2.len());
    if n == 0 {
        return 0.0;
    }
    let norm1 = Normalization::from_points(&x1[..n]);
    let norm2 = Normalization::from_points(&x2[..n]);

    let f_hat = norm2.inverse_matrix().transpose() * f.matrix() * norm1.inverse_matrix();
    let f_hat = normalize_frobenius(&f_hat);

    x1.iter()
        .zip(x2.iter())
        .map(|(p1, p2)| epipolar_error(&f_hat, &norm1.apply(p1), &norm2.apply(p2)).abs())
        .sum::<f64>()
        / n as f64
}

/// Sampson distance, the first order approximation of the squared geometric error.
///
/// # Returns
///
/// The squared distance in pixels^2, or infinity when the epipolar lines are undefined.
pub fn sampson_distance(f: &DMat3, x1: &[f64; 2], x2: &[f64; 2]) -> f64 {
    let x2h = homogeneous(x2);
    let fx1 = *f * homogeneous(x1);
    let ftx2 = f.transpose() * x2h;
    let num = x2h.dot(fx1);
    let den = fx1.truncate().length_squared() + ftx2.truncate().length_squared();
    if den <= f64::EPSILON {
        return f64::INFINITY;
    }
    num * num / den
}
