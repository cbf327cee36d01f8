//! Small fixed size linear algebra.
//!
//! Public types keep row-major `[[f64; 3]; 3]` arrays, the arithmetic is done on
//! `glam` matrices and factorizations are delegated to `faer`.

use glam::{DMat3, DVec3};

/// The 3x3 identity matrix as a row-major array.
pub const IDENTITY3: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Convert a row-major array into a `glam` matrix.
#[inline]
pub fn mat3_from_rows(rows: &[[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(rows).transpose()
}

/// Convert a `glam` matrix into a row-major array.
#[inline]
pub fn mat3_to_rows(m: &DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Frobenius norm of a 3x3 matrix.
pub fn frobenius_norm(m: &DMat3) -> f64 {
    (m.x_axis.length_squared() + m.y_axis.length_squared() + m.z_axis.length_squared()).sqrt()
}

/// Skew symmetric matrix `[v]x` such that `[v]x * w = v x w`.
pub fn skew_symmetric(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

/// Rotation matrix from an axis and an angle in radians.
///
/// The axis does not need to be normalized. A zero axis yields the identity.
pub fn rotation_from_axis_angle(axis: &[f64; 3], angle: f64) -> [[f64; 3]; 3] {
    let axis = DVec3::from_array(*axis).normalize_or_zero();
    if axis == DVec3::ZERO {
        return IDENTITY3;
    }
    mat3_to_rows(&DMat3::from_axis_angle(axis, angle))
}

/// Singular value decomposition `A = U * diag(s) * V^T` of a 3x3 matrix.
#[derive(Clone, Copy, Debug)]
pub struct Svd3 {
    /// Left singular vectors.
    pub u: DMat3,
    /// Singular values in non-increasing order.
    pub s: DVec3,
    /// Right singular vectors.
    pub v: DMat3,
}

impl Svd3 {
    /// Recompose `U * diag(s) * V^T` with the given singular values.
    pub fn recompose(&self, s: DVec3) -> DMat3 {
        self.u * DMat3::from_diagonal(s) * self.v.transpose()
    }
}

/// Compute the singular value decomposition of a 3x3 matrix.
pub fn svd3(a: &DMat3) -> Svd3 {
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| a.col(j)[i]);
    let svd = mat.svd();

    let cols = |m: faer::MatRef<'_, f64>| {
        DMat3::from_cols(
            DVec3::new(m.read(0, 0), m.read(1, 0), m.read(2, 0)),
            DVec3::new(m.read(0, 1), m.read(1, 1), m.read(2, 1)),
            DVec3::new(m.read(0, 2), m.read(1, 2), m.read(2, 2)),
        )
    };
    let s = svd.s_diagonal();

    Svd3 {
        u: cols(svd.u()),
        s: DVec3::new(s.read(0), s.read(1), s.read(2)),
        v: cols(svd.v()),
    }
}
