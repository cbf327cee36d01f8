//! Linear triangulation of correspondences into 3D points.

use super::fundamental::FundamentalMatrix;
use super::{stack_columns, Pose, ProjectionMatrix};
use crate::camera::CameraIntrinsic;
use crate::linalg::{skew_symmetric, svd3};
use crate::pointcloud::PointCloud;

/// Relative threshold on the homogeneous coordinate below which a point lies at infinity.
const INFINITY_TOLERANCE: f64 = 1e-12;

/// Triangulate a correspondence with the direct linear transform.
///
/// Solves the 4x4 homogeneous system `A * X = 0` built from both projections by SVD
/// and returns the right singular vector of the smallest singular value.
///
/// # Arguments
///
/// * `p1` - Projection matrix of the first camera.
/// * `p2` - Projection matrix of the second camera.
/// * `x1` - Image point in the first camera.
/// * `x2` - Image point in the second camera.
///
/// # Returns
///
/// The homogeneous point `[X, Y, Z, W]`, or `None` when the system is not finite.
pub fn triangulate_dlt(
    p1: &ProjectionMatrix,
    p2: &ProjectionMatrix,
    x1: &[f64; 2],
    x2: &[f64; 2],
) -> Option<[f64; 4]> {
    let mut a = faer::Mat::<f64>::zeros(4, 4);
    write_dlt_row(&mut a, 0, x1[0], &p1[2], &p1[0]);
    write_dlt_row(&mut a, 1, x1[1], &p1[2], &p1[1]);
    write_dlt_row(&mut a, 2, x2[0], &p2[2], &p2[0]);
    write_dlt_row(&mut a, 3, x2[1], &p2[2], &p2[1]);

    let svd = a.svd();
    let xh = svd.v().col(3);
    let xh = [xh.read(0), xh.read(1), xh.read(2), xh.read(3)];
    if xh.iter().all(|v| v.is_finite()) {
        Some(xh)
    } else {
        None
    }
}

fn write_dlt_row(a: &mut faer::Mat<f64>, row: usize, x: f64, p3: &[f64; 4], p1: &[f64; 4]) {
    for j in 0..4 {
        a.write(row, j, x * p3[j] - p1[j]);
    }
}

/// Convert a homogeneous point to euclidean coordinates.
///
/// Returns `None` for points at infinity.
pub fn dehomogenize(xh: &[f64; 4]) -> Option<[f64; 3]> {
    let norm = xh.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !xh[3].is_finite() || xh[3].abs() <= INFINITY_TOLERANCE * norm {
        return None;
    }
    Some([xh[0] / xh[3], xh[1] / xh[3], xh[2] / xh[3]])
}

/// Project a 3D point with a projection matrix.
///
/// Returns `None` when the point projects to infinity.
pub fn project_point(p: &ProjectionMatrix, x: &[f64; 3]) -> Option<[f64; 2]> {
    let row = |r: &[f64; 4]| r[0] * x[0] + r[1] * x[1] + r[2] * x[2] + r[3];
    let w = row(&p[2]);
    if w.abs() < f64::EPSILON {
        return None;
    }
    Some([row(&p[0]) / w, row(&p[1]) / w])
}

/// Euclidean distance in pixels between the projection of `x` and the observation `obs`.
pub fn reprojection_error(p: &ProjectionMatrix, x: &[f64; 3], obs: &[f64; 2]) -> Option<f64> {
    let proj = project_point(p, x)?;
    Some(((proj[0] - obs[0]).powi(2) + (proj[1] - obs[1]).powi(2)).sqrt())
}

/// Triangulate correspondences between two calibrated views.
///
/// Each correspondence is triangulated with [`triangulate_dlt`] using the camera
/// matrices `K * [R | t]` of both poses. A point is kept only if it lies in front of
/// both cameras and reprojects within `reprojection_threshold` pixels in both
/// images; failing points are dropped.
///
/// # Arguments
///
/// * `pose_a` - Pose of the first camera, usually [`Pose::identity`].
/// * `pose_b` - Pose of the second camera.
/// * `camera` - Intrinsics shared by both cameras.
/// * `x1` - Pixel coordinates in the first image.
/// * `x2` - Corresponding pixel coordinates in the second image.
/// * `reprojection_threshold` - Maximum reprojection error in pixels.
///
/// # Returns
///
/// The surviving points expressed in the frame of the reference camera.
pub fn triangulate(
    pose_a: &Pose,
    pose_b: &Pose,
    camera: &CameraIntrinsic,
    x1: &[[f64; 2]],
    x2: &[[f64; 2]],
    reprojection_threshold: f64,
) -> PointCloud {
    let p1 = pose_a.projection_matrix(camera);
    let p2 = pose_b.projection_matrix(camera);

    let points = x1
        .iter()
        .zip(x2.iter())
        .filter_map(|(a, b)| {
            let x = dehomogenize(&triangulate_dlt(&p1, &p2, a, b)?)?;
            let in_front = pose_a.transform(&x)[2] > 0.0 && pose_b.transform(&x)[2] > 0.0;
            (in_front
                && within_threshold(&p1, &x, a, reprojection_threshold)
                && within_threshold(&p2, &x, b, reprojection_threshold))
            .then_some(x)
        })
        .collect::<Vec<_>>();

    log::trace!(
        "dropped {} of {} triangulated points",
        x1.len().min(x2.len()) - points.len(),
        x1.len().min(x2.len())
    );

    PointCloud::new(points, None)
}

/// Canonical camera pair of an uncalibrated image pair.
///
/// `P1 = [I | 0]` and `P2 = [[e']x * F | e']` where `e'` is the epipole in the
/// second image, i.e. the left null vector of `F`.
pub fn projective_cameras(f: &FundamentalMatrix) -> (ProjectionMatrix, ProjectionMatrix) {
    let f = f.matrix();
    let epipole = svd3(&f).u.z_axis;

    let p1 = Pose::identity().extrinsic_matrix();
    let p2 = stack_columns(&(skew_symmetric(epipole) * f), epipole);
    (p1, p2)
}

/// Triangulate correspondences between two uncalibrated views.
///
/// Uses the canonical camera pair of [`projective_cameras`], so the structure is only
/// recovered up to a projective transformation and depth carries no metric meaning.
/// Points at infinity and points reprojecting further than `reprojection_threshold`
/// pixels are dropped.
pub fn triangulate_projective(
    f: &FundamentalMatrix,
    x1: &[[f64; 2]],
    x2: &[[f64; 2]],
    reprojection_threshold: f64,
) -> PointCloud {
    let (p1, p2) = projective_cameras(f);

    let points = x1
        .iter()
        .zip(x2.iter())
        .filter_map(|(a, b)| {
            let x = dehomogenize(&triangulate_dlt(&p1, &p2, a, b)?)?;
            (within_threshold(&p1, &x, a, reprojection_threshold)
                && within_threshold(&p2, &x, b, reprojection_threshold))
            .then_some(x)
        })
        .collect::<Vec<_>>();

    log::trace!(
        "dropped {} of {} projective points",
        x1.len().min(x2.len()) - points.len(),
        x1.len().min(x2.len())
    );

    PointCloud::new(points, None)
}

fn within_threshold(p: &ProjectionMatrix, x: &[f64; 3], obs: &[f64; 2], threshold: f64) -> bool {
    reprojection_error(p, x, obs).is_some_and(|e| e <= threshold)
}
