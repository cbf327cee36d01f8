use glam::{DMat3, DVec3};

/// Intrinsic parameters of a pinhole camera.
///
/// The intrinsic matrix is
///
/// ```text
/// K = | fx  0  cx |
///     |  0 fy  cy |
///     |  0  0   1 |
/// ```
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CameraIntrinsic {
    /// Focal length along x in pixels.
    pub fx: f64,
    /// Focal length along y in pixels.
    pub fy: f64,
    /// Principal point x coordinate in pixels.
    pub cx: f64,
    /// Principal point y coordinate in pixels.
    pub cy: f64,
}

impl CameraIntrinsic {
    /// Create a new set of intrinsic parameters.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// The intrinsic matrix `K`.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(self.fx, 0.0, 0.0),
            DVec3::new(0.0, self.fy, 0.0),
            DVec3::new(self.cx, self.cy, 1.0),
        )
    }

    /// The inverse of the intrinsic matrix.
    pub fn inverse_matrix(&self) -> DMat3 {
        DMat3::from_cols(
            DVec3::new(1.0 / self.fx, 0.0, 0.0),
            DVec3::new(0.0, 1.0 / self.fy, 0.0),
            DVec3::new(-self.cx / self.fx, -self.cy / self.fy, 1.0),
        )
    }

    /// Map a pixel to normalized camera coordinates, i.e. `K^-1 * [u, v, 1]`.
    #[inline]
    pub fn normalize(&self, pixel: &[f64; 2]) -> [f64; 2] {
        [
            (pixel[0] - self.cx) / self.fx,
            (pixel[1] - self.cy) / self.fy,
        ]
    }

    /// Map normalized camera coordinates back to a pixel.
    #[inline]
    pub fn denormalize(&self, point: &[f64; 2]) -> [f64; 2] {
        [
            point[0] * self.fx + self.cx,
            point[1] * self.fy + self.cy,
        ]
    }

    /// Project a point expressed in the camera frame.
    ///
    /// Returns `None` for points on the principal plane.
    pub fn project(&self, point: &[f64; 3]) -> Option<[f64; 2]> {
        if point[2].abs() < f64::EPSILON {
            return None;
        }
        Some(self.denormalize(&[point[0] / point[2], point[1] / point[2]]))
    }

    /// Intrinsics of the same camera after the image was rescaled by `factor`.
    ///
    /// Uses the pixel center convention of the image resampling, so that
    /// `x_scaled = (x + 0.5) * factor - 0.5`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            fx: self.fx * factor,
            fy: self.fy * factor,
            cx: (self.cx + 0.5) * factor - 0.5,
            cy: (self.cy + 0.5) * factor - 0.5,
        }
    }
}
