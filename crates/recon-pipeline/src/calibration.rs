use recon_3d::camera::CameraIntrinsic;
use recon_image::Image;

/// Error types for the intrinsic calibration.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalibrationError {
    /// The calibrator produced, or was given, unusable intrinsics.
    #[error("Invalid intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// The calibrator needs images and none were supplied.
    #[error("No calibration images")]
    NoImages,

    /// The calibration procedure itself failed.
    #[error("Calibration failed: {0}")]
    Failed(String),
}

/// Source of the camera intrinsics.
///
/// Implementors estimate the intrinsics from a set of calibration images, e.g. by
/// locating the corners of a chessboard target. The images are at the resolution
/// of the input images, before any downsampling.
pub trait IntrinsicCalibrator {
    /// Estimate the intrinsics from the calibration images.
    fn calibrate(&self, images: &[Image<f32, 1>]) -> Result<CameraIntrinsic, CalibrationError>;
}

/// A calibrator returning intrinsics known in advance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedIntrinsics(pub CameraIntrinsic);

impl IntrinsicCalibrator for FixedIntrinsics {
    fn calibrate(&self, _images: &[Image<f32, 1>]) -> Result<CameraIntrinsic, CalibrationError> {
        validate_intrinsics(&self.0)?;
        Ok(self.0)
    }
}

/// Check that the focal lengths are positive and every parameter is finite.
pub fn validate_intrinsics(k: &CameraIntrinsic) -> Result<(), CalibrationError> {
    if ![k.fx, k.fy, k.cx, k.cy].iter().all(|v| v.is_finite()) {
        return Err(CalibrationError::InvalidIntrinsics(format!(
            "non-finite parameters {k:?}"
        )));
    }
    if k.fx <= 0.0 || k.fy <= 0.0 {
        return Err(CalibrationError::InvalidIntrinsics(format!(
            "focal lengths must be positive, got fx={} fy={}",
            k.fx, k.fy
        )));
    }
    Ok(())
}

/// A calibrator together with the images it runs on.
#[derive(Clone, Copy)]
pub struct Calibration<'a> {
    /// The calibration procedure.
    pub calibrator: &'a dyn IntrinsicCalibrator,
    /// The calibration images.
    pub images: &'a [Image<f32, 1>],
}

impl<'a> Calibration<'a> {
    /// Pair a calibrator with its images.
    pub fn new(calibrator: &'a dyn IntrinsicCalibrator, images: &'a [Image<f32, 1>]) -> Self {
        Self { calibrator, images }
    }

    /// Run the calibrator and validate its output.
    pub fn run(&self) -> Result<CameraIntrinsic, CalibrationError> {
        let k = self.calibrator.calibrate(self.images)?;
        validate_intrinsics(&k)?;
        Ok(k)
    }
}

impl std::fmt::Debug for Calibration<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calibration")
            .field("images", &self.images.len())
            .finish_non_exhaustive()
    }
}
