use recon_3d::pose::{FundamentalError, PoseError};
use recon_image::ImageError;
use recon_imgproc::features::DetectorError;

use crate::calibration::CalibrationError;
use crate::state::PipelineStage;

/// Reasons for a reconstruction, or a part of it, to fail.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ReconError {
    /// The detector found no keypoints in an image.
    #[error("No features detected in image {image}")]
    DetectionEmpty {
        /// Index of the image in the input set.
        image: usize,
    },

    /// The correspondences do not determine the epipolar geometry.
    #[error("Degenerate correspondences: {0}")]
    DegenerateCorrespondence(#[source] FundamentalError),

    /// The relative pose could not be disambiguated.
    #[error("Pose ambiguity: {0}")]
    PoseAmbiguity(#[source] PoseError),

    /// No correspondence survived the triangulation filters.
    #[error("Reconstruction is empty, all {candidates} candidate points were rejected")]
    ReconstructionEmpty {
        /// Number of correspondences that were triangulated.
        candidates: usize,
    },

    /// The intrinsic calibration failed.
    #[error("Calibration failed: {0}")]
    Calibration(#[source] CalibrationError),

    /// An input image could not be processed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// A stage rejected its configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was aborted by the caller.
    #[error("Reconstruction aborted")]
    Aborted,

    /// Fewer than two images contain features.
    #[error("Not enough images with features to form a pair")]
    NoViablePairs,
}

impl From<FundamentalError> for ReconError {
    fn from(e: FundamentalError) -> Self {
        ReconError::DegenerateCorrespondence(e)
    }
}

impl From<PoseError> for ReconError {
    fn from(e: PoseError) -> Self {
        match e {
            PoseError::InvalidConfig(reason) => ReconError::InvalidConfig(reason.to_string()),
            e => ReconError::PoseAmbiguity(e),
        }
    }
}

impl From<DetectorError> for ReconError {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::InvalidConfig(reason) => ReconError::InvalidConfig(reason.to_string()),
            DetectorError::Image(e) => ReconError::Image(e),
        }
    }
}

impl From<CalibrationError> for ReconError {
    fn from(e: CalibrationError) -> Self {
        ReconError::Calibration(e)
    }
}

/// Terminal error of a reconstruction run.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PipelineError {
    /// The pipeline reached the failed state.
    #[error("Pipeline failed while {stage}: {reason}")]
    Failed {
        /// The stage that was running when the failure occurred.
        stage: PipelineStage,
        /// The originating reason.
        #[source]
        reason: ReconError,
    },
}

impl PipelineError {
    /// The stage the pipeline failed in.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Failed { stage, .. } => *stage,
        }
    }

    /// The reason of the failure.
    pub fn reason(&self) -> &ReconError {
        match self {
            PipelineError::Failed { reason, .. } => reason,
        }
    }
}
