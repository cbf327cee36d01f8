use recon_3d::pose::PoseConfig;
use recon_imgproc::features::{DetectorConfig, MatchConfig};

use crate::error::ReconError;

/// Configuration of a reconstruction run.
///
/// Every stage receives its own section, so a single JSON document can tune the
/// whole pipeline. Missing fields fall back to their defaults.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Uniform scale applied to every input image before detection.
    ///
    /// The intrinsics are scaled by the same factor.
    pub downsample_factor: f32,
    /// Feature detector settings.
    pub detector: DetectorConfig,
    /// Descriptor matcher settings.
    pub matcher: MatchConfig,
    /// Pose disambiguation settings.
    pub pose: PoseConfig,
    /// Maximum reprojection error in pixels of a triangulated point, measured in the
    /// downsampled images.
    pub reprojection_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            downsample_factor: 0.25,
            detector: DetectorConfig::default(),
            matcher: MatchConfig::default(),
            pose: PoseConfig::default(),
            reprojection_threshold: 2.0,
        }
    }
}

impl PipelineConfig {
    /// Check every section of the configuration.
    pub fn validate(&self) -> Result<(), ReconError> {
        if !(self.downsample_factor.is_finite() && self.downsample_factor > 0.0) {
            return Err(ReconError::InvalidConfig(format!(
                "downsample_factor must be positive, got {}",
                self.downsample_factor
            )));
        }
        if !(self.reprojection_threshold.is_finite() && self.reprojection_threshold > 0.0) {
            return Err(ReconError::InvalidConfig(format!(
                "reprojection_threshold must be positive, got {}",
                self.reprojection_threshold
            )));
        }
        self.detector.validate()?;
        self.pose.validate()?;
        Ok(())
    }
}
