use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use recon_3d::camera::CameraIntrinsic;
use recon_3d::pointcloud::PointCloud;
use recon_3d::pose::{
    epipolar_residual, estimate_geometry, recover_pose, triangulate, triangulate_projective,
    EpipolarGeometry, Pose,
};
use recon_image::Image;
use recon_imgproc::features::{
    detect_batch, match_descriptors, unzip_features, Correspondence, Feature,
};
use recon_imgproc::interpolation::bilinear_sample;
use recon_imgproc::resize::rescale;

use crate::calibration::Calibration;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, ReconError};
use crate::state::{PipelineStage, PipelineState, StateTracker};

/// Handle to request the early termination of a running reconstruction.
///
/// The flag is only checked at stage boundaries, a running stage always completes.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Request the reconstruction to stop.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Whether the reconstruction has metric meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReconstructionMode {
    /// Calibrated cameras, structure known up to a global scale.
    Metric,
    /// Uncalibrated cameras, structure known up to a projective transformation.
    Projective,
}

/// Features detected in one input image.
#[derive(Clone, Debug)]
pub struct ImageFeatures {
    /// Index of the image in the input set.
    pub index: usize,
    /// The detected features, in the coordinates of the downsampled image.
    pub features: Vec<Feature>,
}

/// Result of a successfully reconstructed image pair.
#[derive(Clone, Debug)]
pub struct PairReconstruction {
    /// Index of the reference image.
    pub reference: usize,
    /// Index of the target image.
    pub target: usize,
    /// Fidelity of the reconstruction.
    pub mode: ReconstructionMode,
    /// Correspondences that passed the ratio test.
    pub correspondences: Vec<Correspondence>,
    /// Epipolar geometry estimated from the correspondences.
    pub geometry: EpipolarGeometry,
    /// Mean normalized epipolar residual of the correspondences.
    pub residual: f64,
    /// Pose of the target camera relative to the reference camera, unit baseline.
    pub pose: Option<Pose>,
    /// Intrinsics of the downsampled images.
    pub camera: Option<CameraIntrinsic>,
    /// Triangulated points in the reference camera frame.
    pub cloud: PointCloud,
    /// State transitions the pair went through.
    pub transitions: Vec<PipelineState>,
}

/// An image pair that could not be reconstructed.
#[derive(Debug)]
pub struct PairFailure {
    /// Index of the reference image.
    pub reference: usize,
    /// Index of the target image.
    pub target: usize,
    /// The stage that failed.
    pub stage: PipelineStage,
    /// The originating reason.
    pub error: ReconError,
    /// State transitions the pair went through.
    pub transitions: Vec<PipelineState>,
}

/// Result of a reconstruction run.
#[derive(Debug)]
pub struct Reconstruction {
    /// Fidelity of every pair in the run.
    pub mode: ReconstructionMode,
    /// Intrinsics of the downsampled images, if calibrated.
    pub camera: Option<CameraIntrinsic>,
    /// Pairs reconstructed successfully, ordered by target image.
    pub pairs: Vec<PairReconstruction>,
    /// Pairs that failed, ordered by target image.
    pub failed: Vec<PairFailure>,
    /// Images excluded from every pair.
    pub skipped: Vec<ReconError>,
}

impl Reconstruction {
    /// Total number of triangulated points over all pairs.
    pub fn num_points(&self) -> usize {
        self.pairs.iter().map(|p| p.cloud.len()).sum()
    }
}

struct PairOutput {
    correspondences: Vec<Correspondence>,
    geometry: EpipolarGeometry,
    residual: f64,
    pose: Option<Pose>,
    cloud: PointCloud,
}

/// Sparse two-view reconstruction pipeline.
///
/// The first image with features is the reference; every other image is matched
/// against it and yields an independent point cloud in the reference camera frame.
///
/// # Example
///
/// ```no_run
/// use recon_image::Image;
/// use recon_pipeline::{Pipeline, PipelineConfig};
///
/// let images: Vec<Image<f32, 1>> = Vec::new();
/// let pipeline = Pipeline::new(PipelineConfig::default());
/// let reconstruction = pipeline.run(&images, None)?;
/// println!("{} points", reconstruction.num_points());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    abort: AbortHandle,
}

impl Pipeline {
    /// Create a pipeline with the given configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            abort: AbortHandle::default(),
        }
    }

    /// The configuration of the pipeline.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A handle to abort running reconstructions from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn check_abort(&self) -> Result<(), ReconError> {
        if self.abort.is_aborted() {
            return Err(ReconError::Aborted);
        }
        Ok(())
    }

    /// Reconstruct a sparse point cloud from a set of overlapping grayscale images.
    ///
    /// # Arguments
    ///
    /// * `images` - Grayscale images with values in `[0, 1]`, at full resolution.
    /// * `calibration` - Source of the intrinsics. Without it the reconstruction is
    ///   projective.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is out of range, when the calibration fails, when
    /// fewer than two images contain features, when every pair fails, or when the run
    /// is aborted. The error carries the stage and reason of the first failure.
    pub fn run(
        &self,
        images: &[Image<f32, 1>],
        calibration: Option<Calibration<'_>>,
    ) -> Result<Reconstruction, PipelineError> {
        let mut tracker = StateTracker::new("run");
        self.config
            .validate()
            .map_err(|reason| fail(&mut tracker, reason))?;

        let camera = match calibration {
            Some(calibration) => {
                tracker.enter(PipelineStage::Calibrating);
                let k = self
                    .check_abort()
                    .and_then(|_| calibration.run().map_err(ReconError::from))
                    .map_err(|reason| fail(&mut tracker, reason))?;
                log::debug!("calibrated intrinsics {k:?}");
                Some(k.scaled(self.config.downsample_factor as f64))
            }
            None => {
                log::warn!("no calibration supplied, the reconstruction is only projective");
                None
            }
        };
        let mode = match camera {
            Some(_) => ReconstructionMode::Metric,
            None => ReconstructionMode::Projective,
        };

        tracker.enter(PipelineStage::Matching);
        self.check_abort().map_err(|reason| fail(&mut tracker, reason))?;

        let scaled = images
            .par_iter()
            .map(|image| rescale(image, self.config.downsample_factor))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| fail(&mut tracker, e.into()))?;

        let features = detect_batch(&scaled, &self.config.detector)
            .map_err(|e| fail(&mut tracker, e.into()))?;

        let (viable, skipped) = split_viable(features);

        let (reference, targets) = match viable.split_first() {
            Some((reference, targets)) if !targets.is_empty() => (reference, targets),
            _ => return Err(fail(&mut tracker, ReconError::NoViablePairs)),
        };
        let reference_image = &scaled[reference.index];
        log::info!(
            "reconstructing {} pairs against reference image {}",
            targets.len(),
            reference.index
        );

        let results = targets
            .par_iter()
            .map(|target| {
                self.run_pair(reference, target, camera.as_ref())
                    .map(|pair| colorize(pair, reference_image))
            })
            .collect::<Vec<_>>();

        let (pairs, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
        let pairs = pairs.into_iter().flatten().collect::<Vec<_>>();
        let failed = failed
            .into_iter()
            .filter_map(|r| r.err())
            .collect::<Vec<_>>();

        if self.abort.is_aborted() {
            let stage = failed
                .iter()
                .find(|f| f.error == ReconError::Aborted)
                .map_or(PipelineStage::Matching, |f| f.stage);
            tracker.fail(&ReconError::Aborted);
            return Err(PipelineError::Failed {
                stage,
                reason: ReconError::Aborted,
            });
        }

        if pairs.is_empty() {
            let (stage, reason) = failed
                .into_iter()
                .next()
                .map_or((PipelineStage::Matching, ReconError::NoViablePairs), |f| {
                    (f.stage, f.error)
                });
            tracker.fail(&reason);
            return Err(PipelineError::Failed { stage, reason });
        }

        for failure in failed.iter() {
            log::warn!(
                "pair {}-{} failed while {}: {}",
                failure.reference,
                failure.target,
                failure.stage,
                failure.error
            );
        }
        tracker.done();

        Ok(Reconstruction {
            mode,
            camera,
            pairs,
            failed,
            skipped,
        })
    }

    /// Reconstruct a single image pair from its features.
    ///
    /// Runs the matching, geometry estimation, pose recovery (calibrated only) and
    /// triangulation stages in sequence. The abort flag is checked before each stage.
    ///
    /// # Arguments
    ///
    /// * `reference` - Features of the reference image.
    /// * `target` - Features of the target image.
    /// * `camera` - Intrinsics of both images, in the coordinates of the features.
    pub fn run_pair(
        &self,
        reference: &ImageFeatures,
        target: &ImageFeatures,
        camera: Option<&CameraIntrinsic>,
    ) -> Result<PairReconstruction, PairFailure> {
        let mut tracker = StateTracker::new(format!("pair {}-{}", reference.index, target.index));

        match self.run_pair_stages(reference, target, camera, &mut tracker) {
            Ok(output) => {
                tracker.done();
                Ok(PairReconstruction {
                    reference: reference.index,
                    target: target.index,
                    mode: match camera {
                        Some(_) => ReconstructionMode::Metric,
                        None => ReconstructionMode::Projective,
                    },
                    correspondences: output.correspondences,
                    geometry: output.geometry,
                    residual: output.residual,
                    pose: output.pose,
                    camera: camera.copied(),
                    cloud: output.cloud,
                    transitions: tracker.into_transitions(),
                })
            }
            Err(error) => {
                let stage = tracker.stage();
                tracker.fail(&error);
                Err(PairFailure {
                    reference: reference.index,
                    target: target.index,
                    stage,
                    error,
                    transitions: tracker.into_transitions(),
                })
            }
        }
    }

    fn run_pair_stages(
        &self,
        reference: &ImageFeatures,
        target: &ImageFeatures,
        camera: Option<&CameraIntrinsic>,
        tracker: &mut StateTracker,
    ) -> Result<PairOutput, ReconError> {
        tracker.enter(PipelineStage::Matching);
        self.check_abort()?;

        let (k1, d1) = unzip_features(&reference.features);
        let (k2, d2) = unzip_features(&target.features);
        let correspondences = match_descriptors(&d1, &d2, &self.config.matcher);
        log::debug!(
            "pair {}-{}: {} correspondences from {} x {} features",
            reference.index,
            target.index,
            correspondences.len(),
            d1.len(),
            d2.len()
        );

        let (x1, x2): (Vec<_>, Vec<_>) = correspondences
            .iter()
            .map(|c| (k1[c.query].coords(), k2[c.train].coords()))
            .unzip();

        tracker.enter(PipelineStage::EstimatingGeometry);
        self.check_abort()?;

        let geometry = estimate_geometry(&x1, &x2, camera)?;
        let residual = epipolar_residual(&geometry.fundamental, &x1, &x2);
        log::debug!("epipolar residual {residual:.3e}");

        let threshold = self.config.reprojection_threshold;
        let (pose, cloud) = match (camera, geometry.essential) {
            (Some(k), Some(e)) => {
                tracker.enter(PipelineStage::RecoveringPose);
                self.check_abort()?;

                let x1n = x1.iter().map(|p| k.normalize(p)).collect::<Vec<_>>();
                let x2n = x2.iter().map(|p| k.normalize(p)).collect::<Vec<_>>();
                let pose = recover_pose(&e, &x1n, &x2n, &self.config.pose)?;

                tracker.enter(PipelineStage::Triangulating);
                self.check_abort()?;

                let cloud = triangulate(&Pose::identity(), &pose, k, &x1, &x2, threshold);
                (Some(pose), cloud)
            }
            _ => {
                tracker.enter(PipelineStage::Triangulating);
                self.check_abort()?;

                let cloud = triangulate_projective(&geometry.fundamental, &x1, &x2, threshold);
                (None, cloud)
            }
        };

        if cloud.is_empty() {
            return Err(ReconError::ReconstructionEmpty {
                candidates: x1.len(),
            });
        }
        log::debug!(
            "pair {}-{}: {} of {} points triangulated",
            reference.index,
            target.index,
            cloud.len(),
            x1.len()
        );

        Ok(PairOutput {
            correspondences,
            geometry,
            residual,
            pose,
            cloud,
        })
    }
}

/// Separate the images with features from the ones without.
fn split_viable(features: Vec<Vec<Feature>>) -> (Vec<ImageFeatures>, Vec<ReconError>) {
    let mut skipped = Vec::new();
    let mut viable = Vec::new();
    for (index, features) in features.into_iter().enumerate() {
        if features.is_empty() {
            log::warn!("image {index} has no features, skipping it");
            skipped.push(ReconError::DetectionEmpty { image: index });
        } else {
            log::debug!("image {index}: {} features", features.len());
            viable.push(ImageFeatures { index, features });
        }
    }
    (viable, skipped)
}

fn fail(tracker: &mut StateTracker, reason: ReconError) -> PipelineError {
    let stage = tracker.stage();
    tracker.fail(&reason);
    PipelineError::Failed { stage, reason }
}

/// Sample the reference image at the projection of every point of the pair.
fn colorize(mut pair: PairReconstruction, reference_image: &Image<f32, 1>) -> PairReconstruction {
    let colors = pair
        .cloud
        .points()
        .iter()
        .map(|x| {
            // the projective reference camera is [I | 0] in pixel units
            let pixel = match &pair.camera {
                Some(k) => k.project(x),
                None if x[2].abs() > f64::EPSILON => Some([x[0] / x[2], x[1] / x[2]]),
                None => None,
            };
            let value = pixel
                .map(|[u, v]| bilinear_sample(reference_image, u as f32, v as f32))
                .unwrap_or_default();
            let gray = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            [gray; 3]
        })
        .collect::<Vec<_>>();

    pair.cloud = std::mem::take(&mut pair.cloud).with_colors(colors);
    pair
}
