use rand::prelude::*;
use recon_3d::camera::CameraIntrinsic;
use recon_3d::linalg::rotation_from_axis_angle;
use recon_3d::pose::Pose;
use recon_image::{Image, ImageError, ImageSize};
use recon_imgproc::features::{
    Descriptor, DetectorConfig, Feature, Keypoint, MatchConfig, DESCRIPTOR_SIZE,
};
use recon_pipeline::{
    Calibration, FixedIntrinsics, ImageFeatures, Pipeline, PipelineConfig, PipelineError,
    PipelineStage, PipelineState, ReconError, ReconstructionMode,
};

const NOISE_SIGMA: f64 = 0.5;

struct GridScene {
    camera: CameraIntrinsic,
    pose: Pose,
    points: Vec<[f64; 3]>,
}

/// A 4x4 grid in front of the reference camera, raised on alternating ridges.
///
/// The columns alternate half a unit in depth: a coplanar grid leaves the eight-point
/// system rank deficient, so this is not a planar scene.
fn grid_scene() -> GridScene {
    let points = (0..16)
        .map(|i| {
            let u = (i % 4) as f64 - 1.5;
            let v = (i / 4) as f64 - 1.5;
            let ridge = if (i % 4) % 2 == 0 { 0.5 } else { -0.5 };
            [0.8 * u, 0.8 * v, 3.0 + ridge + 0.15 * v]
        })
        .collect();

    GridScene {
        camera: CameraIntrinsic::new(1500.0, 1500.0, 640.0, 480.0),
        pose: Pose::new(
            rotation_from_axis_angle(&[0.05, 1.0, 0.02], 0.35),
            [-1.5, 0.0, 0.3],
        ),
        points,
    }
}

fn gaussian(rng: &mut StdRng) -> f64 {
    // Box-Muller
    let u1 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn feature(pixel: [f64; 2], descriptor: Descriptor, rng: &mut StdRng) -> Feature {
    Feature {
        keypoint: Keypoint {
            x: (pixel[0] + NOISE_SIGMA * gaussian(rng)) as f32,
            y: (pixel[1] + NOISE_SIGMA * gaussian(rng)) as f32,
            scale: 1.0,
            angle: 0.0,
            response: 1.0,
            octave: 0,
        },
        descriptor,
    }
}

/// Features of both views: a distinct random descriptor per point, slightly perturbed
/// in each view, and pixel noise on every keypoint.
fn scene_features(scene: &GridScene, seed: u64) -> (ImageFeatures, ImageFeatures) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = Vec::new();
    let mut b = Vec::new();

    for p in scene.points.iter() {
        let mut descriptor = [0.0f32; DESCRIPTOR_SIZE];
        descriptor.iter_mut().for_each(|v| *v = rng.random::<f32>());
        let mut jitter = || {
            let mut d = descriptor;
            d.iter_mut().for_each(|v| *v += rng.random_range(-0.01..0.01));
            d
        };
        let (d1, d2) = (jitter(), jitter());

        let x1 = scene.camera.project(p).expect("in front of the reference camera");
        let x2 = scene
            .camera
            .project(&scene.pose.transform(p))
            .expect("in front of the second camera");
        a.push(feature(x1, d1, &mut rng));
        b.push(feature(x2, d2, &mut rng));
    }

    (
        ImageFeatures {
            index: 0,
            features: a,
        },
        ImageFeatures {
            index: 1,
            features: b,
        },
    )
}

fn random_texture(size: usize, seed: u64) -> Result<Image<f32, 1>, ImageError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..size * size).map(|_| rng.random::<f32>()).collect();
    Image::new([size, size].into(), data)
}

fn full_resolution_config() -> PipelineConfig {
    PipelineConfig {
        downsample_factor: 1.0,
        ..Default::default()
    }
}

#[test]
fn ridged_grid_metric_reconstruction() {
    let _ = env_logger::builder().is_test(true).try_init();

    let scene = grid_scene();
    let baseline = scene.pose.translation.iter().map(|v| v * v).sum::<f64>().sqrt();
    let pipeline = Pipeline::new(PipelineConfig::default());

    for seed in [7, 8, 9] {
        let (a, b) = scene_features(&scene, seed);
        let pair = pipeline
            .run_pair(&a, &b, Some(&scene.camera))
            .expect("ridged grid reconstructs");

        assert_eq!(pair.mode, ReconstructionMode::Metric);
        assert!(pair.correspondences.len() >= 12);
        assert!(pair.residual < 1e-2, "residual {}", pair.residual);
        assert_eq!(pair.transitions.last(), Some(&PipelineState::Done));
        assert!(pair.transitions.contains(&PipelineState::Running(
            PipelineStage::RecoveringPose
        )));

        let pose = pair.pose.expect("calibrated pairs recover the pose");
        assert!(pose.translation[0] < 0.0);

        // match every reconstructed point to the ground truth point projecting
        // closest to it in the reference image
        let within_one_percent = pair
            .cloud
            .points()
            .iter()
            .filter(|x| {
                let Some(pixel) = scene.camera.project(x) else {
                    return false;
                };
                let closest = scene.points.iter().min_by(|p, q| {
                    let dp = pixel_distance(&scene.camera, p, &pixel);
                    let dq = pixel_distance(&scene.camera, q, &pixel);
                    dp.total_cmp(&dq)
                });
                closest.is_some_and(|gt| ((x[2] * baseline - gt[2]) / gt[2]).abs() < 0.01)
            })
            .count();
        assert!(
            within_one_percent >= 10,
            "only {within_one_percent} points within 1% of the true depth"
        );
    }
}

fn pixel_distance(camera: &CameraIntrinsic, point: &[f64; 3], pixel: &[f64; 2]) -> f64 {
    camera.project(point).map_or(f64::INFINITY, |p| {
        ((p[0] - pixel[0]).powi(2) + (p[1] - pixel[1]).powi(2)).sqrt()
    })
}

#[test]
fn ridged_grid_projective_reconstruction() {
    let scene = grid_scene();
    let (a, b) = scene_features(&scene, 11);
    let pair = Pipeline::new(PipelineConfig::default())
        .run_pair(&a, &b, None)
        .expect("ridged grid reconstructs without intrinsics");

    assert_eq!(pair.mode, ReconstructionMode::Projective);
    assert!(pair.pose.is_none());
    assert!(pair.geometry.essential.is_none());
    assert!(pair.cloud.len() >= 12);
    assert!(!pair.transitions.contains(&PipelineState::Running(
        PipelineStage::RecoveringPose
    )));
}

#[test]
fn featureless_image_leaves_no_pair() -> Result<(), ImageError> {
    let _ = env_logger::builder().is_test(true).try_init();

    let images = vec![
        random_texture(128, 1)?,
        Image::from_size_val([128, 128].into(), 0.5)?,
    ];
    let err = Pipeline::new(full_resolution_config())
        .run(&images, None)
        .expect_err("a single textured image cannot form a pair");

    assert_eq!(
        err,
        PipelineError::Failed {
            stage: PipelineStage::Matching,
            reason: ReconError::NoViablePairs,
        }
    );
    Ok(())
}

#[test]
fn featureless_image_is_excluded_from_pairs() -> Result<(), ImageError> {
    let _ = env_logger::builder().is_test(true).try_init();

    // the flat image is skipped, the two identical views form the only pair and do
    // not constrain the epipolar geometry
    let texture = random_texture(128, 2)?;
    let images = vec![
        Image::from_size_val([128, 128].into(), 0.5)?,
        texture.clone(),
        texture,
    ];
    let err = Pipeline::new(full_resolution_config())
        .run(&images, None)
        .expect_err("identical views are degenerate");

    assert_eq!(err.stage(), PipelineStage::EstimatingGeometry);
    assert!(matches!(
        err.reason(),
        ReconError::DegenerateCorrespondence(_)
    ));
    Ok(())
}

#[test]
fn invalid_calibration_fails_the_run() -> Result<(), ImageError> {
    let images = vec![random_texture(64, 3)?, random_texture(64, 4)?];
    let calibrator = FixedIntrinsics(CameraIntrinsic::new(-100.0, 100.0, 32.0, 32.0));

    let err = Pipeline::new(full_resolution_config())
        .run(&images, Some(Calibration::new(&calibrator, &[])))
        .expect_err("negative focal length");

    assert_eq!(err.stage(), PipelineStage::Calibrating);
    assert!(matches!(err.reason(), ReconError::Calibration(_)));
    Ok(())
}

#[test]
fn abort_from_another_thread() -> Result<(), ImageError> {
    let images = vec![random_texture(64, 5)?, random_texture(64, 6)?];
    let pipeline = Pipeline::new(full_resolution_config());
    let handle = pipeline.abort_handle();

    std::thread::spawn(move || handle.abort())
        .join()
        .expect("abort thread");

    let err = pipeline.run(&images, None).expect_err("aborted");
    assert_eq!(err.reason(), &ReconError::Aborted);
    Ok(())
}

const RIDGE_SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};
const RIDGE_DEPTH: f64 = 3.0;
const RIDGE_SLOPE: [f64; 2] = [0.4, 0.2];
const RIDGE_CELL: f64 = 0.1;

fn ridge_camera() -> CameraIntrinsic {
    CameraIntrinsic::new(520.0, 520.0, 319.5, 239.5)
}

/// Second view: moved 0.2 to the right and turned back towards the ridge.
fn ridge_second_pose() -> Pose {
    let center: [f64; 3] = [0.2, 0.0, 0.0];
    let rotation = rotation_from_axis_angle(&[0.0, 1.0, 0.0], center[0].atan2(3.2));
    let translation =
        rotation.map(|row| -(row[0] * center[0] + row[1] * center[1] + row[2] * center[2]));
    Pose::new(rotation, translation)
}

/// Deterministic value in `[0, 1)` for a texture cell.
fn cell_value(i: i64, j: i64) -> f64 {
    let mut x = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (j as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    x ^= x >> 31;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 29;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 32;
    (x >> 11) as f64 / (1u64 << 53) as f64
}

/// Smooth value noise over the world `x`, `y` coordinates of the surface.
fn ridge_texture(x: f64, y: f64) -> f32 {
    let smoothstep = |t: f64| t * t * (3.0 - 2.0 * t);
    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

    let (u, v) = (x / RIDGE_CELL, y / RIDGE_CELL);
    let (i, j) = (u.floor(), v.floor());
    let (fu, fv) = (smoothstep(u - i), smoothstep(v - j));
    let (i, j) = (i as i64, j as i64);

    let top = lerp(cell_value(i, j), cell_value(i + 1, j), fu);
    let bottom = lerp(cell_value(i, j + 1), cell_value(i + 1, j + 1), fu);
    (0.15 + 0.7 * lerp(top, bottom, fv)) as f32
}

/// First intersection of a ray with the ridge `z = 3 + 0.4 |x| + 0.2 y`.
fn ridge_hit(origin: [f64; 3], dir: [f64; 3]) -> Option<[f64; 3]> {
    [1.0f64, -1.0]
        .into_iter()
        .filter_map(|side| {
            let den = dir[2] - RIDGE_SLOPE[0] * side * dir[0] - RIDGE_SLOPE[1] * dir[1];
            if den <= 1e-12 {
                return None;
            }
            let s = (RIDGE_DEPTH + RIDGE_SLOPE[0] * side * origin[0] + RIDGE_SLOPE[1] * origin[1]
                - origin[2])
                / den;
            (s > 0.0 && side * (origin[0] + s * dir[0]) >= 0.0).then_some(s)
        })
        .reduce(f64::max)
        .map(|s| [0, 1, 2].map(|k| origin[k] + s * dir[k]))
}

/// Ray cast the textured ridge as seen by a camera with the given pose.
fn render_ridge(camera: &CameraIntrinsic, pose: &Pose) -> Result<Image<f32, 1>, ImageError> {
    let r = pose.rotation;
    let t = pose.translation;
    // rows of R^T are the columns of R
    let rotate_back =
        |v: [f64; 3]| [0, 1, 2].map(|j| r[0][j] * v[0] + r[1][j] * v[1] + r[2][j] * v[2]);
    let center = rotate_back(t).map(|v| -v);

    let data = (0..RIDGE_SIZE.area())
        .map(|idx| {
            let (row, col) = (idx / RIDGE_SIZE.width, idx % RIDGE_SIZE.width);
            let ray = [
                (col as f64 - camera.cx) / camera.fx,
                (row as f64 - camera.cy) / camera.fy,
                1.0,
            ];
            ridge_hit(center, rotate_back(ray)).map_or(0.0, |p| ridge_texture(p[0], p[1]))
        })
        .collect();
    Image::new(RIDGE_SIZE, data)
}

/// Single octave detection and strict matching: the pipeline has no outlier
/// rejection, so only the most distinctive mutual matches are kept.
fn ridge_config(downsample_factor: f32) -> PipelineConfig {
    PipelineConfig {
        downsample_factor,
        detector: DetectorConfig {
            max_features: 300,
            num_levels: 1,
            ..Default::default()
        },
        matcher: MatchConfig {
            ratio_threshold: 0.6,
            cross_check: true,
            max_correspondences: Some(50),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn rendered_ridge_reconstructs_around_flat_image() -> Result<(), ImageError> {
    let _ = env_logger::builder().is_test(true).try_init();

    let camera = ridge_camera();
    let images = vec![
        render_ridge(&camera, &Pose::identity())?,
        Image::from_size_val(RIDGE_SIZE, 0.5)?,
        render_ridge(&camera, &ridge_second_pose())?,
    ];
    let calibrator = FixedIntrinsics(camera);

    for factor in [1.0f32, 0.5] {
        let reconstruction = Pipeline::new(ridge_config(factor))
            .run(&images, Some(Calibration::new(&calibrator, &[])))
            .unwrap_or_else(|e| panic!("downsample {factor}: {e}"));

        assert_eq!(reconstruction.mode, ReconstructionMode::Metric);
        assert_eq!(reconstruction.camera, Some(camera.scaled(factor as f64)));
        assert_eq!(
            reconstruction.skipped,
            vec![ReconError::DetectionEmpty { image: 1 }]
        );
        assert!(reconstruction.failed.is_empty());
        assert_eq!(reconstruction.pairs.len(), 1);

        let pair = &reconstruction.pairs[0];
        assert_eq!((pair.reference, pair.target), (0, 2));
        assert_eq!(pair.correspondences.len(), 50);
        assert_eq!(pair.transitions.last(), Some(&PipelineState::Done));

        // the second camera moved to the right, the scene moves left
        let pose = pair.pose.expect("calibrated pairs recover the pose");
        assert!(pose.translation[0] < 0.0, "translation {:?}", pose.translation);

        assert!(
            pair.cloud.len() >= 25,
            "downsample {factor}: {} points",
            pair.cloud.len()
        );
        let colors = pair.cloud.colors().expect("colors sampled from the reference");
        assert_eq!(colors.len(), pair.cloud.len());
        assert!(colors.iter().all(|c| c[0] == c[1] && c[1] == c[2]));
    }
    Ok(())
}

#[test]
fn out_of_range_detector_config_fails_before_work() -> Result<(), ImageError> {
    let images = vec![random_texture(64, 7)?, random_texture(64, 8)?];

    for (num_levels, scale_factor) in [(0, 1.5), (3, 1.0), (3, 0.5)] {
        let config = PipelineConfig {
            detector: DetectorConfig {
                num_levels,
                scale_factor,
                ..Default::default()
            },
            ..full_resolution_config()
        };
        let err = Pipeline::new(config)
            .run(&images, None)
            .expect_err("detector configuration out of range");

        assert_eq!(err.stage(), PipelineStage::Idle);
        assert!(matches!(err.reason(), ReconError::InvalidConfig(_)));
    }
    Ok(())
}
