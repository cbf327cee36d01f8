//! Synthetic two-view scenes shared by the pose tests.

use rand::prelude::*;

use super::Pose;
use crate::camera::CameraIntrinsic;
use crate::linalg::rotation_from_axis_angle;

pub(crate) struct Scene {
    pub camera: CameraIntrinsic,
    pub pose: Pose,
    pub points: Vec<[f64; 3]>,
    pub x1: Vec<[f64; 2]>,
    pub x2: Vec<[f64; 2]>,
}

impl Scene {
    pub fn normalized(&self) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
        (
            self.x1.iter().map(|p| self.camera.normalize(p)).collect(),
            self.x2.iter().map(|p| self.camera.normalize(p)).collect(),
        )
    }
}

pub(crate) fn default_pose() -> Pose {
    Pose::new(
        rotation_from_axis_angle(&[0.1, 1.0, 0.05], 0.15),
        [-0.6, 0.05, 0.1],
    )
}

/// Random points inside a box in front of both cameras, projected without noise.
pub(crate) fn make_scene(n: usize, seed: u64) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let points = (0..n)
        .map(|_| {
            [
                rng.random_range(-1.5..1.5),
                rng.random_range(-1.0..1.0),
                rng.random_range(4.0..7.0),
            ]
        })
        .collect::<Vec<_>>();
    make_scene_from_points(points, default_pose())
}

pub(crate) fn make_scene_from_points(points: Vec<[f64; 3]>, pose: Pose) -> Scene {
    let camera = CameraIntrinsic::new(500.0, 500.0, 320.0, 240.0);
    let project = |p: &[f64; 3]| {
        [
            camera.fx * p[0] / p[2] + camera.cx,
            camera.fy * p[1] / p[2] + camera.cy,
        ]
    };
    let x1 = points.iter().map(project).collect();
    let x2 = points.iter().map(|p| project(&pose.transform(p))).collect();
    Scene {
        camera,
        pose,
        points,
        x1,
        x2,
    }
}
