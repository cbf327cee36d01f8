//! Essential matrix decomposition and pose selection by the chirality check.

use super::essential::EssentialMatrix;
use super::triangulation::{dehomogenize, triangulate_dlt};
use super::{Pose, ProjectionMatrix};
use crate::linalg::{mat3_to_rows, svd3};
use glam::DMat3;

/// Error types for the pose recovery.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PoseError {
    /// No candidate, or more than one candidate, explains the sampled correspondences.
    #[error("Ambiguous pose: best candidate passes {best}/{sample}, runner-up {runner_up}/{sample}")]
    Ambiguous {
        /// Number of sampled points passing the chirality check for the best candidate.
        best: usize,
        /// Number of sampled points passing for the second best candidate.
        runner_up: usize,
        /// Number of sampled correspondences.
        sample: usize,
    },

    /// No correspondences to score the candidates with.
    #[error("No correspondences to disambiguate the pose")]
    InsufficientSamples,

    /// The pose configuration is out of range.
    #[error("Invalid pose configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Which of the four factorizations of an essential matrix a candidate comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CandidateKind {
    /// `R = U W V^T`, `t = +u3`.
    WPositive,
    /// `R = U W V^T`, `t = -u3`.
    WNegative,
    /// `R = U W^T V^T`, `t = +u3`.
    WtPositive,
    /// `R = U W^T V^T`, `t = -u3`.
    WtNegative,
}

/// A candidate relative pose of the second camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseCandidate {
    /// The factorization the candidate comes from.
    pub kind: CandidateKind,
    /// The candidate pose, with unit translation.
    pub pose: Pose,
}

/// Configuration for the pose recovery.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Maximum number of correspondences used to score the candidates.
    pub sample_size: usize,
    /// Minimum fraction of the sample the selected candidate has to explain, in `(0, 1]`.
    pub min_chirality_fraction: f64,
}

impl PoseConfig {
    /// Check that the configuration values are in range.
    pub fn validate(&self) -> Result<(), PoseError> {
        if self.sample_size == 0 {
            return Err(PoseError::InvalidConfig("sample_size must be at least 1"));
        }
        if !(self.min_chirality_fraction > 0.0 && self.min_chirality_fraction <= 1.0) {
            return Err(PoseError::InvalidConfig(
                "min_chirality_fraction must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            sample_size: 64,
            min_chirality_fraction: 0.5,
        }
    }
}

const W: DMat3 = DMat3::from_cols_array(&[0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);

/// Decompose an essential matrix into its four possible `(R, t)` solutions.
///
/// With `E = U diag(1, 1, 0) V^T`, where `U` and `V` are sign corrected to be proper
/// rotations, the rotations are `U W V^T` and `U W^T V^T` and the translation is
/// `±u3`, the last column of `U`. Every returned rotation has determinant +1.
pub fn decompose_essential(e: &EssentialMatrix) -> [PoseCandidate; 4] {
    let svd = svd3(&e.matrix());
    let mut u = svd.u;
    let mut v = svd.v;

    // flipping the last column keeps E unchanged since its singular value is zero
    if u.determinant() < 0.0 {
        u.z_axis = -u.z_axis;
    }
    if v.determinant() < 0.0 {
        v.z_axis = -v.z_axis;
    }

    let vt = v.transpose();
    let r1 = mat3_to_rows(&(u * W * vt));
    let r2 = mat3_to_rows(&(u * W.transpose() * vt));

    let t = u.z_axis.to_array();
    let t_neg = (-u.z_axis).to_array();

    [
        PoseCandidate {
            kind: CandidateKind::WPositive,
            pose: Pose::new(r1, t),
        },
        PoseCandidate {
            kind: CandidateKind::WNegative,
            pose: Pose::new(r1, t_neg),
        },
        PoseCandidate {
            kind: CandidateKind::WtPositive,
            pose: Pose::new(r2, t),
        },
        PoseCandidate {
            kind: CandidateKind::WtNegative,
            pose: Pose::new(r2, t_neg),
        },
    ]
}

/// Count the correspondences that triangulate in front of both cameras.
///
/// The first camera is `[I | 0]` and the second one is `pose`. Both point sets are
/// in normalized camera coordinates.
pub fn chirality_score(pose: &Pose, x1n: &[[f64; 2]], x2n: &[[f64; 2]]) -> usize {
    let p1: ProjectionMatrix = Pose::identity().extrinsic_matrix();
    let p2 = pose.extrinsic_matrix();

    x1n.iter()
        .zip(x2n.iter())
        .filter(|(a, b)| {
            triangulate_dlt(&p1, &p2, a, b)
                .and_then(|xh| dehomogenize(&xh))
                .is_some_and(|x| x[2] > 0.0 && pose.transform(&x)[2] > 0.0)
        })
        .count()
}

/// Recover the relative pose of the second camera from an essential matrix.
///
/// The four candidates of [`decompose_essential`] are scored with [`chirality_score`]
/// on an evenly strided sample of at most `config.sample_size` correspondences and
/// the candidate with the highest score is selected.
///
/// # Arguments
///
/// * `e` - The essential matrix.
/// * `x1n` - Normalized coordinates in the first camera.
/// * `x2n` - Corresponding normalized coordinates in the second camera.
/// * `config` - The pose recovery configuration.
///
/// # Errors
///
/// [`PoseError::Ambiguous`] when the best candidate explains less than
/// `min_chirality_fraction` of the sample, or when the runner-up ties with it or
/// explains at least half of the sample. [`PoseError::InsufficientSamples`] when the
/// sample is empty and [`PoseError::InvalidConfig`] for an out of range configuration.
pub fn recover_pose(
    e: &EssentialMatrix,
    x1n: &[[f64; 2]],
    x2n: &[[f64; 2]],
    config: &PoseConfig,
) -> Result<Pose, PoseError> {
    config.validate()?;
    let n = x1n.len().min(x2n.len());
    let sample_size = config.sample_size.min(n);
    if sample_size == 0 {
        return Err(PoseError::InsufficientSamples);
    }

    let (s1, s2): (Vec<_>, Vec<_>) = (0..sample_size)
        .map(|i| {
            let idx = i * n / sample_size;
            (x1n[idx], x2n[idx])
        })
        .unzip();

    let candidates = decompose_essential(e);
    let scores = candidates.map(|c| chirality_score(&c.pose, &s1, &s2));
    log::debug!("chirality scores {scores:?} on {sample_size} samples");

    let mut order = [0usize, 1, 2, 3];
    order.sort_by(|&a, &b| scores[b].cmp(&scores[a]).then(a.cmp(&b)));
    let (best, runner_up) = (scores[order[0]], scores[order[1]]);

    let min_count = config.min_chirality_fraction * sample_size as f64;
    if (best as f64) < min_count || runner_up >= best || 2 * runner_up >= sample_size {
        return Err(PoseError::Ambiguous {
            best,
            runner_up,
            sample: sample_size,
        });
    }

    let selected = candidates[order[0]];
    log::debug!("selected pose candidate {:?}", selected.kind);
    Ok(selected.pose)
}
