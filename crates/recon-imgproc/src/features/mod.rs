//! Feature detection and descriptor matching.
//!
//! This module provides the two leaf stages of the reconstruction pipeline:
//!
//! - a multi-scale Harris corner detector producing oriented keypoints with
//!   128-D gradient histogram descriptors ([`detect`], [`detect_batch`]);
//! - a nearest-neighbour matcher with Lowe's ratio test, either exhaustive or
//!   backed by a k-d tree index ([`match_descriptors`]).

mod descriptor;
pub use descriptor::*;

mod detector;
pub use detector::*;

mod harris;
pub use harris::*;

mod matching;
pub use matching::*;

/// Number of elements of a feature descriptor (4x4 cells times 8 orientation bins).
pub const DESCRIPTOR_SIZE: usize = 128;

/// Fixed-length descriptor summarizing the local appearance around a keypoint.
pub type Descriptor = [f32; DESCRIPTOR_SIZE];

/// A salient image location.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keypoint {
    /// Horizontal pixel coordinate in the detection image.
    pub x: f32,
    /// Vertical pixel coordinate in the detection image.
    pub y: f32,
    /// Scale of the pyramid level the keypoint was found on (1.0 for the base level).
    pub scale: f32,
    /// Dominant orientation in radians.
    pub angle: f32,
    /// Corner response.
    pub response: f32,
    /// Pyramid level index.
    pub octave: usize,
}

impl Keypoint {
    /// Pixel coordinates as a `[x, y]` pair in double precision.
    pub fn coords(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }
}

/// A keypoint together with its descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    /// The keypoint.
    pub keypoint: Keypoint,
    /// The descriptor computed around the keypoint.
    pub descriptor: Descriptor,
}

/// Split a feature list into keypoints and descriptors.
pub fn unzip_features(features: &[Feature]) -> (Vec<Keypoint>, Vec<Descriptor>) {
    features.iter().map(|f| (f.keypoint, f.descriptor)).unzip()
}
