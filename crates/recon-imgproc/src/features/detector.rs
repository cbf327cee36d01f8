use rayon::prelude::*;
use recon_image::{Image, ImageError, ImageSize};

use super::{
    compute_descriptor, harris_response, intensity_centroid_angle, Feature, Keypoint,
    DESCRIPTOR_BORDER,
};
use crate::filter::gaussian_blur;
use crate::resize::resize_bilinear;

/// Configuration of the feature detector.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Maximum number of features kept per image, strongest first.
    pub max_features: usize,
    /// Number of pyramid levels.
    pub num_levels: usize,
    /// Downscale factor between two consecutive pyramid levels.
    pub scale_factor: f32,
    /// Harris sensitivity parameter.
    pub harris_k: f32,
    /// Standard deviation of the structure tensor integration window.
    pub harris_sigma: f32,
    /// Minimum response relative to the strongest response of the level.
    pub response_threshold: f32,
}

/// Error types for the feature detector.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DetectorError {
    /// A configuration value is out of range.
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(&'static str),

    /// The input image could not be processed.
    #[error(transparent)]
    Image(#[from] ImageError),
}

impl DetectorConfig {
    /// Check that the configuration values are in range.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.num_levels == 0 {
            return Err(DetectorError::InvalidConfig("num_levels must be at least 1"));
        }
        if !(self.scale_factor.is_finite() && self.scale_factor > 1.0) {
            return Err(DetectorError::InvalidConfig(
                "scale_factor must be finite and greater than 1",
            ));
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_features: 2000,
            num_levels: 3,
            scale_factor: 1.5,
            harris_k: 0.04,
            harris_sigma: 1.0,
            response_threshold: 0.01,
        }
    }
}

/// Detect oriented keypoints and compute their descriptors.
///
/// Keypoints are located at the local maxima of the Harris response on every level of
/// an image pyramid and reported in the coordinates of the input image, sorted by
/// decreasing response. An image without salient structure yields an empty vector.
///
/// # Arguments
///
/// * `src` - The grayscale input image with values in `[0, 1]`.
/// * `config` - The detector configuration.
///
/// # Errors
///
/// [`DetectorError::InvalidConfig`] for an out of range configuration, and
/// [`DetectorError::Image`] for malformed image buffers.
pub fn detect(
    src: &Image<f32, 1>,
    config: &DetectorConfig,
) -> Result<Vec<Feature>, DetectorError> {
    config.validate()?;
    if src.is_empty() {
        log::debug!("empty image, no features detected");
        return Ok(Vec::new());
    }

    let pyramid = build_pyramid(src, config)?;

    let mut features = Vec::new();
    for (octave, level) in pyramid.iter().enumerate() {
        let level_features = detect_level(src.size(), level, octave, config)?;
        log::trace!(
            "octave {octave} ({}x{}): {} features",
            level.cols(),
            level.rows(),
            level_features.len()
        );
        features.extend(level_features);
    }

    features.sort_by(|a, b| b.keypoint.response.total_cmp(&a.keypoint.response));
    features.truncate(config.max_features);

    if features.is_empty() {
        log::debug!(
            "no salient structure found in {}x{} image",
            src.cols(),
            src.rows()
        );
    } else {
        log::debug!("detected {} features", features.len());
    }

    Ok(features)
}

/// Detect features on several images in parallel.
///
/// Each image is processed by its own task and writes to its own output slot.
pub fn detect_batch(
    images: &[Image<f32, 1>],
    config: &DetectorConfig,
) -> Result<Vec<Vec<Feature>>, DetectorError> {
    images
        .par_iter()
        .map(|image| detect(image, config))
        .collect()
}

/// Build the image pyramid, finest level first.
fn build_pyramid(
    src: &Image<f32, 1>,
    config: &DetectorConfig,
) -> Result<Vec<Image<f32, 1>>, ImageError> {
    let mut pyramid = vec![src.clone()];
    let min_size = 2 * DESCRIPTOR_BORDER + 1;

    for _ in 1..config.num_levels {
        let Some(prev) = pyramid.last() else {
            break;
        };
        let new_size = ImageSize {
            width: (prev.cols() as f32 / config.scale_factor).round() as usize,
            height: (prev.rows() as f32 / config.scale_factor).round() as usize,
        };
        if new_size.width < min_size || new_size.height < min_size {
            break;
        }

        let mut blurred = Image::<f32, 1>::from_size_val(prev.size(), 0.0)?;
        gaussian_blur(prev, &mut blurred, 0.5 * config.scale_factor)?;
        let mut level = Image::<f32, 1>::from_size_val(new_size, 0.0)?;
        resize_bilinear(&blurred, &mut level)?;

        pyramid.push(level);
    }

    Ok(pyramid)
}

fn detect_level(
    base_size: ImageSize,
    level: &Image<f32, 1>,
    octave: usize,
    config: &DetectorConfig,
) -> Result<Vec<Feature>, ImageError> {
    let size = level.size();
    let scale = level_scale(base_size, size);
    if size.width <= 2 * DESCRIPTOR_BORDER || size.height <= 2 * DESCRIPTOR_BORDER {
        return Ok(Vec::new());
    }

    let mut response = Image::<f32, 1>::from_size_val(size, 0.0)?;
    harris_response(level, &mut response, config.harris_k, config.harris_sigma)?;
    let resp = response.as_slice();

    let rows = DESCRIPTOR_BORDER..size.height - DESCRIPTOR_BORDER;
    let cols = DESCRIPTOR_BORDER..size.width - DESCRIPTOR_BORDER;

    let max_response = rows
        .clone()
        .flat_map(|r| cols.clone().map(move |c| (r, c)))
        .map(|(r, c)| resp[size.index(r, c)])
        .fold(0.0f32, f32::max);
    if max_response <= 0.0 {
        return Ok(Vec::new());
    }
    let threshold = config.response_threshold * max_response;

    let corners = rows
        .into_par_iter()
        .flat_map_iter(|r| {
            let cols = cols.clone();
            cols.filter_map(move |c| {
                let value = resp[size.index(r, c)];
                if value > threshold && is_local_maximum(resp, size, r, c) {
                    Some((r, c, value))
                } else {
                    None
                }
            })
        })
        .collect::<Vec<_>>();

    let features = corners
        .into_iter()
        .map(|(r, c, value)| {
            let angle = intensity_centroid_angle(level, c, r);
            let descriptor = compute_descriptor(level, c as f32, r as f32, angle, 1.0);
            let [x, y] = to_base(c as f32, r as f32, scale);
            Feature {
                keypoint: Keypoint {
                    x,
                    y,
                    scale: (scale[0] * scale[1]).sqrt(),
                    angle,
                    response: value,
                    octave,
                },
                descriptor,
            }
        })
        .collect();

    Ok(features)
}

/// Per axis scale between the base image and a pyramid level.
///
/// Level sizes are rounded, so the scale is measured on the actual sizes rather than
/// accumulated from the nominal scale factor.
fn level_scale(base: ImageSize, level: ImageSize) -> [f32; 2] {
    [
        base.width as f32 / level.width as f32,
        base.height as f32 / level.height as f32,
    ]
}

/// Map pyramid level coordinates into the base image.
///
/// Consecutive bilinear resizes compose into a single pixel center aligned scale.
#[inline]
fn to_base(c: f32, r: f32, scale: [f32; 2]) -> [f32; 2] {
    [(c + 0.5) * scale[0] - 0.5, (r + 0.5) * scale[1] - 0.5]
}

/// Non maximum suppression on a 3x3 neighbourhood.
///
/// Ties are broken in raster order so that plateaus yield a single maximum.
fn is_local_maximum(resp: &[f32], size: ImageSize, r: usize, c: usize) -> bool {
    let value = resp[size.index(r, c)];
    for dr in -1i32..=1 {
        for dc in -1i32..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let rr = (r as i32 + dr) as usize;
            let cc = (c as i32 + dc) as usize;
            let neighbour = resp[size.index(rr, cc)];
            let before = dr < 0 || (dr == 0 && dc < 0);
            if neighbour > value || (before && neighbour == value) {
                return false;
            }
        }
    }
    true
}
