use recon_image::Image;

use super::{Descriptor, DESCRIPTOR_SIZE};
use crate::interpolation::bilinear_sample;

/// Radius in pixels of the disc used for the intensity centroid orientation.
pub const ORIENTATION_RADIUS: i32 = 15;

/// Half width in pixels of the square patch summarized by a descriptor.
pub const PATCH_HALF_WIDTH: f32 = 8.0;

/// Minimum distance of a keypoint to the image border for a full descriptor support.
///
/// The rotated patch reaches `PATCH_HALF_WIDTH * sqrt(2)` plus one pixel for the
/// central differences.
pub const DESCRIPTOR_BORDER: usize = 16;

const GRID_CELLS: usize = 4;
const CELL_SAMPLES: usize = 4;
const ORIENTATION_BINS: usize = 8;
const CLIP_VALUE: f32 = 0.2;

/// Number of elements of the coarse descriptor signature.
pub const SIGNATURE_SIZE: usize = GRID_CELLS * GRID_CELLS;

/// Compute the orientation of a keypoint with the intensity centroid method.
///
/// The angle points from the keypoint towards the centroid of the intensity
/// distribution inside a disc of radius [`ORIENTATION_RADIUS`].
pub fn intensity_centroid_angle(src: &Image<f32, 1>, x: usize, y: usize) -> f32 {
    let size = src.size();
    let data = src.as_slice();
    let radius2 = ORIENTATION_RADIUS * ORIENTATION_RADIUS;

    let mut m01 = 0f32;
    let mut m10 = 0f32;

    for dr in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        let rr = y as i32 + dr;
        if rr < 0 || rr >= size.height as i32 {
            continue;
        }
        let mut m01_tmp = 0f32;
        for dc in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dr * dr + dc * dc > radius2 {
                continue;
            }
            let cc = x as i32 + dc;
            if cc >= 0 && cc < size.width as i32 {
                let curr_pixel = data[size.index(rr as usize, cc as usize)];
                m10 += curr_pixel * dc as f32;
                m01_tmp += curr_pixel;
            }
        }
        m01 += m01_tmp * dr as f32;
    }

    m01.atan2(m10)
}

/// Compute the gradient histogram descriptor of an oriented keypoint.
///
/// A 16x16 grid of samples is laid over the patch rotated by `angle`. Each sample
/// adds its gaussian weighted gradient magnitude to one of 8 orientation bins of
/// the 4x4 cell it falls in. Orientations are measured relative to `angle`, so the
/// descriptor is invariant to in-plane rotation. The histogram is L2 normalized,
/// clipped at 0.2 and normalized again to reduce the influence of large gradients.
///
/// # Arguments
///
/// * `src` - The grayscale image the keypoint was detected on.
/// * `x`, `y` - The keypoint location in pixels.
/// * `angle` - The keypoint orientation in radians.
/// * `scale` - Size multiplier of the patch in pixels.
pub fn compute_descriptor(src: &Image<f32, 1>, x: f32, y: f32, angle: f32, scale: f32) -> Descriptor {
    let (sin_a, cos_a) = angle.sin_cos();
    let samples = GRID_CELLS * CELL_SAMPLES;
    let step = 2.0 * PATCH_HALF_WIDTH * scale / samples as f32;
    let sigma = PATCH_HALF_WIDTH * scale;
    let two_sigma2 = 2.0 * sigma * sigma;
    let half = (samples as f32 - 1.0) / 2.0;

    let mut hist = [0f32; DESCRIPTOR_SIZE];

    for v in 0..samples {
        for u in 0..samples {
            let du = (u as f32 - half) * step;
            let dv = (v as f32 - half) * step;

            // sample location in image coordinates
            let px = x + cos_a * du - sin_a * dv;
            let py = y + sin_a * du + cos_a * dv;

            let gx = bilinear_sample(src, px + 1.0, py) - bilinear_sample(src, px - 1.0, py);
            let gy = bilinear_sample(src, px, py + 1.0) - bilinear_sample(src, px, py - 1.0);

            // rotate the gradient into the patch frame
            let gu = cos_a * gx + sin_a * gy;
            let gv = -sin_a * gx + cos_a * gy;

            let weight = (-(du * du + dv * dv) / two_sigma2).exp();
            let magnitude = (gu * gu + gv * gv).sqrt() * weight;
            if magnitude <= 0.0 {
                continue;
            }

            // bins are centered on multiples of 45 degrees
            let mut theta = gv.atan2(gu);
            if theta < 0.0 {
                theta += std::f32::consts::TAU;
            }
            let bin = (theta / std::f32::consts::TAU * ORIENTATION_BINS as f32).round() as usize
                % ORIENTATION_BINS;
            let cell = (v / CELL_SAMPLES) * GRID_CELLS + u / CELL_SAMPLES;
            hist[cell * ORIENTATION_BINS + bin] += magnitude;
        }
    }

    normalize_l2(&mut hist);
    hist.iter_mut().for_each(|h| *h = h.min(CLIP_VALUE));
    normalize_l2(&mut hist);

    hist
}

/// Collapse a descriptor to the gradient energy of each of its 4x4 cells.
///
/// Used as the key of the approximate nearest neighbour index.
pub fn descriptor_signature(descriptor: &Descriptor) -> [f32; SIGNATURE_SIZE] {
    let mut signature = [0f32; SIGNATURE_SIZE];
    for (cell, bins) in signature
        .iter_mut()
        .zip(descriptor.chunks_exact(ORIENTATION_BINS))
    {
        *cell = bins.iter().sum();
    }
    signature
}

fn normalize_l2(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        values.iter_mut().for_each(|v| *v /= norm);
    }
}
