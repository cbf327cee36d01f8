use recon_image::{Image, ImageError, ImageSize};

use crate::filter::gaussian_blur;
use crate::interpolation::bilinear_sample;

/// Resize a grayscale image to the size of `dst` with bilinear interpolation.
///
/// Pixel centers are aligned, so the mapping between both images is a pure scale
/// around the pixel center convention `x_src = (x_dst + 0.5) * sx - 0.5`.
pub fn resize_bilinear(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.is_empty() {
        return Err(ImageError::EmptyImage(src.cols(), src.rows()));
    }

    let sx = src.cols() as f32 / dst.cols() as f32;
    let sy = src.rows() as f32 / dst.rows() as f32;
    let cols = dst.cols();

    dst.as_slice_mut()
        .iter_mut()
        .enumerate()
        .for_each(|(idx, pixel)| {
            let (r, c) = (idx / cols, idx % cols);
            let x = (c as f32 + 0.5) * sx - 0.5;
            let y = (r as f32 + 0.5) * sy - 0.5;
            *pixel = bilinear_sample(src, x, y);
        });

    Ok(())
}

/// Rescale a grayscale image by a uniform factor.
///
/// Downscaling (`factor < 1`) low-pass filters the image first to avoid aliasing.
/// All images taking part in one reconstruction must be rescaled by the same factor,
/// and the intrinsic matrix has to be scaled accordingly.
///
/// # Errors
///
/// Fails when the factor is not strictly positive and finite, or when the image or
/// the resulting image would be empty.
pub fn rescale(src: &Image<f32, 1>, factor: f32) -> Result<Image<f32, 1>, ImageError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(ImageError::InvalidScaleFactor(factor));
    }
    if src.is_empty() {
        return Err(ImageError::EmptyImage(src.cols(), src.rows()));
    }

    if (factor - 1.0).abs() < f32::EPSILON {
        return Ok(src.clone());
    }

    let new_size = ImageSize {
        width: (src.cols() as f32 * factor).round() as usize,
        height: (src.rows() as f32 * factor).round() as usize,
    };
    if new_size.area() == 0 {
        return Err(ImageError::EmptyImage(new_size.width, new_size.height));
    }

    let mut dst = Image::<f32, 1>::from_size_val(new_size, 0.0)?;

    if factor < 1.0 {
        let mut blurred = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
        let sigma = 0.5 * (1.0 / factor - 1.0).max(0.25);
        gaussian_blur(src, &mut blurred, sigma)?;
        resize_bilinear(&blurred, &mut dst)?;
    } else {
        resize_bilinear(src, &mut dst)?;
    }

    Ok(dst)
}
