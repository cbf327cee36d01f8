use recon_image::{Image, ImageError};

use super::{gaussian_kernel_1d, kernel_size_for_sigma, separable_filter, sobel_kernel_1d};

/// Blur an image using a gaussian blur filter
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `sigma` - The sigma of the gaussian kernel; the kernel covers three sigmas.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn gaussian_blur<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    sigma: f32,
) -> Result<(), ImageError> {
    let kernel = gaussian_kernel_1d(kernel_size_for_sigma(sigma), sigma);
    separable_filter(src, dst, &kernel, &kernel)
}

/// Compute the image spatial gradients with the sobel operator.
///
/// # Arguments
///
/// * `src` - The source grayscale image.
/// * `dx` - The destination image for the horizontal derivative.
/// * `dy` - The destination image for the vertical derivative.
///
/// PRECONDITION: all images must have the same shape.
pub fn spatial_gradient(
    src: &Image<f32, 1>,
    dx: &mut Image<f32, 1>,
    dy: &mut Image<f32, 1>,
) -> Result<(), ImageError> {
    let (derivative, smoothing) = sobel_kernel_1d();
    separable_filter(src, dx, &derivative, &smoothing)?;
    separable_filter(src, dy, &smoothing, &derivative)?;
    Ok(())
}
