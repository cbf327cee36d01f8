use recon_image::{Image, ImageError};

use crate::filter::{gaussian_blur, spatial_gradient};

/// Compute the Harris corner response of a grayscale image.
///
/// The response is `det(M) - k * trace(M)^2` where `M` is the structure tensor of the
/// sobel gradients, weighted with a gaussian window of standard deviation `sigma`.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape (H, W).
/// * `k` - The Harris sensitivity parameter, usually 0.04.
/// * `sigma` - The standard deviation of the integration window.
pub fn harris_response(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    k: f32,
    sigma: f32,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let size = src.size();
    let mut dx = Image::<f32, 1>::from_size_val(size, 0.0)?;
    let mut dy = Image::<f32, 1>::from_size_val(size, 0.0)?;
    spatial_gradient(src, &mut dx, &mut dy)?;

    // pack the tensor products into a 3 channel image to blur them in one pass
    let products = dx
        .as_slice()
        .iter()
        .zip(dy.as_slice())
        .flat_map(|(&gx, &gy)| [gx * gx, gy * gy, gx * gy])
        .collect();
    let products = Image::<f32, 3>::new(size, products)?;
    let mut tensor = Image::<f32, 3>::from_size_val(size, 0.0)?;
    gaussian_blur(&products, &mut tensor, sigma)?;

    dst.as_slice_mut()
        .iter_mut()
        .zip(tensor.as_slice().chunks_exact(3))
        .for_each(|(r, m)| {
            let det = m[0] * m[1] - m[2] * m[2];
            let trace = m[0] + m[1];
            *r = det - k * trace * trace;
        });

    Ok(())
}
