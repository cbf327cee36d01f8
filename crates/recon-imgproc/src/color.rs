use recon_image::{Image, ImageError};

/// Define the RGB weights for the grayscale conversion.
const RW: f64 = 0.299;
const GW: f64 = 0.587;
const BW: f64 = 0.114;

/// Convert an RGB image to grayscale using the formula:
///
/// Y = 0.299 * R + 0.587 * G + 0.114 * B
///
/// # Arguments
///
/// * `src` - The input RGB image.
/// * `dst` - The output grayscale image.
///
/// Precondition: the input and output images must have the same size.
///
/// # Example
///
/// ```
/// use recon_image::{Image, ImageSize};
/// use recon_imgproc::color::gray_from_rgb;
///
/// let image = Image::<f32, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0f32; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let mut gray = Image::<f32, 1>::from_size_val(image.size(), 0.0).unwrap();
///
/// gray_from_rgb(&image, &mut gray).unwrap();
/// assert_eq!(gray.size().width, 4);
/// assert_eq!(gray.size().height, 5);
/// ```
pub fn gray_from_rgb<T>(src: &Image<T, 3>, dst: &mut Image<T, 1>) -> Result<(), ImageError>
where
    T: Send + Sync + num_traits::Float,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let rw = T::from(RW).ok_or(ImageError::CastError)?;
    let gw = T::from(GW).ok_or(ImageError::CastError)?;
    let bw = T::from(BW).ok_or(ImageError::CastError)?;

    dst.as_slice_mut()
        .iter_mut()
        .zip(src.as_slice().chunks_exact(3))
        .for_each(|(dst_pixel, src_pixel)| {
            *dst_pixel = rw * src_pixel[0] + gw * src_pixel[1] + bw * src_pixel[2];
        });

    Ok(())
}

/// Convert an RGB8 image to a normalized floating point grayscale image in `[0, 1]`.
///
/// This is the usual entry point for decoded photographs before feature detection.
pub fn gray_f32_from_rgb_u8(src: &Image<u8, 3>) -> Result<Image<f32, 1>, ImageError> {
    let rgb = src.cast_and_scale::<f32>(1.0 / 255.0)?;
    let mut gray = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    gray_from_rgb(&rgb, &mut gray)?;
    Ok(gray)
}
