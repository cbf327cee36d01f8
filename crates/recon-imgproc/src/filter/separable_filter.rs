use rayon::prelude::*;
use recon_image::{Image, ImageError};

/// Apply a separable filter to an image.
///
/// The horizontal kernel is applied first into a temporary buffer, then the vertical
/// kernel into `dst`. Samples outside the image are clamped to the border.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn separable_filter<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let (rows, cols) = (src.rows(), src.cols());
    if rows == 0 || cols == 0 {
        return Ok(());
    }

    let half_x = (kernel_x.len() / 2) as isize;
    let half_y = (kernel_y.len() / 2) as isize;
    let src_data = src.as_slice();
    let mut temp = vec![0.0f32; src_data.len()];

    // horizontal pass, one row per task
    temp.par_chunks_exact_mut(cols * C)
        .enumerate()
        .for_each(|(r, row_temp)| {
            let row_offset = r * cols * C;
            for c in 0..cols {
                let mut acc = [0.0f32; C];
                for (i, &k) in kernel_x.iter().enumerate() {
                    let x = (c as isize + i as isize - half_x).clamp(0, cols as isize - 1);
                    let idx = row_offset + x as usize * C;
                    for (ch, acc_val) in acc.iter_mut().enumerate() {
                        *acc_val += src_data[idx + ch] * k;
                    }
                }
                row_temp[c * C..(c + 1) * C].copy_from_slice(&acc);
            }
        });

    // vertical pass
    dst.as_slice_mut()
        .par_chunks_exact_mut(cols * C)
        .enumerate()
        .for_each(|(r, row_dst)| {
            for c in 0..cols {
                let mut acc = [0.0f32; C];
                for (i, &k) in kernel_y.iter().enumerate() {
                    let y = (r as isize + i as isize - half_y).clamp(0, rows as isize - 1);
                    let idx = y as usize * cols * C + c * C;
                    for (ch, acc_val) in acc.iter_mut().enumerate() {
                        *acc_val += temp[idx + ch] * k;
                    }
                }
                row_dst[c * C..(c + 1) * C].copy_from_slice(&acc);
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_image::ImageSize;

    #[test]
    fn test_separable_filter_identity() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 2,
        };
        let src = Image::<f32, 1>::new(size, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        separable_filter(&src, &mut dst, &[1.0], &[1.0])?;
        assert_eq!(dst.as_slice(), src.as_slice());
        Ok(())
    }

    #[test]
    fn test_separable_filter_box() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 1,
        };
        let src = Image::<f32, 1>::new(size, vec![0.0, 3.0, 0.0])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        let k = [1.0 / 3.0; 3];
        separable_filter(&src, &mut dst, &k, &[1.0])?;
        approx::assert_relative_eq!(dst.as_slice()[0], 1.0, epsilon = 1e-6);
        approx::assert_relative_eq!(dst.as_slice()[1], 1.0, epsilon = 1e-6);
        approx::assert_relative_eq!(dst.as_slice()[2], 1.0, epsilon = 1e-6);
        Ok(())
    }
}
