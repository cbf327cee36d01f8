use recon_image::Image;

/// Sample a grayscale image at a sub-pixel location with bilinear interpolation.
///
/// Coordinates outside the image are clamped to the border pixels.
///
/// PRECONDITION: the image must not be empty.
pub fn bilinear_sample(image: &Image<f32, 1>, x: f32, y: f32) -> f32 {
    let max_x = (image.cols() - 1) as f32;
    let max_y = (image.rows() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(image.cols() - 1);
    let y1 = (y0 + 1).min(image.rows() - 1);

    let ax = x - x0 as f32;
    let ay = y - y0 as f32;

    let size = image.size();
    let data = image.as_slice();
    let v00 = data[size.index(y0, x0)];
    let v01 = data[size.index(y0, x1)];
    let v10 = data[size.index(y1, x0)];
    let v11 = data[size.index(y1, x1)];

    let top = v00 + (v01 - v00) * ax;
    let bottom = v10 + (v11 - v10) * ax;
    top + (bottom - top) * ay
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_image::{ImageError, ImageSize};

    #[test]
    fn test_bilinear_sample() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new(
            ImageSize {
                width: 2,
                height: 2,
            },
            vec![0.0, 1.0, 2.0, 3.0],
        )?;
        approx::assert_relative_eq!(bilinear_sample(&image, 0.5, 0.5), 1.5);
        approx::assert_relative_eq!(bilinear_sample(&image, 1.0, 0.0), 1.0);
        approx::assert_relative_eq!(bilinear_sample(&image, -4.0, 9.0), 2.0);
        Ok(())
    }
}
