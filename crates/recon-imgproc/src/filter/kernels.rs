/// Create a gaussian blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
/// * `sigma` - The sigma of the gaussian kernel.
///
/// # Returns
///
/// A normalized vector of the kernel.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let mut kernel = Vec::with_capacity(kernel_size);

    let mean = (kernel_size - 1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    // compute the kernel
    for i in 0..kernel_size {
        let x = i as f32 - mean;
        kernel.push((-(x * x) / (2.0 * sigma_sq)).exp());
    }

    // normalize the kernel
    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    kernel
}

/// Create the 3-tap sobel kernels as `(derivative, smoothing)`.
///
/// The derivative kernel is scaled so that the full 2D sobel operator returns the
/// intensity difference per pixel.
pub fn sobel_kernel_1d() -> (Vec<f32>, Vec<f32>) {
    (vec![-0.5, 0.0, 0.5], vec![0.25, 0.5, 0.25])
}

/// Odd kernel size covering three standard deviations on each side.
pub fn kernel_size_for_sigma(sigma: f32) -> usize {
    let half = (3.0 * sigma).ceil().max(1.0) as usize;
    2 * half + 1
}
