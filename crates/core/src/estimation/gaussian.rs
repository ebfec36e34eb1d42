use ndarray::Array2;

/// Precompute a 1D Gaussian kernel of the given size.
///
/// `kernel_size` must be odd and >= 1. Sigma is derived as `kernel_size / 6.0`
/// (matching OpenCV's sigma=0 convention).
pub fn gaussian_kernel_1d(kernel_size: usize) -> Vec<f32> {
    debug_assert!(kernel_size >= 1 && kernel_size % 2 == 1);
    let sigma = kernel_size as f64 / 6.0;
    let half = (kernel_size / 2) as f64;
    let mut kernel_f64: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel_f64.iter().sum();
    for v in &mut kernel_f64 {
        *v /= sum;
    }
    kernel_f64.iter().map(|&v| v as f32).collect()
}

/// Separable Gaussian blur of a single-channel 8-bit plane, clamping at the
/// borders. Even kernel sizes are bumped to the next odd size.
pub fn blur_plane(plane: &Array2<u8>, kernel_size: usize) -> Array2<u8> {
    let (height, width) = plane.dim();
    if kernel_size <= 1 || width == 0 || height == 0 {
        return plane.clone();
    }
    let kernel = gaussian_kernel_1d(kernel_size | 1);
    let half = (kernel.len() / 2) as isize;

    // Horizontal pass
    let mut temp = Array2::<f32>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0f32;
            for (k, &w) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, width as isize - 1) as usize;
                sum += plane[[y, sx]] as f32 * w;
            }
            temp[[y, x]] = sum;
        }
    }

    // Vertical pass
    let mut out = Array2::<u8>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0f32;
            for (k, &w) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - half).clamp(0, height as isize - 1) as usize;
                sum += temp[[sy, x]] * w;
            }
            out[[y, x]] = sum.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
