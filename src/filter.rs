//! Separable Gaussian smoothing with mirror-reflected boundaries

use nalgebra::DMatrix;
use rayon::prelude::*;

/// Kernel half-width in units of the standard deviation
pub const TRUNCATE: f64 = 4.;

/// Normalized 1-D Gaussian kernel and its radius
fn gaussian_kernel(sigma: f64) -> (Vec<f64>, usize) {
    let radius = (TRUNCATE * sigma + 0.5) as usize;
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let x = k as f64 - radius as f64;
            (-0.5 * x * x / (sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    (weights.into_iter().map(|w| w / total).collect(), radius)
}

/// Maps any index onto `[0, n)` by reflecting about the grid edges (`d c b a | a b c d | d c b a`)
fn reflect(index: i64, n: usize) -> usize {
    let n = n as i64;
    let period = index.rem_euclid(2 * n);
    (if period < n { period } else { 2 * n - 1 - period }) as usize
}

fn smooth_columns(image: &DMatrix<f64>, kernel: &[f64], radius: usize) -> DMatrix<f64> {
    let n = image.nrows();
    let mut smoothed = DMatrix::zeros(n, image.ncols());
    if n == 0 {
        return smoothed;
    }
    smoothed
        .as_mut_slice()
        .par_chunks_exact_mut(n)
        .zip(image.as_slice().par_chunks_exact(n))
        .for_each(|(target, source)| {
            target.iter_mut().enumerate().for_each(|(i, value)| {
                *value = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * source[reflect(i as i64 + k as i64 - radius as i64, n)])
                    .sum();
            })
        });
    smoothed
}

/// Gaussian filter of standard deviation `sigma` pixels along both axes
///
/// The kernel is truncated at [TRUNCATE] standard deviations and samples
/// beyond the edges are mirror-reflected, so a constant image is left
/// unchanged whatever its size relative to the kernel.
pub fn gaussian_filter(image: &DMatrix<f64>, sigma: f64) -> DMatrix<f64> {
    if sigma <= 0. || image.is_empty() {
        return image.clone();
    }
    let (kernel, radius) = gaussian_kernel(sigma);
    let along_x = smooth_columns(image, &kernel, radius);
    smooth_columns(&along_x.transpose(), &kernel, radius).transpose()
}
