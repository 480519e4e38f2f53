//! 2-D discrete Fourier transforms, circular shifts and apodization
//!
//! Grids are [nalgebra] matrices indexed `(row, column)`, the row being the
//! `x` axis and the column the `y` axis of the hologram.

use nalgebra::{DMatrix, Scalar};
use rayon::prelude::*;
use rustfft::{num_complex::Complex64, FftDirection, FftPlanner};
use std::f64::consts::PI;

/// Complex valued 2-D field
pub type Field = DMatrix<Complex64>;

// Transforms every column in place; columns are contiguous in nalgebra storage.
fn transform_columns(field: &mut Field, planner: &mut FftPlanner<f64>, direction: FftDirection) {
    let n = field.nrows();
    if n == 0 {
        return;
    }
    let fft = planner.plan_fft(n, direction);
    field
        .as_mut_slice()
        .par_chunks_exact_mut(n)
        .for_each(|column| fft.process(column));
}

fn transform(field: &Field, direction: FftDirection) -> Field {
    let mut planner = FftPlanner::new();
    let mut columns = field.clone();
    transform_columns(&mut columns, &mut planner, direction);
    let mut rows = columns.transpose();
    transform_columns(&mut rows, &mut planner, direction);
    rows.transpose()
}

/// Forward 2-D FFT (unnormalized)
pub fn fft2(field: &Field) -> Field {
    transform(field, FftDirection::Forward)
}

/// Inverse 2-D FFT, normalized by the number of samples
pub fn ifft2(field: &Field) -> Field {
    let size = field.len();
    let mut inverse = transform(field, FftDirection::Inverse);
    if size > 0 {
        inverse /= Complex64::new(size as f64, 0.);
    }
    inverse
}

/// Forward 2-D FFT of a real valued grid
pub fn fft2_real(samples: &DMatrix<f64>) -> Field {
    fft2(&to_complex(samples))
}

/// Promotes a real valued grid to a complex field
pub fn to_complex(samples: &DMatrix<f64>) -> Field {
    samples.map(|x| Complex64::new(x, 0.))
}

/// Rolls the grid content `rows` pixels along the x axis and `columns` pixels along the y axis
///
/// Elements shifted beyond the last position are re-introduced at the first,
/// i.e. `rolled[(i + rows, j + columns)] = grid[(i, j)]` modulo the shape.
pub fn roll<T: Scalar>(grid: &DMatrix<T>, rows: i64, columns: i64) -> DMatrix<T> {
    let (nr, nc) = grid.shape();
    if nr == 0 || nc == 0 {
        return grid.clone();
    }
    DMatrix::from_fn(nr, nc, |i, j| {
        let si = (i as i64 - rows).rem_euclid(nr as i64) as usize;
        let sj = (j as i64 - columns).rem_euclid(nc as i64) as usize;
        grid[(si, sj)].clone()
    })
}

/// One dimensional `sqrt(cos)` taper, vanishing at the first sample
fn taper(n: usize) -> Vec<f64> {
    let half = n as f64 / 2.;
    (0..n)
        .map(|i| ((i as f64 - half) * PI / n as f64).cos().max(0.).sqrt())
        .collect()
}

/// Apodization window forcing the magnitude of a grid to zero at its boundaries
pub fn apodization_window(rows: usize, columns: usize) -> DMatrix<f64> {
    let (tx, ty) = (taper(rows), taper(columns));
    DMatrix::from_fn(rows, columns, |i, j| tx[i] * ty[j])
}

/// Apodizes a real valued grid
pub fn apodize_real(samples: &DMatrix<f64>) -> DMatrix<f64> {
    let (nr, nc) = samples.shape();
    samples.component_mul(&apodization_window(nr, nc))
}

/// Apodizes a complex field
pub fn apodize(field: &Field) -> Field {
    let (nr, nc) = field.shape();
    field.zip_map(&apodization_window(nr, nc), |z, w| z * w)
}
