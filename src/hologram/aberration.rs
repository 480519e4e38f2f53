//! Digital phase mask fitting
//!
//! The phase of the back-propagated wave is unwrapped, smoothed and fitted
//! with a second order polynomial surface (numerical parametric lens, Colomb
//! et al., Appl. Opt. 45, 851, 2006). The conjugate of that surface cancels the
//! tilt and the curvature of the reference wavefront.

use super::{HologramError, Result};
use crate::{
    filter::gaussian_filter,
    fourier::{ifft2, roll, Field},
    unwrap::{doubled_phase, unwrap_phase},
};
use nalgebra::{DMatrix, Matrix6, Vector6};
use rustfft::num_complex::Complex64;

/// Standard deviation [px] of the smoothing applied to the unwrapped phase
pub const PHASE_SMOOTHING_WIDTH: f64 = 50.;
/// Singular values below this fraction of the largest one make the fit singular
const RCOND: f64 = 1e-12;

/// Complex correction field multiplied with the hologram before reconstruction
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalPhaseMask(Field);
impl From<Field> for DigitalPhaseMask {
    fn from(field: Field) -> Self {
        Self(field)
    }
}
impl DigitalPhaseMask {
    pub fn new(field: Field) -> Self {
        Self(field)
    }
    /// Mask leaving the hologram untouched
    pub fn neutral(n: usize) -> Self {
        Self(Field::from_element(n, n, Complex64::new(1., 0.)))
    }
    pub fn field(&self) -> &Field {
        &self.0
    }
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }
    pub fn into_inner(self) -> Field {
        self.0
    }
    /// Multiplies the real valued `samples` with the mask
    pub fn apply(&self, samples: &DMatrix<f64>) -> Field {
        self.0.zip_map(samples, |z, x| z * x)
    }
}

/// Least-squares fit of `c0 + c1·u + c2·v + c3·u² + c4·u·v + c5·v²`
///
/// `u` and `v` are the row and column offsets from the grid center, in units
/// of half the largest grid side.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialSurface {
    coefficients: Vector6<f64>,
}
impl PolynomialSurface {
    fn normalized_coordinates(shape: (usize, usize)) -> impl Fn(usize, usize) -> (f64, f64) {
        let (nr, nc) = shape;
        let scale = (nr.max(nc) as f64 / 2.).max(1.);
        let (cr, cc) = (nr as f64 / 2., nc as f64 / 2.);
        move |i, j| ((i as f64 - cr) / scale, (j as f64 - cc) / scale)
    }
    fn basis(u: f64, v: f64) -> Vector6<f64> {
        Vector6::new(1., u, v, u * u, u * v, v * v)
    }
    /// Fits the surface to every sample of `surface`
    pub fn fit(surface: &DMatrix<f64>) -> Result<Self> {
        let coordinates = Self::normalized_coordinates(surface.shape());
        let mut normal = Matrix6::<f64>::zeros();
        let mut moment = Vector6::<f64>::zeros();
        for j in 0..surface.ncols() {
            for i in 0..surface.nrows() {
                let (u, v) = coordinates(i, j);
                let b = Self::basis(u, v);
                normal += b * b.transpose();
                moment += b * surface[(i, j)];
            }
        }
        let svd = normal.svd(true, true);
        let (s_max, s_min) = (svd.singular_values.max(), svd.singular_values.min());
        if !(s_min > s_max * RCOND) {
            return Err(HologramError::SingularFit);
        }
        let coefficients = svd
            .solve(&moment, s_max * RCOND)
            .map_err(|_| HologramError::SingularFit)?;
        Ok(Self { coefficients })
    }
    pub fn coefficients(&self) -> &Vector6<f64> {
        &self.coefficients
    }
    /// Evaluates the surface on a grid of the given shape
    pub fn evaluate(&self, shape: (usize, usize)) -> DMatrix<f64> {
        let coordinates = Self::normalized_coordinates(shape);
        DMatrix::from_fn(shape.0, shape.1, |i, j| {
            let (u, v) = coordinates(i, j);
            Self::basis(u, v).dot(&self.coefficients)
        })
    }
}

/// Derives the [DigitalPhaseMask] from a back-propagated spectrum
#[derive(Debug, Clone, Copy)]
pub struct AberrationCorrector {
    wavenumber: f64,
    seed: u64,
    smoothing_width: f64,
}
impl AberrationCorrector {
    pub fn new(wavenumber: f64, seed: u64) -> Self {
        Self {
            wavenumber,
            seed,
            smoothing_width: PHASE_SMOOTHING_WIDTH,
        }
    }
    pub fn smoothing_width(self, smoothing_width: f64) -> Self {
        Self {
            smoothing_width,
            ..self
        }
    }
    /// Optical path surface [m] of the centered inverse transform of `psi`
    pub fn optical_path(&self, psi: &Field) -> DMatrix<f64> {
        let (nr, nc) = psi.shape();
        let wave = roll(&ifft2(psi), (nr / 2) as i64, (nc / 2) as i64);
        let unwrapped = unwrap_phase(&wave.map(doubled_phase), self.seed);
        let path = unwrapped / (2. * self.wavenumber);
        gaussian_filter(&path, self.smoothing_width)
    }
    /// Computes `exp(-i k fit)`, `fit` being the polynomial surface fitted to the optical path
    pub fn digital_phase_mask(&self, psi: &Field) -> Result<DigitalPhaseMask> {
        let path = self.optical_path(psi);
        let surface = PolynomialSurface::fit(&path)?;
        log::debug!("phase mask coefficients: {:?}", surface.coefficients().as_slice());
        let k = self.wavenumber;
        Ok(DigitalPhaseMask(
            surface
                .evaluate(psi.shape())
                .map(|z| Complex64::from_polar(1., -k * z)),
        ))
    }
}
