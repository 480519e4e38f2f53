use crate::{filter::gaussian_filter, fourier::Field};
use itertools::iproduct;
use nalgebra::DMatrix;
use rustfft::num_complex::Complex64;

/// Fraction of the spectrum side ignored near the edges
pub const MARGIN_FACTOR: f64 = 0.1;
/// Standard deviation [px] of the smoothing applied before the peak search
pub const PEAK_SMOOTHING_WIDTH: f64 = 10.;
/// Width [px] of the spectrum border always excluded from the Fourier mask
pub const MASK_BORDER: usize = 20;

/// Locates the real-image diffraction order in the spectrum of a hologram
#[derive(Debug, Clone, Copy)]
pub struct SpectralPeakLocator {
    margin_factor: f64,
    gaussian_width: f64,
}
impl Default for SpectralPeakLocator {
    fn default() -> Self {
        Self {
            margin_factor: MARGIN_FACTOR,
            gaussian_width: PEAK_SMOOTHING_WIDTH,
        }
    }
}
impl SpectralPeakLocator {
    pub fn margin_factor(self, margin_factor: f64) -> Self {
        Self {
            margin_factor,
            ..self
        }
    }
    pub fn gaussian_width(self, gaussian_width: f64) -> Self {
        Self {
            gaussian_width,
            ..self
        }
    }
    /// Returns the `(row, column)` of the smoothed spectrum magnitude maximum
    ///
    /// A band of `margin_factor` times the number of rows is ignored on every
    /// side; when that band would swallow the whole spectrum, no band is used.
    /// An all-zero spectrum has no peak and returns the first interior pixel.
    pub fn locate(&self, spectrum: &Field) -> (usize, usize) {
        let (nr, nc) = spectrum.shape();
        let margin = match (nr as f64 * self.margin_factor) as usize {
            margin if 2 * margin < nr && 2 * margin < nc => margin,
            _ => 0,
        };
        let magnitude = DMatrix::from_fn(nr - 2 * margin, nc - 2 * margin, |i, j| {
            spectrum[(i + margin, j + margin)].norm()
        });
        let (i, j) = argmax(&gaussian_filter(&magnitude, self.gaussian_width));
        (i + margin, j + margin)
    }
}

/// First maximum in row-major order
fn argmax(image: &DMatrix<f64>) -> (usize, usize) {
    let (nr, nc) = image.shape();
    iproduct!(0..nr, 0..nc)
        .fold(((0, 0), f64::NEG_INFINITY), |best, (i, j)| {
            let value = image[(i, j)];
            if value > best.1 {
                ((i, j), value)
            } else {
                best
            }
        })
        .0
}

/// Binary mask isolating the real-image order in the spectrum of a hologram
#[derive(Debug, Clone, PartialEq)]
pub struct FourierMask(DMatrix<bool>);
impl From<DMatrix<bool>> for FourierMask {
    fn from(mask: DMatrix<bool>) -> Self {
        Self(mask)
    }
}
impl FourierMask {
    /// Disk of `radius` pixels centered on `center`, minus a [MASK_BORDER] wide frame
    pub fn disk(n: usize, center: (usize, usize), radius: f64) -> Self {
        let (cx, cy) = (center.0 as f64, center.1 as f64);
        let (border, edge) = (MASK_BORDER as f64, n as f64 - MASK_BORDER as f64);
        Self(DMatrix::from_fn(n, n, |i, j| {
            let (x, y) = (i as f64, j as f64);
            let inside = (x - cx).powi(2) + (y - cy).powi(2) < radius * radius;
            let frame = x < border || y < border || x > edge || y > edge;
            inside && !frame
        }))
    }
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }
    pub fn as_matrix(&self) -> &DMatrix<bool> {
        &self.0
    }
    /// Number of pixels passed through the mask
    pub fn area(&self) -> usize {
        self.0.iter().filter(|&&pass| pass).count()
    }
    /// Zeroes the spectrum outside the mask
    pub fn apply(&self, spectrum: &Field) -> Field {
        spectrum.zip_map(&self.0, |z, pass| if pass { z } else { Complex64::new(0., 0.) })
    }
}
