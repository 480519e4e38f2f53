use crate::fourier::Field;
use rustfft::num_complex::Complex64;
use std::{
    f64::consts::PI,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Transfer function of the free-space propagation (convolution approach)
///
/// See Eq. 3.22 of Schnars & Jüptner (2002), Meas. Sci. Technol. 13, R85.
#[derive(Debug)]
pub struct FourierPropagator {
    n: usize,
    wavelength: f64,
    dx: f64,
    dy: f64,
    evaluations: AtomicUsize,
}
impl FourierPropagator {
    pub fn new(n: usize, wavelength: f64, dx: f64, dy: f64) -> Self {
        Self {
            n,
            wavelength,
            dx,
            dy,
            evaluations: AtomicUsize::new(0),
        }
    }
    pub fn wavenumber(&self) -> f64 {
        2. * PI / self.wavelength
    }
    /// Number of transfer functions computed so far
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }
    /// Squared normalized spatial frequencies along one axis, quadratic phase centered
    fn frequency_terms(&self, pitch: f64, distance: f64) -> Vec<f64> {
        let n = self.n as f64;
        let half = n / 2.;
        let extent = n * n * pitch * pitch;
        let phi = extent / (2. * distance * self.wavelength);
        (0..self.n)
            .map(|i| {
                let x = i as f64 - half;
                self.wavelength * self.wavelength * (x + phi).powi(2) / extent
            })
            .collect()
    }
    /// Fourier transform of the impulse response `G` for a propagation `distance` [m]
    ///
    /// `G = exp(-i k d sqrt(1 - λ²(x+φx)²/(n²dx²) - λ²(y+φy)²/(n²dy²)))` with
    /// `φx = n²dx²/(2dλ)`. Frequencies for which the square root argument is
    /// negative do not propagate and are set to 0.
    /// A zero distance makes `φ` diverge: every frequency is blocked.
    pub fn transfer_function(&self, distance: f64) -> Field {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let k = self.wavenumber();
        let fx = self.frequency_terms(self.dx, distance);
        let fy = self.frequency_terms(self.dy, distance);
        Field::from_fn(self.n, self.n, |i, j| {
            let argument = 1. - fx[i] - fy[j];
            if argument >= 0. {
                Complex64::from_polar(1., -k * distance * argument.sqrt())
            } else {
                Complex64::new(0., 0.)
            }
        })
    }
}
