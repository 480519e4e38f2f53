use crate::unwrap::RANDOM_SEED;

/// Default laser wavelength [m]
pub const DEFAULT_WAVELENGTH: f64 = 405e-9;
/// Default (unbinned) pixel pitch [m]
pub const DEFAULT_PIXEL_PITCH: f64 = 3.45e-6;

/// Optical and sampling parameters of a hologram
#[derive(Debug, Clone, PartialEq)]
pub struct HologramConfig {
    /// laser wavelength [m]
    pub wavelength: f64,
    /// unbinned pixel pitch along x [m]
    pub dx: f64,
    /// unbinned pixel pitch along y [m]
    pub dy: f64,
    /// block-mean rebinning factor
    pub rebin_factor: usize,
    /// fraction of the rebinned hologram side kept by a centered crop
    pub crop_fraction: Option<f64>,
    /// seed of the phase unwrapping tie-breaks
    pub seed: u64,
}
impl Default for HologramConfig {
    fn default() -> Self {
        Self {
            wavelength: DEFAULT_WAVELENGTH,
            dx: DEFAULT_PIXEL_PITCH,
            dy: DEFAULT_PIXEL_PITCH,
            rebin_factor: 1,
            crop_fraction: None,
            seed: RANDOM_SEED,
        }
    }
}
impl HologramConfig {
    pub fn wavelength(self, wavelength: f64) -> Self {
        Self { wavelength, ..self }
    }
    pub fn pixel_pitch(self, dx: f64, dy: f64) -> Self {
        Self { dx, dy, ..self }
    }
    pub fn rebin_factor(self, rebin_factor: usize) -> Self {
        Self {
            rebin_factor,
            ..self
        }
    }
    pub fn crop_fraction(self, crop_fraction: f64) -> Self {
        Self {
            crop_fraction: Some(crop_fraction),
            ..self
        }
    }
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
}
