//! Hologram reconstruction
//!
//! A [Hologram] holds the real valued, square samples of a recorded hologram
//! and reconstructs the complex wavefield at any propagation distance with the
//! convolution method:
//!  1. the hologram is apodized and Fourier transformed,
//!  2. the real-image order is located ([SpectralPeakLocator]) and isolated
//!     with a [FourierMask],
//!  3. the first reconstruction derives a [DigitalPhaseMask] from the
//!     back-propagated order ([AberrationCorrector]) and keeps it,
//!  4. the masked hologram spectrum, centered on the real-image order, is
//!     multiplied with the [FourierPropagator] transfer function and inverse
//!     transformed.

use crate::{
    fourier::{apodize, apodize_real, fft2, fft2_real, ifft2, roll, Field},
    wave::{ReconstructedWave, WaveCube},
};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

mod aberration;
mod config;
mod peak;
mod propagator;
pub use aberration::{
    AberrationCorrector, DigitalPhaseMask, PolynomialSurface, PHASE_SMOOTHING_WIDTH,
};
pub use config::{HologramConfig, DEFAULT_PIXEL_PITCH, DEFAULT_WAVELENGTH};
pub use peak::{FourierMask, SpectralPeakLocator, MARGIN_FACTOR, MASK_BORDER, PEAK_SMOOTHING_WIDTH};
pub use propagator::FourierPropagator;

/// Radius [px] of the real-image mask for a full resolution hologram
pub const MASK_RADIUS: f64 = 150.;

#[derive(Debug, thiserror::Error)]
pub enum HologramError {
    #[error("rebin factor {factor} does not divide the hologram shape {shape:?}")]
    Rebin { factor: usize, shape: (usize, usize) },
    #[error("crop fraction must belong to (0,1], found {0}")]
    CropFraction(f64),
    #[error("hologram must be square, found {0}x{1} pixels")]
    NotSquare(usize, usize),
    #[error("hologram has no samples")]
    Empty,
    #[error("the digital phase mask polynomial fit is singular")]
    SingularFit,
    #[error("digital phase mask shape {found:?} does not match the hologram shape {expected:?}")]
    MaskShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("reconstruction cancelled after {0} distance(s)")]
    Cancelled(usize),
    #[error("failed to read the hologram file")]
    Io(#[from] std::io::Error),
    #[error("failed to decode the hologram image")]
    Image(#[from] image::ImageError),
    #[error("expected a 2D array, found shape {0:?}")]
    NpyShape(Vec<u64>),
}
pub type Result<T> = std::result::Result<T, HologramError>;

/// Hologram side lengths for which the FFTs are the most efficient
fn is_power_of_two(side: usize) -> bool {
    side.is_power_of_two() && side <= 1 << 12
}

/// Block-mean rebinning
pub fn rebin(samples: &DMatrix<f64>, factor: usize) -> Result<DMatrix<f64>> {
    let (nr, nc) = samples.shape();
    if factor == 0 || nr % factor != 0 || nc % factor != 0 {
        return Err(HologramError::Rebin {
            factor,
            shape: (nr, nc),
        });
    }
    if factor == 1 {
        return Ok(samples.clone());
    }
    let area = (factor * factor) as f64;
    Ok(DMatrix::from_fn(nr / factor, nc / factor, |i, j| {
        samples.view((i * factor, j * factor), (factor, factor)).sum() / area
    }))
}

/// Centered square crop of side `floor(rows·fraction)`
pub fn crop(samples: &DMatrix<f64>, fraction: f64) -> Result<DMatrix<f64>> {
    if !(fraction > 0. && fraction <= 1.) {
        return Err(HologramError::CropFraction(fraction));
    }
    let (nr, nc) = samples.shape();
    let side = (nr as f64 * fraction) as usize;
    if side == 0 {
        return Err(HologramError::Empty);
    }
    if side > nc {
        return Err(HologramError::NotSquare(nr, nc));
    }
    if !is_power_of_two(side) {
        log::warn!(
            "crop fraction {} yields a {}x{} hologram, FFTs are faster for powers of 2",
            fraction,
            side,
            side
        );
    }
    Ok(samples
        .view(((nr - side) / 2, (nc - side) / 2), (side, side))
        .into_owned())
}

/// Hashable reconstruction parameters `(distance, wavelength, dx, dy)`
///
/// The `f64` bit patterns are used as is, except for `-0` that is mapped to `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReconstructionKey([u64; 4]);
impl ReconstructionKey {
    pub fn new(distance: f64, wavelength: f64, dx: f64, dy: f64) -> Self {
        let canonical = |x: f64| if x == 0. { 0 } else { x.to_bits() };
        Self([
            canonical(distance),
            canonical(wavelength),
            canonical(dx),
            canonical(dy),
        ])
    }
}

/// Apodized hologram with its spectrum and the isolated real-image order
struct SpectralOrder {
    apodized: DMatrix<f64>,
    spectrum: Field,
    peak: (usize, usize),
    mask: FourierMask,
}
impl SpectralOrder {
    /// Roll bringing the spectral peak to the center of the spectrum
    fn centering_shift(&self) -> (i64, i64) {
        let half = self.apodized.nrows() as f64 / 2.;
        (
            (half - self.peak.0 as f64) as i64,
            (half - self.peak.1 as f64) as i64,
        )
    }
    /// Masked spectrum with the real-image order at the center
    fn centred_spectrum(&self) -> Field {
        let (sx, sy) = self.centering_shift();
        roll(&self.mask.apply(&self.spectrum), sx, sy)
    }
    /// Reconstructed wave for the given transfer function and phase mask
    fn back_propagate(&self, transfer: &Field, phase_mask: &DigitalPhaseMask) -> Field {
        let (sx, sy) = self.centering_shift();
        let corrected = fft2(&phase_mask.apply(&self.apodized));
        let psi = roll(&self.mask.apply(&corrected), sx, sy).component_mul(transfer);
        let half = (self.apodized.nrows() / 2) as i64;
        roll(&ifft2(&psi), half, half)
    }
}

/// Stores the phase mask derived from the first back-propagation, unless one already exists
fn establish_phase_mask<'a>(
    stored: &'a mut Option<DigitalPhaseMask>,
    corrector: AberrationCorrector,
    order: &SpectralOrder,
    transfer: &Field,
) -> Result<&'a DigitalPhaseMask> {
    let mask = match stored.take() {
        Some(mask) => mask,
        None => {
            let now = Instant::now();
            let psi = apodize(&order.centred_spectrum().component_mul(transfer));
            let mask = corrector.digital_phase_mask(&psi)?;
            log::info!(
                "digital phase mask fitted in {:.3}s",
                now.elapsed().as_secs_f64()
            );
            mask
        }
    };
    Ok(stored.insert(mask))
}

/// Recorded hologram and its reconstructions
#[derive(Debug)]
pub struct Hologram {
    samples: DMatrix<f64>,
    n: usize,
    wavelength: f64,
    dx: f64,
    dy: f64,
    rebin_factor: usize,
    crop_fraction: Option<f64>,
    seed: u64,
    propagator: FourierPropagator,
    digital_phase_mask: Option<DigitalPhaseMask>,
    reconstructions: HashMap<ReconstructionKey, ReconstructedWave>,
}
impl Hologram {
    /// Creates a hologram from raw samples, rebinned then cropped according to `config`
    ///
    /// The pixel pitch of the hologram is the configuration pitch times the rebin factor.
    pub fn new(samples: DMatrix<f64>, config: HologramConfig) -> Result<Self> {
        if samples.is_empty() {
            return Err(HologramError::Empty);
        }
        let binned = rebin(&samples, config.rebin_factor)?;
        let samples = match config.crop_fraction {
            Some(fraction) => crop(&binned, fraction)?,
            None => binned,
        };
        let (nr, nc) = samples.shape();
        if nr != nc {
            return Err(HologramError::NotSquare(nr, nc));
        }
        let scale = config.rebin_factor as f64;
        let (dx, dy) = (config.dx * scale, config.dy * scale);
        log::info!(
            "hologram: {}x{} pixels, λ={:e}m, pitch=({:e}m,{:e}m)",
            nr,
            nc,
            config.wavelength,
            dx,
            dy
        );
        Ok(Self {
            samples,
            n: nr,
            wavelength: config.wavelength,
            dx,
            dy,
            rebin_factor: config.rebin_factor,
            crop_fraction: config.crop_fraction,
            seed: config.seed,
            propagator: FourierPropagator::new(nr, config.wavelength, dx, dy),
            digital_phase_mask: None,
            reconstructions: HashMap::new(),
        })
    }
    /// Loads a 2D `f64` array from a `.npy` file
    pub fn from_npy<P: AsRef<Path>>(path: P, config: HologramConfig) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?}...", path);
        let npy = npyz::NpyFile::new(BufReader::new(File::open(path)?))?;
        let shape = npy.shape().to_vec();
        let order = npy.order();
        let (nr, nc) = match shape[..] {
            [nr, nc] => (nr as usize, nc as usize),
            _ => return Err(HologramError::NpyShape(shape)),
        };
        let data = npy.into_vec::<f64>()?;
        let samples = match order {
            npyz::Order::C => DMatrix::from_row_slice(nr, nc, &data),
            npyz::Order::Fortran => DMatrix::from_column_slice(nr, nc, &data),
        };
        Self::new(samples, config)
    }
    /// Loads a grayscale image (TIFF, PNG), color images are converted to luminance
    ///
    /// Samples keep the pixel values of the image: 8-bit images yield values in
    /// `[0, 255]`, deeper images are read as 16-bit values.
    pub fn from_image<P: AsRef<Path>>(path: P, config: HologramConfig) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading {:?}...", path);
        let image = image::open(path)?;
        let color = image.color();
        let samples = if color.bytes_per_pixel() / color.channel_count() == 1 {
            let luma = image.into_luma8();
            let (width, height) = luma.dimensions();
            DMatrix::from_fn(height as usize, width as usize, |i, j| {
                luma.get_pixel(j as u32, i as u32)[0] as f64
            })
        } else {
            let luma = image.into_luma16();
            let (width, height) = luma.dimensions();
            DMatrix::from_fn(height as usize, width as usize, |i, j| {
                luma.get_pixel(j as u32, i as u32)[0] as f64
            })
        };
        Self::new(samples, config)
    }
    /// Side length of the square hologram
    pub fn n(&self) -> usize {
        self.n
    }
    pub fn samples(&self) -> &DMatrix<f64> {
        &self.samples
    }
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }
    pub fn wavenumber(&self) -> f64 {
        self.propagator.wavenumber()
    }
    /// Pixel pitch `(dx, dy)` of the rebinned hologram
    pub fn pixel_pitch(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }
    pub fn propagator(&self) -> &FourierPropagator {
        &self.propagator
    }
    pub fn digital_phase_mask(&self) -> Option<&DigitalPhaseMask> {
        self.digital_phase_mask.as_ref()
    }
    /// Forgets the digital phase mask, the next reconstruction fits a new one
    pub fn reset_aberration_correction(&mut self) {
        self.digital_phase_mask = None;
    }
    /// Number of cached reconstructions
    pub fn cache_len(&self) -> usize {
        self.reconstructions.len()
    }
    pub fn clear_cache(&mut self) {
        self.reconstructions.clear();
    }
    /// Radius [px] of the real-image mask
    ///
    /// 150 pixels scaled down by the rebin factor, or by `|log2(crop fraction)|` for cropped holograms.
    pub fn mask_radius(&self) -> f64 {
        match (self.rebin_factor, self.crop_fraction) {
            (factor, _) if factor != 1 => MASK_RADIUS / factor as f64,
            (_, Some(fraction)) => MASK_RADIUS / fraction.log2().abs(),
            _ => MASK_RADIUS,
        }
    }
    /// Apodized hologram
    pub fn apodized(&self) -> DMatrix<f64> {
        apodize_real(&self.samples)
    }
    /// Position `(row, column)` of the real-image order in the hologram `spectrum`
    pub fn fourier_peak_centroid(&self, spectrum: &Field) -> (usize, usize) {
        SpectralPeakLocator::default().locate(spectrum)
    }
    /// Mask isolating the real-image order centered on `center`
    pub fn real_image_mask(&self, center: (usize, usize), radius: f64) -> FourierMask {
        FourierMask::disk(self.n, center, radius)
    }
    fn spectral_order(&self) -> SpectralOrder {
        let apodized = self.apodized();
        let spectrum = fft2_real(&apodized);
        let peak = self.fourier_peak_centroid(&spectrum);
        let mask = self.real_image_mask(peak, self.mask_radius());
        log::debug!("real-image order at {:?}, mask area: {}px", peak, mask.area());
        SpectralOrder {
            apodized,
            spectrum,
            peak,
            mask,
        }
    }
    fn aberration_corrector(&self) -> AberrationCorrector {
        AberrationCorrector::new(self.wavenumber(), self.seed)
    }
    fn check_mask(&self, mask: &DigitalPhaseMask) -> Result<()> {
        if mask.shape() != (self.n, self.n) {
            return Err(HologramError::MaskShape {
                expected: (self.n, self.n),
                found: mask.shape(),
            });
        }
        Ok(())
    }
    /// Reconstructs the wave at the propagation `distance` [m]
    ///
    /// A supplied `digital_phase_mask` replaces the stored one, otherwise the
    /// stored mask is used or, if there is none yet, fitted and stored.
    /// With `cache`, a reconstruction with the same distance, wavelength and
    /// pixel pitch is returned from the cache without being recomputed and new
    /// reconstructions are added to the cache.
    pub fn reconstruct(
        &mut self,
        distance: f64,
        cache: bool,
        digital_phase_mask: Option<DigitalPhaseMask>,
    ) -> Result<ReconstructedWave> {
        if let Some(mask) = digital_phase_mask {
            self.check_mask(&mask)?;
            self.digital_phase_mask = Some(mask);
        }
        let key = ReconstructionKey::new(distance, self.wavelength, self.dx, self.dy);
        if cache {
            if let Some(wave) = self.reconstructions.get(&key) {
                log::debug!("reconstruction at {:e}m found in cache", distance);
                return Ok(wave.clone());
            }
        }
        let order = self.spectral_order();
        let transfer = self.propagator.transfer_function(distance);
        let corrector = self.aberration_corrector();
        let phase_mask =
            establish_phase_mask(&mut self.digital_phase_mask, corrector, &order, &transfer)?;
        let wave =
            ReconstructedWave::new(order.back_propagate(&transfer, phase_mask)).with_seed(self.seed);
        if cache {
            self.reconstructions.insert(key, wave.clone());
        }
        Ok(wave)
    }
    /// Reconstructs the waves at every distance in turn
    ///
    /// The `cancel` flag is checked before each distance, raising it aborts
    /// the reconstruction with [HologramError::Cancelled].
    pub fn reconstruct_stack(
        &mut self,
        distances: &[f64],
        cancel: Option<&AtomicBool>,
    ) -> Result<WaveCube> {
        let now = Instant::now();
        let mut cube = WaveCube::default();
        for (i, &distance) in distances.iter().enumerate() {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                log::info!("reconstruction cancelled after {} distance(s)", i);
                return Err(HologramError::Cancelled(i));
            }
            cube.push(self.reconstruct(distance, false, None)?.into_field());
        }
        log::info!(
            "{} planes reconstructed in {:.3}s",
            cube.len(),
            now.elapsed().as_secs_f64()
        );
        Ok(cube)
    }
    /// Reconstructs the waves at every distance in parallel
    ///
    /// The digital phase mask is established first, from the first distance
    /// if none is stored. The cache is neither read nor written.
    pub fn par_reconstruct_stack(&mut self, distances: &[f64]) -> Result<WaveCube> {
        let Some(&first) = distances.first() else {
            return Ok(WaveCube::default());
        };
        let now = Instant::now();
        let order = self.spectral_order();
        let corrector = self.aberration_corrector();
        let transfer = self.propagator.transfer_function(first);
        let phase_mask =
            establish_phase_mask(&mut self.digital_phase_mask, corrector, &order, &transfer)?;
        let propagator = &self.propagator;
        let first_plane = order.back_propagate(&transfer, phase_mask);
        let others: Vec<Field> = distances[1..]
            .par_iter()
            .map(|&distance| order.back_propagate(&propagator.transfer_function(distance), phase_mask))
            .collect();
        let cube: WaveCube = std::iter::once(first_plane).chain(others).collect();
        log::info!(
            "{} planes reconstructed in {:.3}s",
            cube.len(),
            now.elapsed().as_secs_f64()
        );
        Ok(cube)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Interference of an on-axis and an off-axis plane wave, fringes of frequency `(fx, fy)` cycles per side
    pub fn off_axis_hologram(n: usize, fx: f64, fy: f64) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| {
            2. + 2. * (2. * PI * (fx * i as f64 + fy * j as f64) / n as f64).cos()
        })
    }

    fn hologram(n: usize) -> Hologram {
        Hologram::new(off_axis_hologram(n, 12., 18.), HologramConfig::default()).unwrap()
    }

    #[test]
    fn peak_of_an_off_axis_hologram() {
        let h = Hologram::new(off_axis_hologram(128, 30., 40.), HologramConfig::default()).unwrap();
        let spectrum = fft2_real(&h.apodized());
        let (i, j) = h.fourier_peak_centroid(&spectrum);
        let near = |(pi, pj): (usize, usize)| i.abs_diff(pi) <= 1 && j.abs_diff(pj) <= 1;
        assert!(near((30, 40)) || near((98, 88)), "peak at ({i},{j})");
    }

    #[test]
    fn reconstruction_shapes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut h = hologram(64);
        let wave = h.reconstruct(0.01, false, None)?;
        assert_eq!(wave.shape(), (64, 64));
        assert_eq!(wave.intensity().shape(), (64, 64));
        assert_eq!(wave.phase().shape(), (64, 64));
        Ok(())
    }

    #[test]
    fn stored_samples_are_not_apodized() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let samples = off_axis_hologram(64, 12., 18.);
        let mut h = Hologram::new(samples.clone(), HologramConfig::default())?;
        h.reconstruct(0.01, false, None)?;
        assert_eq!(h.samples(), &samples);
        Ok(())
    }

    #[test]
    fn cached_reconstruction_is_identical() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut h = hologram(64);
        let first = h.reconstruct(0.01, true, None)?;
        let second = h.reconstruct(0.01, true, None)?;
        assert_eq!(first.field(), second.field());
        assert_eq!(h.propagator().evaluations(), 1);
        assert_eq!(h.cache_len(), 1);
        h.reconstruct(0.01, false, None)?;
        assert_eq!(h.propagator().evaluations(), 2);
        assert_eq!(h.cache_len(), 1);
        Ok(())
    }

    #[test]
    fn cache_key_ignores_the_zero_sign() {
        assert_eq!(
            ReconstructionKey::new(0., 405e-9, 1e-6, 1e-6),
            ReconstructionKey::new(-0., 405e-9, 1e-6, 1e-6)
        );
        assert_ne!(
            ReconstructionKey::new(1e-3, 405e-9, 1e-6, 1e-6),
            ReconstructionKey::new(1e-3, 405e-9, 1e-6, 2e-6)
        );
    }

    #[test]
    fn phase_mask_is_kept_until_reset() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut h = hologram(64);
        assert!(h.digital_phase_mask().is_none());
        h.reconstruct(0.01, false, None)?;
        let mask = h.digital_phase_mask().cloned();
        assert!(mask.is_some());
        h.reconstruct(0.02, false, None)?;
        assert_eq!(h.digital_phase_mask().cloned(), mask);
        h.reset_aberration_correction();
        assert!(h.digital_phase_mask().is_none());
        Ok(())
    }

    #[test]
    fn supplied_phase_mask_is_stored() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut h = hologram(64);
        h.reconstruct(0.01, false, Some(DigitalPhaseMask::neutral(64)))?;
        assert_eq!(h.digital_phase_mask(), Some(&DigitalPhaseMask::neutral(64)));
        assert!(matches!(
            h.reconstruct(0.01, false, Some(DigitalPhaseMask::neutral(32))),
            Err(HologramError::MaskShape { .. })
        ));
        Ok(())
    }

    #[test]
    fn zero_distance_and_zero_hologram() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut h = hologram(64);
        let wave = h.reconstruct(0., false, None)?;
        assert!(wave.intensity().iter().all(|x| *x == 0.));
        let mut dark = Hologram::new(DMatrix::zeros(32, 32), HologramConfig::default())?;
        let wave = dark.reconstruct(0.01, false, None)?;
        assert!(wave.intensity().iter().all(|x| *x == 0.));
        Ok(())
    }

    #[test]
    fn cancelled_stack() {
        let mut h = hologram(64);
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            h.reconstruct_stack(&[0.01, 0.02], Some(&cancel)),
            Err(HologramError::Cancelled(0))
        ));
    }

    #[test]
    fn parallel_stack_matches_sequential() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let distances = [0.005, 0.01, 0.015];
        let sequential = hologram(64).reconstruct_stack(&distances, None)?;
        let mut h = hologram(64);
        let parallel = h.par_reconstruct_stack(&distances)?;
        assert_eq!(parallel.shape(), (3, 64, 64));
        assert_eq!(h.propagator().evaluations(), 3);
        for (s, p) in sequential.planes().iter().zip(parallel.planes()) {
            s.iter()
                .zip(p.iter())
                .for_each(|(a, b)| assert!((a - b).norm() <= 1e-12 * (1. + a.norm())));
        }
        Ok(())
    }

    #[test]
    fn rebin_averages_blocks() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let samples = DMatrix::from_fn(4, 4, |i, j| (i * 4 + j) as f64);
        let binned = rebin(&samples, 2)?;
        assert_eq!(binned, DMatrix::from_row_slice(2, 2, &[2.5, 4.5, 10.5, 12.5]));
        assert!(matches!(rebin(&samples, 3), Err(HologramError::Rebin { .. })));
        let h = Hologram::new(samples, HologramConfig::default().rebin_factor(2))?;
        assert_eq!(h.pixel_pitch(), (2. * DEFAULT_PIXEL_PITCH, 2. * DEFAULT_PIXEL_PITCH));
        assert_eq!(h.mask_radius(), MASK_RADIUS / 2.);
        Ok(())
    }

    #[test]
    fn crop_is_centered() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let samples = DMatrix::from_fn(8, 8, |i, j| (i * 8 + j) as f64);
        let cropped = crop(&samples, 0.5)?;
        assert_eq!(cropped.shape(), (4, 4));
        assert_eq!(cropped[(0, 0)], samples[(2, 2)]);
        assert!(matches!(crop(&samples, 0.), Err(HologramError::CropFraction(_))));
        assert!(matches!(crop(&samples, 1.5), Err(HologramError::CropFraction(_))));
        let h = Hologram::new(samples, HologramConfig::default().crop_fraction(0.5))?;
        assert_eq!(h.n(), 4);
        assert_eq!(h.mask_radius(), MASK_RADIUS);
        Ok(())
    }

    #[test]
    fn crop_to_a_side_that_is_not_a_power_of_two(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let samples = DMatrix::from_fn(10, 10, |i, j| (i * 10 + j) as f64);
        let cropped = crop(&samples, 0.5)?;
        assert_eq!(cropped.shape(), (5, 5));
        assert_eq!(cropped[(0, 0)], samples[(2, 2)]);
        let h = Hologram::new(samples, HologramConfig::default().crop_fraction(0.5))?;
        assert_eq!(h.n(), 5);
        Ok(())
    }

    #[test]
    fn back_propagation_recovers_the_spectrum_magnitude(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let n = 64;
        let d = 0.01;
        let mut h = Hologram::new(off_axis_hologram(n, 28., 24.), HologramConfig::default())?;
        let wave = h.reconstruct(d, false, Some(DigitalPhaseMask::neutral(n)))?;

        let half = (n / 2) as i64;
        let psi = fft2(&roll(wave.field(), -half, -half));
        let back = psi.component_mul(&h.propagator().transfer_function(-d));

        let spectrum = fft2_real(&h.apodized());
        let peak = h.fourier_peak_centroid(&spectrum);
        let mask = h.real_image_mask(peak, h.mask_radius());
        let shift = |p: usize| (n as f64 / 2. - p as f64) as i64;
        let expected = roll(&mask.apply(&spectrum), shift(peak.0), shift(peak.1));

        let scale = expected.iter().map(|z| z.norm()).fold(0., f64::max);
        assert!(scale > 0.);
        expected
            .iter()
            .zip(back.iter())
            .for_each(|(e, b)| assert!((e.norm() - b.norm()).abs() < 1e-9 * scale));
        Ok(())
    }

    fn write_npy(
        path: &Path,
        shape: &[u64],
        order: npyz::Order,
        data: &[f64],
    ) -> std::io::Result<()> {
        use npyz::WriterBuilder;
        let mut writer = npyz::WriteOptions::<f64>::new()
            .default_dtype()
            .shape(shape)
            .order(order)
            .writer(std::io::BufWriter::new(File::create(path)?))
            .begin_nd()?;
        writer.extend(data.iter().copied())?;
        writer.finish()
    }

    #[test]
    fn npy_in_c_and_fortran_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let samples = DMatrix::from_fn(16, 16, |i, j| (i * 100 + j) as f64);

        let c_path = dir.path().join("c.npy");
        let row_major: Vec<f64> = samples.transpose().iter().copied().collect();
        write_npy(&c_path, &[16, 16], npyz::Order::C, &row_major)?;
        let h = Hologram::from_npy(&c_path, HologramConfig::default())?;
        assert_eq!(h.samples(), &samples);

        let f_path = dir.path().join("fortran.npy");
        write_npy(&f_path, &[16, 16], npyz::Order::Fortran, samples.as_slice())?;
        let h = Hologram::from_npy(&f_path, HologramConfig::default())?;
        assert_eq!(h.samples(), &samples);
        Ok(())
    }

    #[test]
    fn npy_must_be_two_dimensional() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cube.npy");
        write_npy(&path, &[2, 2, 2], npyz::Order::C, &[0.; 8])?;
        assert!(matches!(
            Hologram::from_npy(&path, HologramConfig::default()),
            Err(HologramError::NpyShape(shape)) if shape == vec![2, 2, 2]
        ));
        Ok(())
    }

    #[test]
    fn png_keeps_the_8_bit_values() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hologram.png");
        image::GrayImage::from_fn(8, 8, |x, y| image::Luma([(3 * (x + 8 * y)) as u8]))
            .save(&path)?;
        let h = Hologram::from_image(&path, HologramConfig::default())?;
        let expected = DMatrix::from_fn(8, 8, |i, j| (3 * (j + 8 * i)) as f64);
        assert_eq!(h.samples(), &expected);
        Ok(())
    }

    #[test]
    fn non_square_hologram() {
        assert!(matches!(
            Hologram::new(DMatrix::zeros(8, 6), HologramConfig::default()),
            Err(HologramError::NotSquare(8, 6))
        ));
        assert!(matches!(
            Hologram::new(DMatrix::zeros(0, 0), HologramConfig::default()),
            Err(HologramError::Empty)
        ));
    }
}
