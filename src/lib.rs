//! Digital holographic microscopy
//!
//! Reconstruction of the complex wavefield recorded in an off-axis hologram
//! ([Hologram]) and focusing of the specimens through stacks of
//! reconstructions ([focus]).
//!
//! ```no_run
//! use holo_focus::{find_focus_plane, FocusCriterion, Hologram, HologramConfig};
//!
//! # fn main() -> Result<(), holo_focus::Error> {
//! let mut hologram = Hologram::from_image("hologram.tif", HologramConfig::default())?;
//! let distances: Vec<f64> = (0..50).map(|i| 1e-3 + i as f64 * 1e-4).collect();
//! let cube = hologram.reconstruct_stack(&distances, None)?;
//! let focus = find_focus_plane(&cube, FocusCriterion::Amplitude)?;
//! println!("in focus at {}m", distances[focus]);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod filter;
pub mod focus;
pub mod fourier;
pub mod hologram;
pub mod unwrap;
pub mod wave;

pub use error::Error;
pub use focus::{
    cluster_focus_peaks, find_focus_plane, focus_metric, locate_specimens, ClusterLabel,
    FocusCriterion, FocusError, SpecimenCoordinate, SpecimenLocator,
};
pub use fourier::Field;
pub use hologram::{DigitalPhaseMask, Hologram, HologramConfig, HologramError};
pub use wave::{ReconstructedWave, WaveCube};

pub type Result<T> = std::result::Result<T, Error>;

/// Reconstructs `hologram` at every distance and focuses the specimens detected at `positions`
///
/// The peak positions are clustered with the default DBSCAN parameters
/// before being handed to [locate_specimens].
pub fn locate_in_hologram(
    hologram: &mut Hologram,
    distances: &[f64],
    positions: &[[f64; 3]],
) -> Result<Vec<SpecimenCoordinate>> {
    let cube = hologram.par_reconstruct_stack(distances)?;
    let labels = cluster_focus_peaks(
        positions,
        focus::specimen::DBSCAN_EPS,
        focus::specimen::DBSCAN_MIN_SAMPLES,
    );
    Ok(locate_specimens(&cube, positions, &labels, distances)?)
}
