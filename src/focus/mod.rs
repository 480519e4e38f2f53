//! Autofocus
//!
//! The integral over the image plane of the amplitude of the reconstructed
//! wave is minimum at the focal plane of a pure amplitude object and maximum
//! at the focal plane of a pure phase object (Dubois et al., Opt. Express 14,
//! 5895, 2006). The criterion only holds for small stacks centered on a
//! single object, see [specimen] for whole field stacks.

use crate::wave::WaveCube;
use std::{fmt, str::FromStr};

pub mod specimen;
pub use specimen::{
    cluster_focus_peaks, locate_specimens, ClusterLabel, RegionOfInterest, SpecimenCluster,
    SpecimenCoordinate, SpecimenLocator,
};

#[derive(Debug, thiserror::Error)]
pub enum FocusError {
    #[error(r#"focus criterion must be either "amplitude" or "phase", found "{0}""#)]
    Criterion(String),
    #[error("cannot focus an empty stack")]
    EmptyStack,
    #[error("found {labels} labels for {positions} positions")]
    LabelCount { labels: usize, positions: usize },
    #[error("no propagation distances")]
    NoDistances,
    #[error("found {distances} distances for {planes} planes")]
    DistanceCount { distances: usize, planes: usize },
}
pub type Result<T> = std::result::Result<T, FocusError>;

/// Object type the autofocus is tuned for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusCriterion {
    /// minimum of the amplitude integral
    #[default]
    Amplitude,
    /// maximum of the amplitude integral
    Phase,
}
impl FromStr for FocusCriterion {
    type Err = FocusError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "amplitude" => Ok(Self::Amplitude),
            "phase" => Ok(Self::Phase),
            _ => Err(FocusError::Criterion(s.to_string())),
        }
    }
}
impl fmt::Display for FocusCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amplitude => write!(f, "amplitude"),
            Self::Phase => write!(f, "phase"),
        }
    }
}

/// Integral of the wave amplitude over each plane of the stack
pub fn focus_metric(cube: &WaveCube) -> Vec<f64> {
    cube.planes()
        .iter()
        .map(|plane| plane.iter().map(|z| z.norm()).sum())
        .collect()
}

/// Index of the first extremum of `values`, the first minimum if `minimum` or else the first maximum
fn first_extremum(values: &[f64], minimum: bool) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &value)| match best {
            Some((_, extremum))
                if (minimum && value >= extremum) || (!minimum && value <= extremum) =>
            {
                best
            }
            _ => Some((i, value)),
        })
        .map(|(i, _)| i)
}

/// Index of the plane in focus
pub fn find_focus_plane(cube: &WaveCube, criterion: FocusCriterion) -> Result<usize> {
    let metric = focus_metric(cube);
    let index = first_extremum(&metric, criterion == FocusCriterion::Amplitude)
        .ok_or(FocusError::EmptyStack)?;
    log::debug!("{} focus at plane #{} of {}", criterion, index, metric.len());
    Ok(index)
}
