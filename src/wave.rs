use crate::{
    fourier::Field,
    unwrap::{doubled_phase, unwrap_phase, RANDOM_SEED},
};
use nalgebra::DMatrix;
use std::{ops::Range, sync::OnceLock};

/// Complex wavefield reconstructed at a given propagation distance
///
/// The intensity and the unwrapped phase are computed on first access and
/// memoized; the underlying field is never modified.
#[derive(Debug, Clone)]
pub struct ReconstructedWave {
    field: Field,
    seed: u64,
    intensity: OnceLock<DMatrix<f64>>,
    phase: OnceLock<DMatrix<f64>>,
}
impl From<Field> for ReconstructedWave {
    fn from(field: Field) -> Self {
        Self::new(field)
    }
}
impl ReconstructedWave {
    pub fn new(field: Field) -> Self {
        Self {
            field,
            seed: RANDOM_SEED,
            intensity: OnceLock::new(),
            phase: OnceLock::new(),
        }
    }
    /// Sets the seed of the phase unwrapping tie-breaks
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed,
            phase: OnceLock::new(),
            ..self
        }
    }
    pub fn field(&self) -> &Field {
        &self.field
    }
    pub fn into_field(self) -> Field {
        self.field
    }
    pub fn shape(&self) -> (usize, usize) {
        self.field.shape()
    }
    pub fn seed(&self) -> u64 {
        self.seed
    }
    /// Magnitude of the reconstructed wave
    pub fn intensity(&self) -> &DMatrix<f64> {
        self.intensity.get_or_init(|| self.field.map(|z| z.norm()))
    }
    /// Unwrapped phase of the reconstructed wave, `unwrap(2·atan(Im/Re))/2`
    pub fn phase(&self) -> &DMatrix<f64> {
        self.phase.get_or_init(|| {
            let wrapped = self.field.map(doubled_phase);
            unwrap_phase(&wrapped, self.seed) / 2.
        })
    }
}

/// Stack of reconstructed waves, one plane per propagation distance
#[derive(Debug, Clone, Default)]
pub struct WaveCube(Vec<Field>);
impl From<Vec<Field>> for WaveCube {
    fn from(planes: Vec<Field>) -> Self {
        Self(planes)
    }
}
impl FromIterator<Field> for WaveCube {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
impl FromIterator<ReconstructedWave> for WaveCube {
    fn from_iter<I: IntoIterator<Item = ReconstructedWave>>(iter: I) -> Self {
        Self(iter.into_iter().map(ReconstructedWave::into_field).collect())
    }
}
impl WaveCube {
    /// Number of planes
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Shape `(planes, rows, columns)`, rows and columns are taken from the first plane
    pub fn shape(&self) -> (usize, usize, usize) {
        let (nr, nc) = self.0.first().map_or((0, 0), |plane| plane.shape());
        (self.len(), nr, nc)
    }
    pub fn planes(&self) -> &[Field] {
        &self.0
    }
    pub fn plane(&self, index: usize) -> Option<&Field> {
        self.0.get(index)
    }
    pub fn push(&mut self, plane: Field) {
        self.0.push(plane);
    }
    pub fn into_planes(self) -> Vec<Field> {
        self.0
    }
    /// Crops the cube to the given plane, row and column ranges
    ///
    /// Ranges are clipped to the cube bounds, an out-of-bounds range yields an empty axis.
    pub fn roi(&self, z: Range<usize>, x: Range<usize>, y: Range<usize>) -> WaveCube {
        let clip = |range: Range<usize>, n: usize| range.start.min(n)..range.end.min(n);
        let z = clip(z, self.len());
        self.0[z.start..z.end.max(z.start)]
            .iter()
            .map(|plane| {
                let (nr, nc) = plane.shape();
                let (x, y) = (clip(x.clone(), nr), clip(y.clone(), nc));
                plane
                    .view(
                        (x.start, y.start),
                        (x.end.saturating_sub(x.start), y.end.saturating_sub(y.start)),
                    )
                    .into_owned()
            })
            .collect()
    }
}
