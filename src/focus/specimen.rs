//! Specimen localization across a stack of reconstructions
//!
//! Peaks detected in the individual planes of a stack are clustered with
//! DBSCAN, a cluster gathering the detections of a single specimen through
//! several planes. Each cluster is then focused on a small sub-stack around
//! its detections.

use super::{find_focus_plane, FocusCriterion, FocusError, Result};
use crate::wave::WaveCube;
use rstar::{primitives::GeomWithData, RTree};
use serde::Serialize;
use std::{collections::BTreeMap, ops::Range};

/// DBSCAN neighbourhood radius [px]
pub const DBSCAN_EPS: f64 = 5.;
/// DBSCAN minimum neighbourhood size of a core point, the point included
pub const DBSCAN_MIN_SAMPLES: usize = 3;
/// Compression factor of the z coordinates before clustering
pub const Z_COMPRESSION: f64 = 10.;
/// Half-width [px] of the region of interest around a cluster, along x and y
pub const XY_RANGE: f64 = 2.;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterLabel {
    Noise,
    Cluster(usize),
}

/// Labels the `(x, y, z)` peak positions with DBSCAN
///
/// The z coordinates are divided by [Z_COMPRESSION] first. Cluster ids are
/// given in the order the clusters are discovered, scanning the positions in
/// order; a border point reachable from several clusters joins the first one.
pub fn cluster_focus_peaks(xyz: &[[f64; 3]], eps: f64, min_samples: usize) -> Vec<ClusterLabel> {
    let points: Vec<[f64; 3]> = xyz
        .iter()
        .map(|&[x, y, z]| [x, y, z / Z_COMPRESSION])
        .collect();
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, &p)| GeomWithData::new(p, i))
            .collect(),
    );
    let neighbours = |i: usize| -> Vec<usize> {
        tree.locate_within_distance(points[i], eps * eps)
            .map(|p| p.data)
            .collect()
    };

    let mut labels = vec![ClusterLabel::Noise; points.len()];
    let mut visited = vec![false; points.len()];
    let mut id = 0;
    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }
        let seeds = neighbours(seed);
        if seeds.len() < min_samples {
            continue;
        }
        visited[seed] = true;
        labels[seed] = ClusterLabel::Cluster(id);
        let mut stack = seeds;
        while let Some(p) = stack.pop() {
            if labels[p] == ClusterLabel::Noise {
                labels[p] = ClusterLabel::Cluster(id);
            }
            if visited[p] {
                continue;
            }
            visited[p] = true;
            let reach = neighbours(p);
            if reach.len() >= min_samples {
                stack.extend(reach.into_iter().filter(|&q| !visited[q]));
            }
        }
        id += 1;
    }
    log::debug!("{} clusters in {} peaks", id, points.len());
    labels
}

/// Final `(x, y, z)` position of a specimen, `z` being a propagation distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpecimenCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Peak positions sharing a cluster label
#[derive(Debug, Clone, PartialEq)]
pub struct SpecimenCluster {
    pub id: usize,
    pub positions: Vec<[f64; 3]>,
}
impl SpecimenCluster {
    /// Groups the positions by cluster, noise excluded, in increasing id order
    pub fn group(positions: &[[f64; 3]], labels: &[ClusterLabel]) -> Result<Vec<Self>> {
        if positions.len() != labels.len() {
            return Err(FocusError::LabelCount {
                labels: labels.len(),
                positions: positions.len(),
            });
        }
        let mut clusters: BTreeMap<usize, Vec<[f64; 3]>> = BTreeMap::new();
        for (position, label) in positions.iter().zip(labels) {
            if let ClusterLabel::Cluster(id) = label {
                clusters.entry(*id).or_default().push(*position);
            }
        }
        Ok(clusters
            .into_iter()
            .map(|(id, positions)| Self { id, positions })
            .collect())
    }
    pub fn len(&self) -> usize {
        self.positions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
    fn coordinate(&self, axis: usize) -> Vec<f64> {
        self.positions.iter().map(|p| p[axis]).collect()
    }
    /// Median of the x and y coordinates
    pub fn median_xy(&self) -> (f64, f64) {
        (median(self.coordinate(0)), median(self.coordinate(1)))
    }
    /// Component-wise minimum and maximum of the positions
    pub fn bounds(&self) -> ([f64; 3], [f64; 3]) {
        self.positions.iter().fold(
            ([f64::INFINITY; 3], [f64::NEG_INFINITY; 3]),
            |(mut lo, mut hi), p| {
                for k in 0..3 {
                    lo[k] = lo[k].min(p[k]);
                    hi[k] = hi[k].max(p[k]);
                }
                (lo, hi)
            },
        )
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    match n {
        0 => f64::NAN,
        n if n % 2 == 1 => values[n / 2],
        n => 0.5 * (values[n / 2 - 1] + values[n / 2]),
    }
}

/// Index of the distance nearest to `value`
fn nearest_index(value: f64, distances: &[f64]) -> usize {
    distances
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, gap), (i, d)| {
            let g = (value - d).abs();
            if g < gap {
                (i, g)
            } else {
                (best, gap)
            }
        })
        .0
}

/// Sub-stack `(planes, rows, columns)` ranges around a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub z: Range<usize>,
    pub x: Range<usize>,
    pub y: Range<usize>,
}
impl RegionOfInterest {
    /// `[lo, hi)` clipped to `[0, n)`, with at least one index when `n > 0`
    fn window(lo: f64, hi: f64, n: usize) -> Range<usize> {
        let start = (lo.floor().max(0.) as usize).min(n.saturating_sub(1));
        let end = (hi.ceil().max(0.) as usize).min(n).max((start + 1).min(n));
        start..end
    }
    /// Region of interest of `cluster` in a stack of the given `(planes, rows, columns)` shape
    ///
    /// The x and y extents of the cluster are padded by [XY_RANGE] pixels and
    /// the plane extent by its own length. The lower bounds are moved inward
    /// so the padding stays within the stack; the upper bound is moved inward
    /// along x only, the y and z upper bounds are padded as they are.
    pub fn new(cluster: &SpecimenCluster, distances: &[f64], shape: (usize, usize, usize)) -> Self {
        let (planes, rows, columns) = shape;
        let (lo, hi) = cluster.bounds();
        let (za, zb) = (
            nearest_index(lo[2], distances),
            nearest_index(hi[2], distances),
        );
        let (zmin, zmax) = (za.min(zb), za.max(zb));
        let z_range = (zmax - zmin) as f64;

        let xmin = lo[0].max(XY_RANGE);
        let xmax = hi[0].min(rows as f64 - XY_RANGE);
        let ymin = lo[1].max(XY_RANGE);
        let ymax = hi[1];
        let zmin = (zmin as f64).max(z_range);
        let zmax = zmax as f64;

        Self {
            z: Self::window(zmin - z_range, zmax + z_range, planes),
            x: Self::window(xmin - XY_RANGE, xmax + XY_RANGE, rows),
            y: Self::window(ymin - XY_RANGE, ymax + XY_RANGE, columns),
        }
    }
}

/// Focuses the specimen clusters found in a stack of reconstructions
#[derive(Debug, Clone, Copy)]
pub struct SpecimenLocator {
    min_points: usize,
    criterion: FocusCriterion,
}
impl Default for SpecimenLocator {
    fn default() -> Self {
        Self {
            min_points: 4,
            criterion: FocusCriterion::Amplitude,
        }
    }
}
impl SpecimenLocator {
    /// Clusters with fewer positions are skipped
    pub fn min_points(self, min_points: usize) -> Self {
        Self { min_points, ..self }
    }
    pub fn criterion(self, criterion: FocusCriterion) -> Self {
        Self { criterion, ..self }
    }
    /// Returns the `(x, y, z)` coordinates of each specimen
    ///
    /// `positions` are the `(x, y, z)` peak detections, `z` in the same unit as
    /// `distances`, the propagation distances of the `cube` planes.
    pub fn locate(
        &self,
        cube: &WaveCube,
        positions: &[[f64; 3]],
        labels: &[ClusterLabel],
        distances: &[f64],
    ) -> Result<Vec<SpecimenCoordinate>> {
        if distances.is_empty() {
            return Err(FocusError::NoDistances);
        }
        if distances.len() != cube.len() {
            return Err(FocusError::DistanceCount {
                distances: distances.len(),
                planes: cube.len(),
            });
        }
        let clusters = SpecimenCluster::group(positions, labels)?;
        let mut coordinates = vec![];
        for cluster in clusters.iter().filter(|c| c.len() >= self.min_points) {
            let (x, y) = cluster.median_xy();
            let roi = RegionOfInterest::new(cluster, distances, cube.shape());
            let sub_stack = cube.roi(roi.z.clone(), roi.x.clone(), roi.y.clone());
            let focus = find_focus_plane(&sub_stack, self.criterion)? + roi.z.start;
            log::debug!("cluster #{} in {:?}, focus at plane #{}", cluster.id, roi, focus);
            coordinates.push(SpecimenCoordinate {
                x,
                y,
                z: distances[focus],
            });
        }
        log::info!("{} specimen(s) located", coordinates.len());
        Ok(coordinates)
    }
}

/// [SpecimenLocator::locate] with the default amplitude criterion and minimum cluster size
pub fn locate_specimens(
    cube: &WaveCube,
    positions: &[[f64; 3]],
    labels: &[ClusterLabel],
    distances: &[f64],
) -> Result<Vec<SpecimenCoordinate>> {
    SpecimenLocator::default().locate(cube, positions, labels, distances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourier::Field;
    use rustfft::num_complex::Complex64;
    use super::ClusterLabel::{Cluster, Noise};

    fn distances() -> Vec<f64> {
        (1..=10).map(|i| i as f64 / 1000.).collect()
    }

    /// Amplitude integral minimum at plane #6
    fn cube() -> WaveCube {
        (0..10)
            .map(|p| Field::from_element(32, 32, Complex64::new(1. + 0.1 * (p as f64 - 6.).powi(2), 0.)))
            .collect()
    }

    #[test]
    fn dbscan_two_blobs_and_noise() {
        let xyz = [
            [10., 10., 0.],
            [11., 10., 10.],
            [10., 11., 20.],
            [11., 11., 30.],
            [40., 40., 0.],
            [41., 40., 0.],
            [40., 41., 10.],
            [41., 41., 10.],
            [80., 5., 0.],
        ];
        let labels = cluster_focus_peaks(&xyz, DBSCAN_EPS, DBSCAN_MIN_SAMPLES);
        assert_eq!(
            labels,
            vec![
                Cluster(0),
                Cluster(0),
                Cluster(0),
                Cluster(0),
                Cluster(1),
                Cluster(1),
                Cluster(1),
                Cluster(1),
                Noise
            ]
        );
    }

    #[test]
    fn median_of_even_and_odd_sets() {
        assert_eq!(median(vec![3., 1., 2.]), 2.);
        assert_eq!(median(vec![4., 1., 2., 3.]), 2.5);
    }

    #[test]
    fn two_clusters_two_specimens() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let positions = [
            [10., 10., 0.005],
            [11., 10., 0.006],
            [10., 12., 0.007],
            [11., 11., 0.008],
            [22., 20., 0.001],
            [22., 21., 0.002],
            [23., 20., 0.003],
            [23., 21., 0.004],
            [5., 28., 0.009],
        ];
        let labels = [
            Cluster(0),
            Cluster(0),
            Cluster(0),
            Cluster(0),
            Cluster(1),
            Cluster(1),
            Cluster(1),
            Cluster(1),
            Noise,
        ];
        let specimens = locate_specimens(&cube(), &positions, &labels, &distances())?;
        assert_eq!(specimens.len(), 2);
        assert_eq!(
            specimens[0],
            SpecimenCoordinate {
                x: 10.5,
                y: 10.5,
                z: 0.007
            }
        );
        assert_eq!((specimens[1].x, specimens[1].y), (22.5, 20.5));
        // the window of the second cluster stops short of plane #6
        assert_eq!(specimens[1].z, 0.006);
        Ok(())
    }

    #[test]
    fn small_clusters_are_skipped() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let positions = [[10., 10., 0.005], [11., 10., 0.006], [10., 12., 0.007]];
        let labels = [Cluster(0); 3];
        assert!(locate_specimens(&cube(), &positions, &labels, &distances())?.is_empty());
        Ok(())
    }

    #[test]
    fn roi_stays_within_the_stack() {
        let shape = (10, 32, 32);
        let edge_clusters = [
            vec![[0., 0., 0.001], [1., 31., 0.01]],
            vec![[31., 31., 0.01], [31., 31., 0.01]],
            vec![[0., 0., 0.001], [0., 0., 0.001]],
            vec![[40., -3., 0.02], [45., 50., -0.01]],
        ];
        for positions in edge_clusters {
            let cluster = SpecimenCluster { id: 0, positions };
            let roi = RegionOfInterest::new(&cluster, &distances(), shape);
            for (range, n) in [(&roi.z, shape.0), (&roi.x, shape.1), (&roi.y, shape.2)] {
                assert!(range.start < range.end, "{:?}", roi);
                assert!(range.end <= n, "{:?}", roi);
            }
        }
    }

    #[test]
    fn mismatched_inputs() {
        assert!(matches!(
            locate_specimens(&cube(), &[[0., 0., 0.]], &[], &distances()),
            Err(FocusError::LabelCount { .. })
        ));
        assert!(matches!(
            locate_specimens(&cube(), &[], &[], &[]),
            Err(FocusError::NoDistances)
        ));
        assert!(matches!(
            locate_specimens(&cube(), &[], &[], &[1e-3]),
            Err(FocusError::DistanceCount { .. })
        ));
    }
}
