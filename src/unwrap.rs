//! Two dimensional phase unwrapping
//!
//! Reliability-sorted, non-continuous path unwrapping (Herráez et al., Appl.
//! Opt. 41, 7437, 2002). Pixels are ranked by the second differences of their
//! wrapped neighbourhood, edges are processed from the most to the least
//! reliable and pixel groups are merged as edges are visited. Border pixels
//! have no second difference; they are given a low reliability with a random
//! jitter drawn from a seeded generator, which makes their processing order,
//! and hence the result, reproducible for a given seed.

use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Default seed of the unwrapping tie-breaks
pub const RANDOM_SEED: u64 = 42;

const BORDER_RELIABILITY: f64 = 9_999_999.;

/// Wraps a phase into `[-π, π)`
pub fn wrap(phase: f64) -> f64 {
    (phase + PI).rem_euclid(2. * PI) - PI
}

/// Phase of `z` doubled and wrapped, i.e. `2·atan(Im/Re)`, defined as 0 for `z = 0`
pub fn doubled_phase(z: Complex64) -> f64 {
    wrap(2. * z.im.atan2(z.re))
}

struct Edge {
    pixels: (usize, usize),
    reliability: f64,
    increment: i64,
}

/// Number of 2π cycles to add to `second` so it lies within π of `first`
fn find_wrap(first: f64, second: f64) -> i64 {
    let difference = first - second;
    if difference > PI {
        1
    } else if difference < -PI {
        -1
    } else {
        0
    }
}

fn reliabilities(wrapped: &DMatrix<f64>, seed: u64) -> DMatrix<f64> {
    let (nr, nc) = wrapped.shape();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut reliability =
        DMatrix::from_fn(nr, nc, |_, _| BORDER_RELIABILITY + rng.gen::<f64>());
    let w = |i: usize, j: usize| wrapped[(i, j)];
    for i in 1..nr.saturating_sub(1) {
        for j in 1..nc.saturating_sub(1) {
            let center = w(i, j);
            let h = wrap(w(i - 1, j) - center) - wrap(center - w(i + 1, j));
            let v = wrap(w(i, j - 1) - center) - wrap(center - w(i, j + 1));
            let d1 = wrap(w(i - 1, j - 1) - center) - wrap(center - w(i + 1, j + 1));
            let d2 = wrap(w(i - 1, j + 1) - center) - wrap(center - w(i + 1, j - 1));
            reliability[(i, j)] = h * h + v * v + d1 * d1 + d2 * d2;
        }
    }
    reliability
}

/// Unwraps a wrapped phase map
///
/// Phase differences between neighbouring pixels of the result never exceed
/// π in magnitude along the merged paths; the result differs from the input
/// by integer multiples of 2π only.
pub fn unwrap_phase(wrapped: &DMatrix<f64>, seed: u64) -> DMatrix<f64> {
    let (nr, nc) = wrapped.shape();
    let n = nr * nc;
    if n < 2 {
        return wrapped.clone();
    }
    let values = wrapped.as_slice();
    let reliability = reliabilities(wrapped, seed);
    let reliability = reliability.as_slice();
    // column-major linear index
    let index = |i: usize, j: usize| i + j * nr;

    let mut edges = Vec::with_capacity(2 * n);
    for j in 0..nc {
        for i in 0..nr {
            let p = index(i, j);
            if i + 1 < nr {
                let q = index(i + 1, j);
                edges.push(Edge {
                    pixels: (p, q),
                    reliability: reliability[p] + reliability[q],
                    increment: find_wrap(values[p], values[q]),
                });
            }
            if j + 1 < nc {
                let q = index(i, j + 1);
                edges.push(Edge {
                    pixels: (p, q),
                    reliability: reliability[p] + reliability[q],
                    increment: find_wrap(values[p], values[q]),
                });
            }
        }
    }
    edges.sort_by(|a, b| a.reliability.total_cmp(&b.reliability));

    let mut group: Vec<usize> = (0..n).collect();
    let mut members: Vec<Vec<usize>> = (0..n).map(|p| vec![p]).collect();
    let mut cycles = vec![0i64; n];
    for edge in &edges {
        let (p, q) = edge.pixels;
        let (gp, gq) = (group[p], group[q]);
        if gp == gq {
            continue;
        }
        // the smaller group joins the larger one
        let (from, into, offset) = if members[gp].len() >= members[gq].len() {
            (gq, gp, cycles[p] + edge.increment - cycles[q])
        } else {
            (gp, gq, cycles[q] - edge.increment - cycles[p])
        };
        let moved = std::mem::take(&mut members[from]);
        for &pixel in &moved {
            group[pixel] = into;
            cycles[pixel] += offset;
        }
        members[into].extend(moved);
    }

    DMatrix::from_iterator(
        nr,
        nc,
        values
            .iter()
            .zip(&cycles)
            .map(|(value, &k)| value + 2. * PI * k as f64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_range() {
        assert!((wrap(3. * PI / 2.) + PI / 2.).abs() < 1e-12);
        assert!((wrap(-3. * PI / 2.) - PI / 2.).abs() < 1e-12);
        assert!((wrap(0.25) - 0.25).abs() < 1e-15);
    }

    #[test]
    fn doubled_phase_matches_arctangent() {
        let z = Complex64::new(-1., 2.);
        assert!((doubled_phase(z) - wrap(2. * (z.im / z.re).atan())).abs() < 1e-12);
        assert_eq!(doubled_phase(Complex64::new(0., 0.)), 0.);
    }

    #[test]
    fn unwrap_recovers_a_tilted_plane() {
        let truth = DMatrix::from_fn(24, 20, |i, j| 0.7 * i as f64 - 0.45 * j as f64);
        let unwrapped = unwrap_phase(&truth.map(wrap), RANDOM_SEED);
        let offset = unwrapped[(0, 0)] - truth[(0, 0)];
        let cycles = offset / (2. * PI);
        assert!((cycles - cycles.round()).abs() < 1e-9);
        unwrapped
            .iter()
            .zip(truth.iter())
            .for_each(|(u, t)| assert!((u - t - offset).abs() < 1e-9));
    }

    #[test]
    fn unwrap_recovers_a_paraboloid() {
        let truth = DMatrix::from_fn(32, 32, |i, j| {
            let (x, y) = (i as f64 - 16., j as f64 - 16.);
            0.05 * (x * x + y * y)
        });
        let unwrapped = unwrap_phase(&truth.map(wrap), 7);
        let offset = unwrapped[(16, 16)] - truth[(16, 16)];
        unwrapped
            .iter()
            .zip(truth.iter())
            .for_each(|(u, t)| assert!((u - t - offset).abs() < 1e-9));
    }

    #[test]
    fn same_seed_same_result() {
        let wrapped = DMatrix::from_fn(16, 16, |i, j| wrap((i * j) as f64 * 0.9));
        assert_eq!(unwrap_phase(&wrapped, 3), unwrap_phase(&wrapped, 3));
    }
}
