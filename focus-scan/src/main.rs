//! Focus scan
//!
//! Reconstructs a hologram over a range of propagation distances, finds the
//! plane in focus and writes the focus metric, the in-focus intensity and
//! phase and, given peak detections, the specimen coordinates.

use anyhow::Context;
use holo_focus::{
    cluster_focus_peaks,
    focus::specimen::{DBSCAN_EPS, DBSCAN_MIN_SAMPLES},
    find_focus_plane, focus_metric, FocusCriterion, Hologram, HologramConfig, SpecimenLocator,
    WaveCube,
};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::DMatrix;
use npyz::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    time::Instant,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "focus-scan", about = "Holographic reconstruction focus scan")]
struct Opt {
    /// Path to the hologram, a `.npy` file or a grayscale image
    #[structopt(parse(from_os_str))]
    hologram: PathBuf,
    /// First propagation distance [m]
    #[structopt(long, default_value = "0.001")]
    start: f64,
    /// Last propagation distance [m]
    #[structopt(long, default_value = "0.01")]
    end: f64,
    /// Number of propagation distances
    #[structopt(long, default_value = "10")]
    steps: usize,
    /// Laser wavelength [m]
    #[structopt(long)]
    wavelength: Option<f64>,
    /// Unbinned pixel pitch along x [m]
    #[structopt(long)]
    dx: Option<f64>,
    /// Unbinned pixel pitch along y [m]
    #[structopt(long)]
    dy: Option<f64>,
    /// Rebinning factor
    #[structopt(long, default_value = "1")]
    rebin: usize,
    /// Fraction of the hologram kept by a centered crop
    #[structopt(long)]
    crop: Option<f64>,
    /// Focus criterion: amplitude or phase
    #[structopt(long, default_value = "amplitude")]
    focus_on: FocusCriterion,
    /// CSV file of peak detections with `x`, `y` and `z` columns, `z` in meters
    #[structopt(long, parse(from_os_str))]
    peaks: Option<PathBuf>,
    /// Reconstruct the distances in parallel
    #[structopt(short, long)]
    parallel: bool,
    /// Output directory
    #[structopt(short, long, default_value = ".", parse(from_os_str))]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
struct Record {
    distance: f64,
    integral: f64,
}

#[derive(Debug, Deserialize)]
struct Peak {
    x: f64,
    y: f64,
    z: f64,
}

fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (end - start) / (steps - 1) as f64;
            (0..steps).map(|i| start + i as f64 * step).collect()
        }
    }
}

/// Writes a 2D array in C order
fn write_npy<P: AsRef<Path>>(path: P, data: &DMatrix<f64>) -> anyhow::Result<()> {
    let (nr, nc) = data.shape();
    let mut writer = npyz::WriteOptions::<f64>::new()
        .default_dtype()
        .shape(&[nr as u64, nc as u64])
        .writer(BufWriter::new(File::create(path)?))
        .begin_nd()?;
    writer.extend(data.transpose().iter().copied())?;
    writer.finish()?;
    Ok(())
}

/// Reconstructs every distance in turn without caching the waves
fn reconstruct_sweep(
    hologram: &mut Hologram,
    distances: &[f64],
    pb: &ProgressBar,
) -> anyhow::Result<WaveCube> {
    let mut cube = WaveCube::default();
    for &distance in distances {
        pb.set_message(format!("{:.4e}m", distance));
        cube.push(hologram.reconstruct(distance, false, None)?.into_field());
        pb.inc(1);
    }
    Ok(cube)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let mut config = HologramConfig::default().rebin_factor(opt.rebin);
    if let Some(arg) = opt.wavelength {
        config = config.wavelength(arg);
    }
    if opt.dx.is_some() || opt.dy.is_some() {
        let (dx, dy) = (opt.dx.unwrap_or(config.dx), opt.dy.unwrap_or(config.dy));
        config = config.pixel_pitch(dx, dy);
    }
    if let Some(arg) = opt.crop {
        config = config.crop_fraction(arg);
    }
    let mut hologram = match opt.hologram.extension().and_then(|e| e.to_str()) {
        Some("npy") => Hologram::from_npy(&opt.hologram, config),
        _ => Hologram::from_image(&opt.hologram, config),
    }
    .with_context(|| format!("failed to load {:?}", opt.hologram))?;

    let distances = linspace(opt.start, opt.end, opt.steps);
    anyhow::ensure!(!distances.is_empty(), "at least one distance is required");

    let now = Instant::now();
    let cube = if opt.parallel {
        hologram.par_reconstruct_stack(&distances)?
    } else {
        let pb = ProgressBar::new(distances.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")?
                .progress_chars("#>-"),
        );
        let cube = reconstruct_sweep(&mut hologram, &distances, &pb)?;
        pb.finish_with_message("reconstructed");
        cube
    };
    log::info!(
        "{} distances reconstructed in {:.3}s",
        cube.len(),
        now.elapsed().as_secs_f64()
    );

    let metric = focus_metric(&cube);
    let focus = find_focus_plane(&cube, opt.focus_on)?;
    println!(
        "{} focus: plane #{} at {:.6e}m",
        opt.focus_on, focus, distances[focus]
    );

    std::fs::create_dir_all(&opt.output)?;
    let mut wtr = csv::Writer::from_path(opt.output.join("focus_metric.csv"))?;
    for (&distance, &integral) in distances.iter().zip(&metric) {
        wtr.serialize(Record { distance, integral })?;
    }
    wtr.flush()?;

    let wave = hologram.reconstruct(distances[focus], false, None)?;
    write_npy(opt.output.join("intensity.npy"), wave.intensity())?;
    write_npy(opt.output.join("phase.npy"), wave.phase())?;

    if let Some(path) = opt.peaks {
        let positions = csv::Reader::from_path(&path)?
            .deserialize::<Peak>()
            .map(|peak| peak.map(|Peak { x, y, z }| [x, y, z]))
            .collect::<Result<Vec<[f64; 3]>, csv::Error>>()
            .with_context(|| format!("failed to read {:?}", path))?;
        let labels = cluster_focus_peaks(&positions, DBSCAN_EPS, DBSCAN_MIN_SAMPLES);
        let specimens = SpecimenLocator::default()
            .criterion(opt.focus_on)
            .locate(&cube, &positions, &labels, &distances)?;
        let mut wtr = csv::Writer::from_path(opt.output.join("specimens.csv"))?;
        for specimen in &specimens {
            wtr.serialize(specimen)?;
        }
        wtr.flush()?;
        println!("{} specimen(s) located", specimens.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_leaves_the_cache_empty() -> anyhow::Result<()> {
        let n = 64;
        let samples = DMatrix::from_fn(n, n, |i, j| {
            let phase = 2. * std::f64::consts::PI * (28. * i as f64 + 24. * j as f64) / n as f64;
            2. + 2. * phase.cos()
        });
        let mut hologram = Hologram::new(samples, HologramConfig::default())?;
        let distances = linspace(0.001, 0.004, 4);
        let cube = reconstruct_sweep(&mut hologram, &distances, &ProgressBar::hidden())?;
        assert_eq!(cube.len(), 4);
        assert_eq!(hologram.cache_len(), 0);
        Ok(())
    }
}
