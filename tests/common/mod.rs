//! Synthetic datasets for the connectivity integration tests.
#![allow(dead_code)]

use contarg::Image;
use nalgebra::Matrix4;
use ndarray::{Array3, Array4};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

pub const GRID: usize = 6;
pub const TR: f64 = 2.0;

/// 2 mm isotropic voxels.
pub fn affine() -> Matrix4<f64> {
    Matrix4::new(
        2.0, 0.0, 0.0, -6.0, //
        0.0, 2.0, 0.0, -6.0, //
        0.0, 0.0, 2.0, -6.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

fn volume(f: impl Fn(usize, usize, usize) -> bool) -> Image {
    let vol = Array3::from_shape_fn((GRID, GRID, GRID), |(i, j, k)| {
        if f(i, j, k) {
            1.0
        } else {
            0.0
        }
    });
    Image::new(vol.into_dyn(), affine())
}

/// Everything but a one-voxel border.
pub fn brain_mask() -> Image {
    volume(|i, j, k| [i, j, k].iter().all(|&c| (1..GRID - 1).contains(&c)))
}

/// A 2x2x2 block in one corner of the brain.
pub fn reference_roi() -> Image {
    volume(|i, j, k| (1..3).contains(&i) && (1..3).contains(&j) && (1..3).contains(&k))
}

/// A 2x2x2 block in the opposite corner.
pub fn stimulus_roi() -> Image {
    volume(|i, j, k| (3..5).contains(&i) && (3..5).contains(&j) && (3..5).contains(&k))
}

/// Continuous weights peaking at the reference corner, non-zero everywhere.
pub fn seed_map() -> Image {
    let vol = Array3::from_shape_fn((GRID, GRID, GRID), |(i, j, k)| {
        let d2 = (i as f64 - 1.5).powi(2) + (j as f64 - 1.5).powi(2) + (k as f64 - 1.5).powi(2);
        (-d2 / 8.0).exp()
    });
    Image::new(vol.into_dyn(), affine())
}

/// Seed map that is only non-zero inside the stimulus ROI.
pub fn seed_map_inside_stimulus() -> Image {
    stimulus_roi()
}

// deterministic noise in [-0.5, 0.5)
fn noise(a: usize, b: usize, c: usize, t: usize, seed: usize) -> f64 {
    let x = (a * 73 + b * 151 + c * 283 + t * 397 + seed * 911) as f64;
    let v = (x * 12.9898).sin() * 43758.5453;
    v - v.floor() - 0.5
}

/// A run in which voxels near the reference corner share a 0.05 Hz
/// fluctuation and everything carries a weaker 0.03 Hz component and noise.
pub fn bold_run(n_t: usize, seed: usize) -> Image {
    let series = Array4::from_shape_fn((GRID, GRID, GRID, n_t), |(i, j, k, t)| {
        let time = t as f64 * TR;
        let network = if i + j + k <= 7 { 1.0 } else { 0.2 };
        let phase = seed as f64 * 0.7;
        1000.0
            + 5.0 * network * (2.0 * PI * 0.05 * time + phase).sin()
            + 2.0 * (2.0 * PI * 0.03 * time + (i * 3 + k) as f64 * 0.4).cos()
            + noise(i, j, k, t, seed)
    });
    Image::new(series.into_dyn(), affine())
}

/// Writes `img` under `dir` and returns its path.
pub fn write(dir: &Path, name: &str, img: &Image) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// Values of `img` at voxels where `region` is zero.
pub fn values_outside(img: &Image, region: &Image) -> Vec<f64> {
    let vol = img.volume3().unwrap();
    let region = region.volume3().unwrap();
    vol.iter()
        .zip(region.iter())
        .filter(|&(_, &r)| r == 0.0)
        .map(|(&v, _)| v)
        .collect()
}

/// Values of `img` at voxels where `region` is non-zero.
pub fn values_inside(img: &Image, region: &Image) -> Vec<f64> {
    let vol = img.volume3().unwrap();
    let region = region.volume3().unwrap();
    vol.iter()
        .zip(region.iter())
        .filter(|&(_, &r)| r != 0.0)
        .map(|(&v, _)| v)
        .collect()
}
