//! Separable Gaussian smoothing of volumes and time series.

use nalgebra::Matrix4;
use ndarray::{Array, Axis, Dimension};

use crate::affine::voxel_sizes;

/// Kernel support in standard deviations on each side.
const TRUNCATE: f64 = 4.0;

/// Converts a full width at half maximum into a standard deviation.
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (8.0 * 2f64.ln()).sqrt()
}

/// Normalised 1D Gaussian kernel of radius `(4 * sigma + 0.5) as usize`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as usize;
    let r = radius as isize;
    let mut kernel: Vec<f64> = (-r..=r)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= total);
    kernel
}

// mirror about the edges, repeating the edge sample: d c b a | a b c d | d c b a
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

fn convolve_line(line: &[f64], kernel: &[f64], out: &mut [f64]) {
    let n = line.len();
    let half = (kernel.len() / 2) as isize;
    for (i, o) in out.iter_mut().enumerate() {
        *o = kernel
            .iter()
            .enumerate()
            .map(|(ki, &w)| w * line[reflect_index(i as isize + ki as isize - half, n)])
            .sum();
    }
}

/// Smooths `data` in place along one axis with a Gaussian of width `sigma` voxels.
pub fn smooth_axis<D: Dimension>(data: &mut Array<f64, D>, axis: usize, sigma: f64) {
    if sigma <= 0.0 || data.shape()[axis] < 2 {
        return;
    }
    let kernel = gaussian_kernel(sigma);
    let mut line = vec![0.0; data.shape()[axis]];
    let mut out = vec![0.0; data.shape()[axis]];
    for mut lane in data.lanes_mut(Axis(axis)) {
        for (dst, &src) in line.iter_mut().zip(lane.iter()) {
            *dst = src;
        }
        convolve_line(&line, &kernel, &mut out);
        for (dst, &src) in lane.iter_mut().zip(out.iter()) {
            *dst = src;
        }
    }
}

/// Smooths the three spatial axes of a 3D or 4D array with an isotropic
/// Gaussian of `fwhm` millimetres, using the voxel sizes of `affine`.
///
/// Later axes (time) are left untouched. Non-finite values are zeroed first.
pub fn smooth_array<D: Dimension>(data: &mut Array<f64, D>, affine: &Matrix4<f64>, fwhm: f64) {
    data.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    if fwhm <= 0.0 {
        return;
    }
    let zooms = voxel_sizes(affine);
    let sigma_mm = fwhm_to_sigma(fwhm);
    for axis in 0..data.ndim().min(3) {
        if zooms[axis] > 0.0 {
            smooth_axis(data, axis, sigma_mm / zooms[axis]);
        }
    }
}
