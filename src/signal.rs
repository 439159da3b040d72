//! Temporal cleaning of `(time, voxels)` signal matrices.
//!
//! Cleaning follows the usual fMRI order: zero-phase Butterworth filtering of
//! signals and confounds, projection of the confounds out of the signals, then
//! per-column standardization.

use crate::error::{ContargError, Result};
use crate::masker::CleaningParams;
use nalgebra::{Complex, ComplexField, DMatrix};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Columns with a standard deviation below this are only centred.
const STD_EPS: f64 = f64::EPSILON;

/// Confound directions whose QR diagonal is at most this are dropped.
const RANK_TOLERANCE: f64 = f64::EPSILON * 100.0;

/// Cutoffs normalised to the Nyquist frequency, each in `(0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterBand {
    LowPass(f64),
    HighPass(f64),
    BandPass(f64, f64),
}

/// Biquad coefficients `[b0, b1, b2, a0, a1, a2]` with `a0 == 1`.
pub type Section = [f64; 6];

/// A digital IIR filter stored as cascaded second-order sections.
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<Section>,
}

impl SosFilter {
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Magnitude of the frequency response at `omega` radians per sample.
    pub fn magnitude(&self, omega: f64) -> f64 {
        let z1 = Complex::new(omega.cos(), -omega.sin());
        let z2 = z1 * z1;
        self.sections
            .iter()
            .map(|s| {
                let num = z2 * s[2] + z1 * s[1] + s[0];
                let den = z2 * s[5] + z1 * s[4] + s[3];
                (num / den).modulus()
            })
            .product()
    }

    /// Default edge padding: three times the number of filter taps.
    fn padlen(&self) -> usize {
        let n_sections = self.sections.len();
        let first_order_b = self.sections.iter().filter(|s| s[2] == 0.0).count();
        let first_order_a = self.sections.iter().filter(|s| s[5] == 0.0).count();
        3 * (2 * n_sections + 1 - first_order_b.min(first_order_a))
    }

    /// Steady-state initial conditions for a unit step input.
    fn steady_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|s| {
                let [b0, b1, b2, _, a1, a2] = *s;
                let gain = (b0 + b1 + b2) / (1.0 + a1 + a2);
                let z1 = b2 - a2 * gain;
                let z0 = b1 - a1 * gain + z1;
                let zi = [z0 * scale, z1 * scale];
                scale *= gain;
                zi
            })
            .collect()
    }

    /// Runs the cascade over `x` in place (transposed direct form II).
    fn filter_in_place(&self, x: &mut [f64], zi: &mut [[f64; 2]]) {
        for sample in x.iter_mut() {
            let mut v = *sample;
            for (s, z) in self.sections.iter().zip(zi.iter_mut()) {
                let y = s[0] * v + z[0];
                z[0] = s[1] * v - s[4] * y + z[1];
                z[1] = s[2] * v - s[5] * y;
                v = y;
            }
            *sample = v;
        }
    }

    /// Forward-backward filtering with odd extension at both ends.
    ///
    /// The padding is capped at `len - 1` so that short runs can still be
    /// filtered. Fails for fewer than two samples.
    pub fn filtfilt(&self, x: &ArrayView1<f64>) -> Result<Array1<f64>> {
        let n = x.len();
        if n < 2 {
            return Err(ContargError::TooFewTimepoints(n, 2));
        }
        let pad = self.padlen().min(n - 1);
        let first = x[0];
        let last = x[n - 1];

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
        ext.extend(x.iter().copied());
        ext.extend((1..=pad).map(|i| 2.0 * last - x[n - 1 - i]));

        let zi = self.steady_state();

        let mut state: Vec<[f64; 2]> = zi.iter().map(|z| [z[0] * ext[0], z[1] * ext[0]]).collect();
        self.filter_in_place(&mut ext, &mut state);

        ext.reverse();
        let mut state: Vec<[f64; 2]> = zi.iter().map(|z| [z[0] * ext[0], z[1] * ext[0]]).collect();
        self.filter_in_place(&mut ext, &mut state);
        ext.reverse();

        Ok(Array1::from(ext[pad..pad + n].to_vec()))
    }
}

/// Designs a digital Butterworth filter of the given order.
///
/// A band-pass of order `n` has `2n` poles. The analog prototype is
/// pre-warped, mapped with the bilinear transform and normalised to unit gain
/// at DC (low-pass), Nyquist (high-pass) or the geometric band center.
pub fn butterworth(order: usize, band: FilterBand) -> Result<SosFilter> {
    let check = |w: f64| {
        if w > 0.0 && w < 1.0 {
            Ok(())
        } else {
            Err(ContargError::InvalidFilterBand(band))
        }
    };
    // pre-warped analog frequencies for a sampling rate of 2
    let warp = |w: f64| 4.0 * (PI * w / 2.0).tan();

    let prototype: Vec<Complex<f64>> = (0..order)
        .map(|k| {
            let m = 2.0 * k as f64 + 1.0 - order as f64;
            -ComplexField::exp(Complex::new(0.0, PI * m / (2 * order) as f64))
        })
        .collect();

    let (analog_poles, zeros_at_dc, zeros_at_nyquist, reference_omega) = match band {
        FilterBand::LowPass(w) => {
            check(w)?;
            let wc = warp(w);
            let poles = prototype.iter().map(|p| p * wc).collect::<Vec<_>>();
            (poles, 0, order, 0.0)
        }
        FilterBand::HighPass(w) => {
            check(w)?;
            let wc = warp(w);
            let poles = prototype
                .iter()
                .map(|p| Complex::new(wc, 0.0) / p)
                .collect::<Vec<_>>();
            (poles, order, 0, PI)
        }
        FilterBand::BandPass(low, high) => {
            check(low)?;
            check(high)?;
            if low >= high {
                return Err(ContargError::InvalidFilterBand(band));
            }
            let (wl, wh) = (warp(low), warp(high));
            let bw = wh - wl;
            let w0_sq = wl * wh;
            let mut poles = Vec::with_capacity(2 * order);
            for p in &prototype {
                let half = p * (bw / 2.0);
                let root = ComplexField::sqrt(half * half - w0_sq);
                poles.push(half + root);
                poles.push(half - root);
            }
            (poles, order, order, 2.0 * (w0_sq.sqrt() / 4.0).atan())
        }
    };

    let digital: Vec<Complex<f64>> = analog_poles
        .iter()
        .map(|s| (Complex::new(4.0, 0.0) + s) / (Complex::new(4.0, 0.0) - s))
        .collect();

    // zeros alternate between z = 1 and z = -1 so that band-pass sections are balanced
    let mut zeros = Vec::with_capacity(zeros_at_dc + zeros_at_nyquist);
    let (mut n_dc, mut n_nyq) = (zeros_at_dc, zeros_at_nyquist);
    while n_dc + n_nyq > 0 {
        if n_dc > 0 {
            zeros.push(1.0);
            n_dc -= 1;
        }
        if n_nyq > 0 {
            zeros.push(-1.0);
            n_nyq -= 1;
        }
    }

    let sections = pair_sections(&digital, &zeros);
    let mut filter = SosFilter { sections };
    let gain = filter.magnitude(reference_omega);
    if let Some(first) = filter.sections.first_mut() {
        first[0] /= gain;
        first[1] /= gain;
        first[2] /= gain;
    }
    debug!(
        "Butterworth {:?}: {} sections, gain {:.3e}",
        band,
        filter.sections.len(),
        gain
    );
    Ok(filter)
}

fn pair_sections(poles: &[Complex<f64>], zeros: &[f64]) -> Vec<Section> {
    let tol = 1e-10;
    // (a0, a1, a2) and the number of poles the section holds
    let mut denominators: Vec<([f64; 3], usize)> = Vec::new();
    let mut real: Vec<f64> = Vec::new();
    for p in poles {
        if p.im > tol {
            denominators.push(([1.0, -2.0 * p.re, p.norm_sqr()], 2));
        } else if p.im.abs() <= tol {
            real.push(p.re);
        }
    }
    real.sort_by(|a, b| a.total_cmp(b));
    for pair in real.chunks(2) {
        match pair {
            [p1, p2] => denominators.push(([1.0, -(p1 + p2), p1 * p2], 2)),
            [p] => denominators.push(([1.0, -p, 0.0], 1)),
            _ => {}
        }
    }

    let mut remaining = zeros.iter().copied();
    denominators
        .into_iter()
        .map(|(a, n_poles)| {
            let z1 = remaining.next().unwrap_or(0.0);
            let b = if n_poles == 1 {
                [1.0, -z1, 0.0]
            } else {
                let z2 = remaining.next().unwrap_or(0.0);
                [1.0, -(z1 + z2), z1 * z2]
            };
            [b[0], b[1], b[2], a[0], a[1], a[2]]
        })
        .collect()
}

/// Builds the temporal filter requested by `params`, if any.
///
/// A low-pass at or above Nyquist is ignored with a warning.
pub fn temporal_filter(params: &CleaningParams) -> Result<Option<SosFilter>> {
    if params.low_pass.is_none() && params.high_pass.is_none() {
        return Ok(None);
    }
    let t_r = match params.t_r {
        Some(t_r) if t_r.is_finite() && t_r > 0.0 => t_r,
        Some(t_r) => return Err(ContargError::InvalidRepetitionTime(t_r)),
        None => return Err(ContargError::InvalidRepetitionTime(f64::NAN)),
    };
    let nyquist = 0.5 / t_r;
    let in_range = |f: f64| f.is_finite() && f > 0.0;
    let mut low_pass = params.low_pass;
    if let Some(lp) = low_pass {
        if !in_range(lp) {
            return Err(ContargError::InvalidCutoff(lp, nyquist));
        }
        if lp >= nyquist {
            warn!(
                "Low-pass cutoff {} Hz is not below the Nyquist frequency {} Hz; skipping it",
                lp, nyquist
            );
            low_pass = None;
        }
    }
    if let Some(hp) = params.high_pass {
        if !in_range(hp) || hp >= nyquist {
            return Err(ContargError::InvalidCutoff(hp, nyquist));
        }
    }
    let band = match (params.high_pass, low_pass) {
        (Some(hp), Some(lp)) => {
            if hp >= lp {
                return Err(ContargError::InvalidBand(hp, lp));
            }
            FilterBand::BandPass(hp / nyquist, lp / nyquist)
        }
        (Some(hp), None) => FilterBand::HighPass(hp / nyquist),
        (None, Some(lp)) => FilterBand::LowPass(lp / nyquist),
        (None, None) => return Ok(None),
    };
    Ok(Some(butterworth(params.filter_order, band)?))
}

/// Filters every column of a `(time, features)` matrix.
pub fn filter_columns(filter: &SosFilter, signals: &mut Array2<f64>) -> Result<()> {
    for mut column in signals.columns_mut() {
        let filtered = filter.filtfilt(&column.view())?;
        column.assign(&filtered);
    }
    Ok(())
}

/// Z-scores each column with the population standard deviation.
///
/// Columns whose deviation is below machine epsilon are only centred. A single
/// timepoint cannot be standardized and is returned unchanged.
pub fn standardize(signals: &mut Array2<f64>) {
    let n_t = signals.nrows();
    if n_t < 2 {
        warn!("Standardization of a single timepoint would give zeros; skipping");
        return;
    }
    for mut column in signals.columns_mut() {
        let mean = column.sum() / n_t as f64;
        column.mapv_inplace(|v| v - mean);
        let std = (column.iter().map(|v| v * v).sum::<f64>() / n_t as f64).sqrt();
        if std >= STD_EPS {
            column.mapv_inplace(|v| v / std);
        }
    }
}

/// Projects the column space of `confounds` out of `signals`.
///
/// Confounds are standardized first; columns that are degenerate after
/// standardization do not contribute to the projection.
pub fn regress_out(signals: &mut Array2<f64>, confounds: &Array2<f64>) -> Result<()> {
    let n_t = signals.nrows();
    if confounds.nrows() != n_t {
        return Err(ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into());
    }
    let mut confounds = confounds.to_owned();
    standardize(&mut confounds);

    let k = confounds.ncols();
    let matrix = DMatrix::from_fn(n_t, k, |r, c| confounds[[r, c]]);
    let qr = matrix.qr();
    let q = qr.q();
    let r = qr.r();

    let keep: Vec<usize> = (0..r.nrows().min(r.ncols()))
        .filter(|&i| r[(i, i)].abs() > RANK_TOLERANCE)
        .collect();
    if keep.is_empty() {
        debug!("Confounds are degenerate; nothing to regress out");
        return Ok(());
    }

    let basis = Array2::from_shape_fn((n_t, keep.len()), |(t, c)| q[(t, keep[c])]);
    let coefficients = basis.t().dot(signals);
    *signals -= &basis.dot(&coefficients);
    Ok(())
}

/// Filters, removes confounds and standardizes a `(time, voxels)` matrix.
pub fn clean(
    mut signals: Array2<f64>,
    confounds: Option<&Array2<f64>>,
    params: &CleaningParams,
) -> Result<Array2<f64>> {
    let mut confounds = confounds.map(|c| c.to_owned());
    if let Some(filter) = temporal_filter(params)? {
        filter_columns(&filter, &mut signals)?;
        if let Some(c) = confounds.as_mut() {
            filter_columns(&filter, c)?;
        }
    }
    if let Some(c) = confounds.as_ref() {
        regress_out(&mut signals, c)?;
    }
    if params.standardize {
        standardize(&mut signals);
    }
    Ok(signals)
}

/// Mean across the columns of a `(time, features)` matrix, as a `(time, 1)` regressor.
pub fn mean_regressor(signals: &Array2<f64>) -> Result<Array2<f64>> {
    let mean = signals
        .mean_axis(Axis(1))
        .ok_or(ContargError::EmptyMask)?;
    Ok(mean.insert_axis(Axis(1)))
}
