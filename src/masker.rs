//! Extraction of cleaned voxel time series from functional runs.

use crate::common::Image;
use crate::error::{ContargError, Result};
use crate::masking::BrainMask;
use crate::signal;
use crate::smoothing::smooth_array;
use ndarray::Array2;
use tracing::debug;

/// Low-pass cutoff in Hz applied before connectivity estimation.
pub const LOW_PASS_HZ: f64 = 0.1;
/// High-pass cutoff in Hz applied before connectivity estimation.
pub const HIGH_PASS_HZ: f64 = 0.01;
pub const DEFAULT_SMOOTHING_FWHM: f64 = 4.0;
const BUTTERWORTH_ORDER: usize = 5;

/// What to do to a run between loading and connectivity estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningParams {
    /// Low-pass cutoff in Hz.
    pub low_pass: Option<f64>,
    /// High-pass cutoff in Hz.
    pub high_pass: Option<f64>,
    /// Repetition time in seconds, needed by any cutoff.
    pub t_r: Option<f64>,
    pub standardize: bool,
    /// Spatial smoothing kernel width in mm.
    pub smoothing_fwhm: Option<f64>,
    pub filter_order: usize,
}

impl Default for CleaningParams {
    fn default() -> Self {
        Self {
            low_pass: None,
            high_pass: None,
            t_r: None,
            standardize: false,
            smoothing_fwhm: None,
            filter_order: BUTTERWORTH_ORDER,
        }
    }
}

impl CleaningParams {
    /// 0.01-0.1 Hz band-pass, smoothing and standardization.
    pub fn bandpassed(t_r: f64, smoothing_fwhm: Option<f64>) -> Self {
        Self {
            low_pass: Some(LOW_PASS_HZ),
            high_pass: Some(HIGH_PASS_HZ),
            t_r: Some(t_r),
            standardize: true,
            smoothing_fwhm,
            ..Self::default()
        }
    }

    pub fn with_low_pass(mut self, hz: f64) -> Self {
        self.low_pass = Some(hz);
        self
    }

    pub fn with_high_pass(mut self, hz: f64) -> Self {
        self.high_pass = Some(hz);
        self
    }

    pub fn with_t_r(mut self, seconds: f64) -> Self {
        self.t_r = Some(seconds);
        self
    }

    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    pub fn with_smoothing_fwhm(mut self, fwhm: f64) -> Self {
        self.smoothing_fwhm = Some(fwhm);
        self
    }

    fn needs_filter(&self) -> bool {
        self.low_pass.is_some() || self.high_pass.is_some()
    }
}

/// Smooths, masks and cleans functional runs on the grid of a brain mask.
#[derive(Debug, Clone)]
pub struct TimeSeriesMasker<'a> {
    mask: &'a BrainMask,
    params: CleaningParams,
}

impl<'a> TimeSeriesMasker<'a> {
    pub fn new(mask: &'a BrainMask, params: CleaningParams) -> Self {
        Self { mask, params }
    }

    /// Masks a run without any processing.
    pub fn raw(mask: &'a BrainMask) -> Self {
        Self::new(mask, CleaningParams::default())
    }

    pub fn params(&self) -> &CleaningParams {
        &self.params
    }

    /// `(time, voxels)` matrix of the run after smoothing, filtering,
    /// confound removal and standardization, in that order.
    pub fn transform(&self, run: &Image, confounds: Option<&Array2<f64>>) -> Result<Array2<f64>> {
        let n_t = run.n_timepoints();
        if self.params.needs_filter() && n_t < 2 {
            return Err(ContargError::TooFewTimepoints(n_t, 2));
        }
        let signals = match self.params.smoothing_fwhm {
            Some(fwhm) if fwhm > 0.0 => {
                self.mask.check_image(run)?;
                let mut series = run.series4()?.to_owned();
                smooth_array(&mut series, &run.affine, fwhm);
                self.mask.apply_series(&series.view())?
            }
            _ => self.mask.apply_run(run)?,
        };
        debug!(
            "Masked run to {} timepoints x {} voxels",
            signals.nrows(),
            signals.ncols()
        );
        signal::clean(signals, confounds, &self.params)
    }

    /// Mean masked signal per timepoint as a `(time, 1)` regressor.
    pub fn global_signal(&self, run: &Image) -> Result<Array2<f64>> {
        let signals = self.mask.apply_run(run)?;
        signal::mean_regressor(&signals)
    }
}
