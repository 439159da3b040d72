//! Seed-based voxelwise connectivity.
//!
//! Both estimators clean every run the same way: the mean signal under the
//! whole-brain mask is regressed out of the smoothed, 0.01-0.1 Hz band-passed
//! run, and every voxel is z-scored. Runs are then stacked in the order given
//! and each voxel is correlated with a seed time series. Output maps live on
//! the grid of the whole-brain mask and are zero outside it.

use std::borrow::Cow;
use std::path::Path;

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use tracing::{debug, info, warn};

use crate::common::Image;
use crate::error::{ContargError, Result};
use crate::masker::{CleaningParams, TimeSeriesMasker};
use crate::masking::BrainMask;

fn check_repetition_time(t_r: f64) -> Result<()> {
    if t_r.is_finite() && t_r > 0.0 {
        Ok(())
    } else {
        Err(ContargError::InvalidRepetitionTime(t_r))
    }
}

/// Cleans each run, drops its first `n_dummy` timepoints and stacks the runs
/// along time into one `(time, voxels)` matrix.
pub fn clean_and_stack<'r, I>(
    runs: I,
    mask: &BrainMask,
    params: &CleaningParams,
    n_dummy: usize,
) -> Result<Array2<f64>>
where
    I: IntoIterator<Item = Result<Cow<'r, Image>>>,
{
    let gs_masker = TimeSeriesMasker::raw(mask);
    let masker = TimeSeriesMasker::new(mask, params.clone());

    let mut cleaned_runs = Vec::new();
    for (index, run) in runs.into_iter().enumerate() {
        let run = run?;
        let global_signal = gs_masker.global_signal(&run)?;
        let cleaned = masker.transform(&run, Some(&global_signal))?;
        if n_dummy >= cleaned.nrows() {
            return Err(ContargError::TooFewTimepoints(cleaned.nrows(), n_dummy + 1));
        }
        let kept = cleaned.slice(s![n_dummy.., ..]).to_owned();
        info!(
            "Run {}: {} timepoints kept, {} voxels",
            index + 1,
            kept.nrows(),
            kept.ncols()
        );
        cleaned_runs.push(kept);
    }
    if cleaned_runs.is_empty() {
        return Err(ContargError::NoRuns);
    }
    let views: Vec<ArrayView2<f64>> = cleaned_runs.iter().map(|m| m.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// Mean over the columns whose `region` value is non-zero.
pub fn region_mean_series(
    series: &Array2<f64>,
    region: &Array1<f64>,
    name: &'static str,
) -> Result<Array1<f64>> {
    let columns: Vec<usize> = region
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v != 0.0)
        .map(|(i, _)| i)
        .collect();
    if columns.is_empty() {
        return Err(ContargError::EmptyRegion(name));
    }
    let selected = series.select(Axis(1), &columns);
    selected
        .mean_axis(Axis(1))
        .ok_or(ContargError::EmptyRegion(name))
}

/// Per-timepoint weighted average across voxels.
pub fn weighted_average_series(series: &Array2<f64>, weights: &Array1<f64>) -> Result<Array1<f64>> {
    let total = weights.sum();
    if total == 0.0 || !total.is_finite() {
        return Err(ContargError::ZeroWeightSum);
    }
    if weights.len() != series.ncols() {
        return Err(ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into());
    }
    Ok(series.dot(weights) / total)
}

/// Subtracts the mean and divides by the population standard deviation.
pub fn zscore(series: &Array1<f64>) -> Result<Array1<f64>> {
    let n = series.len();
    if n == 0 {
        return Err(ContargError::ZeroVariance);
    }
    let mean = series.sum() / n as f64;
    let centred = series.mapv(|v| v - mean);
    let std = (centred.mapv(|v| v * v).sum() / n as f64).sqrt();
    // centring a constant leaves rounding noise on the scale of the mean
    let tolerance = f64::EPSILON * 100.0 * mean.abs().max(1.0);
    if !(std > tolerance && std.is_finite()) {
        return Err(ContargError::ZeroVariance);
    }
    Ok(centred / std)
}

/// `seriesᵀ · seed / n_timepoints` for every voxel column.
pub fn voxel_seed_product(series: &Array2<f64>, seed: &Array1<f64>) -> Result<Array1<f64>> {
    if seed.len() != series.nrows() {
        return Err(ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into());
    }
    Ok(series.t().dot(seed) / seed.len() as f64)
}

/// Zeroes the weights of every voxel inside `region`.
pub fn exclude_region(weights: &mut Array1<f64>, region: &Array1<f64>) {
    weights.zip_mut_with(region, |w, &r| {
        if r != 0.0 {
            *w = 0.0;
        }
    });
}

/// Zeroes every voxel column outside `region`.
pub fn restrict_to_region(series: &mut Array2<f64>, region: &Array1<f64>) {
    for (mut column, &r) in series.columns_mut().into_iter().zip(region.iter()) {
        if r == 0.0 {
            column.fill(0.0);
        }
    }
}

fn finish(
    values: Array1<f64>,
    mask: &BrainMask,
    mask_img: &Image,
    out_path: Option<&Path>,
) -> Result<Image> {
    let img = mask.unmask_image(&values.view(), mask_img)?;
    if let Some(path) = out_path {
        info!("Writing connectivity map to {}", path.display());
        img.save(path)?;
    }
    Ok(img)
}

fn reference_connectivity<'r, I>(
    runs: I,
    mask_img: &Image,
    refroi: &Image,
    t_r: f64,
    smoothing_fwhm: Option<f64>,
    out_path: Option<&Path>,
) -> Result<Image>
where
    I: IntoIterator<Item = Result<Cow<'r, Image>>>,
{
    check_repetition_time(t_r)?;
    let mask = BrainMask::from_image(mask_img)?;
    let reference = mask.apply_image(refroi)?;

    let params = CleaningParams::bandpassed(t_r, smoothing_fwhm);
    let series = clean_and_stack(runs, &mask, &params, 0)?;
    let seed = region_mean_series(&series, &reference, "reference ROI")?;
    debug!("Reference time series has {} timepoints", seed.len());

    let values = voxel_seed_product(&series, &seed)?;
    finish(values, &mask, mask_img, out_path)
}

#[allow(clippy::too_many_arguments)]
fn seedmap_connectivity<'r, I>(
    runs: I,
    mask_img: &Image,
    seedmap: &Image,
    stimroi: &Image,
    n_dummy: usize,
    t_r: f64,
    smoothing_fwhm: Option<f64>,
    out_path: Option<&Path>,
) -> Result<Image>
where
    I: IntoIterator<Item = Result<Cow<'r, Image>>>,
{
    check_repetition_time(t_r)?;
    let mask = BrainMask::from_image(mask_img)?;
    let stim = mask.apply_image(stimroi)?;
    let mut weights = mask.apply_image(seedmap)?;
    exclude_region(&mut weights, &stim);
    if stim.iter().all(|&v| v == 0.0) {
        warn!("Stimulus ROI has no voxels inside the mask; the map will be empty");
    }

    let params = CleaningParams::bandpassed(t_r, smoothing_fwhm);
    let mut series = clean_and_stack(runs, &mask, &params, n_dummy)?;
    let seed = zscore(&weighted_average_series(&series, &weights)?)?;
    debug!("Seed-map time series has {} timepoints", seed.len());

    restrict_to_region(&mut series, &stim);
    let values = voxel_seed_product(&series, &seed)?;
    finish(values, &mask, mask_img, out_path)
}

/// Voxelwise connectivity with the mean time series of a reference ROI.
///
/// Runs are cleaned and concatenated in order; pass a one-element slice for a
/// single run. The map is written to `out_path` when one is given.
pub fn reference_voxel_connectivity(
    runs: &[Image],
    mask: &Image,
    refroi: &Image,
    t_r: f64,
    smoothing_fwhm: Option<f64>,
    out_path: Option<&Path>,
) -> Result<Image> {
    reference_connectivity(
        runs.iter().map(|r| Ok(Cow::Borrowed(r))),
        mask,
        refroi,
        t_r,
        smoothing_fwhm,
        out_path,
    )
}

/// Same as [`reference_voxel_connectivity`], loading every image from disk.
/// Runs are read one at a time.
pub fn reference_voxel_connectivity_from_paths<P: AsRef<Path>>(
    bold_paths: &[P],
    mask_path: &Path,
    refroi_path: &Path,
    t_r: f64,
    smoothing_fwhm: Option<f64>,
    out_path: Option<&Path>,
) -> Result<Image> {
    let mask = Image::load(mask_path)?;
    let refroi = Image::load(refroi_path)?;
    reference_connectivity(
        bold_paths.iter().map(|p| Image::load(p).map(Cow::Owned)),
        &mask,
        &refroi,
        t_r,
        smoothing_fwhm,
        out_path,
    )
}

/// Voxelwise connectivity with a seed-map weighted time series, restricted to
/// a stimulus ROI.
///
/// Seed-map weights inside the stimulus ROI are ignored. The first `n_dummy`
/// timepoints of every cleaned run are dropped before concatenation, and the
/// weighted series is z-scored before it is correlated with each voxel.
#[allow(clippy::too_many_arguments)]
pub fn seedmap_voxel_connectivity(
    runs: &[Image],
    mask: &Image,
    seedmap: &Image,
    stimroi: &Image,
    n_dummy: usize,
    t_r: f64,
    smoothing_fwhm: Option<f64>,
    out_path: Option<&Path>,
) -> Result<Image> {
    seedmap_connectivity(
        runs.iter().map(|r| Ok(Cow::Borrowed(r))),
        mask,
        seedmap,
        stimroi,
        n_dummy,
        t_r,
        smoothing_fwhm,
        out_path,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn seedmap_voxel_connectivity_from_paths<P: AsRef<Path>>(
    bold_paths: &[P],
    mask_path: &Path,
    seedmap_path: &Path,
    stimroi_path: &Path,
    n_dummy: usize,
    t_r: f64,
    smoothing_fwhm: Option<f64>,
    out_path: Option<&Path>,
) -> Result<Image> {
    let mask = Image::load(mask_path)?;
    let seedmap = Image::load(seedmap_path)?;
    let stimroi = Image::load(stimroi_path)?;
    seedmap_connectivity(
        bold_paths.iter().map(|p| Image::load(p).map(Cow::Owned)),
        &mask,
        &seedmap,
        &stimroi,
        n_dummy,
        t_r,
        smoothing_fwhm,
        out_path,
    )
}
