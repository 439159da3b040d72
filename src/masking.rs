//! Conversion between volumes on the brain grid and flat voxel vectors.
//!
//! Voxels are ordered row-major over `(x, y, z)`, `z` varying fastest. Every
//! flattened vector and every column of a masked time-series matrix follows
//! this order.

use crate::common::Image;
use crate::error::{ContargError, Result};
use nalgebra::Matrix4;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView3, ArrayView4, ErrorKind, ShapeError};

const AFFINE_ATOL: f64 = 1e-4;
const AFFINE_RTOL: f64 = 1e-5;

#[derive(Debug, Clone)]
pub struct BrainMask {
    mask: Array3<bool>,
    n_voxels: usize,
    affine: Matrix4<f64>,
}

impl BrainMask {
    /// Builds a mask from any image: voxels with a non-zero value are inside.
    pub fn from_image(img: &Image) -> Result<Self> {
        let vol = img.volume3()?;
        Self::from_array(vol.mapv(|v| v != 0.0), img.affine)
    }

    pub fn from_array(mask: Array3<bool>, affine: Matrix4<f64>) -> Result<Self> {
        let n_voxels = mask.iter().filter(|&&inside| inside).count();
        if n_voxels == 0 {
            return Err(ContargError::EmptyMask);
        }
        Ok(Self {
            mask,
            n_voxels,
            affine,
        })
    }

    pub fn n_voxels(&self) -> usize {
        self.n_voxels
    }

    pub fn shape(&self) -> &[usize] {
        self.mask.shape()
    }

    pub fn affine(&self) -> &Matrix4<f64> {
        &self.affine
    }

    pub fn mask(&self) -> &Array3<bool> {
        &self.mask
    }

    fn check_grid(&self, shape: &[usize]) -> Result<()> {
        if shape.get(..3) != Some(self.mask.shape()) {
            return Err(ContargError::GridMismatch(
                self.mask.shape().to_vec(),
                shape.iter().take(3).copied().collect(),
            ));
        }
        Ok(())
    }

    /// Checks that `img` shares the mask's shape and voxel-to-world affine.
    pub fn check_image(&self, img: &Image) -> Result<()> {
        self.check_grid(img.data.shape())?;
        let max_difference = self
            .affine
            .iter()
            .zip(img.affine.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        let tolerance = AFFINE_ATOL + AFFINE_RTOL * self.affine.amax();
        if !(max_difference <= tolerance) {
            return Err(ContargError::AffineMismatch(max_difference));
        }
        Ok(())
    }

    /// Values of a volume at the mask voxels.
    pub fn apply_volume(&self, vol: &ArrayView3<f64>) -> Result<Array1<f64>> {
        self.check_grid(vol.shape())?;
        let values: Vec<f64> = self
            .mask
            .iter()
            .zip(vol.iter())
            .filter_map(|(&inside, &v)| if inside { Some(v) } else { None })
            .collect();
        Ok(Array1::from(values))
    }

    /// Masks a 3D image defined on the mask's grid.
    pub fn apply_image(&self, img: &Image) -> Result<Array1<f64>> {
        self.check_image(img)?;
        self.apply_volume(&img.volume3()?)
    }

    /// Masks a run defined on the mask's grid into a `(time, voxels)` matrix.
    pub fn apply_run(&self, run: &Image) -> Result<Array2<f64>> {
        self.check_image(run)?;
        self.apply_series(&run.series4()?)
    }

    /// Time series at the mask voxels as a `(time, voxels)` matrix.
    pub fn apply_series(&self, series: &ArrayView4<f64>) -> Result<Array2<f64>> {
        self.check_grid(series.shape())?;
        let n_t = series.shape()[3];
        let mut out = Array2::zeros((n_t, self.n_voxels));
        let mut col = 0;
        for ((i, j, k), &inside) in self.mask.indexed_iter() {
            if inside {
                out.column_mut(col)
                    .assign(&series.slice(s![i, j, k, ..]));
                col += 1;
            }
        }
        Ok(out)
    }

    /// Scatters a voxel vector back onto the grid; everything outside is zero.
    pub fn unmask(&self, values: &ArrayView1<f64>) -> Result<Array3<f64>> {
        if values.len() != self.n_voxels {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
        }
        let mut vol = Array3::zeros(self.mask.raw_dim());
        let mut it = values.iter();
        for (out, &inside) in vol.iter_mut().zip(self.mask.iter()) {
            if inside {
                if let Some(&v) = it.next() {
                    *out = v;
                }
            }
        }
        Ok(vol)
    }

    /// Unmasks into an image that carries the mask's header and affine.
    pub fn unmask_image(&self, values: &ArrayView1<f64>, reference: &Image) -> Result<Image> {
        let vol = self.unmask(values)?;
        let mut img = Image::like(reference, vol.into_dyn());
        img.affine = self.affine;
        Ok(img)
    }
}
