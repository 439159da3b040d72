use crate::affine::{best_affine, write_affine};
use crate::error::{ContargError, Result};
use nalgebra::Matrix4;
use ndarray::{ArrayD, ArrayView3, ArrayView4, Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// A 3D volume or 4D time series together with its header and affine.
///
/// Data is indexed `[x, y, z]` or `[x, y, z, t]` as stored in the file.
#[derive(Clone)]
pub struct Image {
    pub data: ArrayD<f64>,
    pub affine: Matrix4<f64>,
    pub header: NiftiHeader,
}

impl Image {
    /// Wraps an array with a fresh header carrying `affine` as its sform.
    pub fn new(data: ArrayD<f64>, affine: Matrix4<f64>) -> Self {
        let mut header = NiftiHeader::default();
        write_affine(&mut header, &affine);
        Self {
            data,
            affine,
            header,
        }
    }

    /// An image on the grid of `reference`, sharing its header and affine.
    pub fn like(reference: &Image, data: ArrayD<f64>) -> Self {
        Self {
            data,
            affine: reference.affine,
            header: reference.header.clone(),
        }
    }

    /// Reads a `.nii` or `.nii.gz` file, applying the intensity scaling.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading {}", path.display());
        let obj = ReaderOptions::new().read_file(path)?;
        let header = obj.header().clone();
        let data = obj.into_volume().into_ndarray::<f64>()?;
        check_dims(data.ndim())?;
        let affine = best_affine(&header);
        Ok(Self {
            data,
            affine,
            header,
        })
    }

    /// Writes the image, storing the affine as the sform of the written header.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut header = self.header.clone();
        write_affine(&mut header, &self.affine);
        // data is written unscaled
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        debug!("Writing {:?} to {}", self.data.shape(), path.display());
        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&self.data)?;
        Ok(())
    }

    /// Spatial shape `[nx, ny, nz]`.
    pub fn grid(&self) -> Vec<usize> {
        self.data.shape().iter().take(3).copied().collect()
    }

    /// Number of timepoints; 1 for a 3D volume.
    pub fn n_timepoints(&self) -> usize {
        match self.data.ndim() {
            4 => self.data.shape()[3],
            _ => 1,
        }
    }

    /// View as a single volume. A 4D image is accepted only with one timepoint.
    pub fn volume3(&self) -> Result<ArrayView3<f64>> {
        match self.data.ndim() {
            3 => Ok(self.data.view().into_dimensionality::<Ix3>()?),
            4 if self.data.shape()[3] == 1 => Ok(self
                .data
                .view()
                .index_axis_move(Axis(3), 0)
                .into_dimensionality::<Ix3>()?),
            n => Err(ContargError::InvalidDimensions(n)),
        }
    }

    /// View as a time series; a 3D volume becomes a single timepoint.
    pub fn series4(&self) -> Result<ArrayView4<f64>> {
        match self.data.ndim() {
            3 => Ok(self
                .data
                .view()
                .insert_axis(Axis(3))
                .into_dimensionality::<Ix4>()?),
            4 => Ok(self.data.view().into_dimensionality::<Ix4>()?),
            n => Err(ContargError::InvalidDimensions(n)),
        }
    }
}

fn check_dims(ndim: usize) -> Result<()> {
    match ndim {
        3 | 4 => Ok(()),
        n => Err(ContargError::InvalidDimensions(n)),
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("shape", &self.data.shape())
            .field("affine", &self.affine)
            .finish()
    }
}
