use crate::common::Image;
use crate::error::{ContargError, Result};
use nalgebra::{Vector3, Vector4};
use ndarray::s;

/// Center of mass, in world (mm) coordinates, of the non-zero voxels of an image.
///
/// Every non-zero voxel counts once regardless of its value. For a 4D image
/// only the first volume is used. Fails with `EmptyCluster` when no voxel is
/// non-zero.
pub fn center_of_mass_mm(img: &Image) -> Result<Vector3<f64>> {
    let series = img.series4()?;
    let vol = series.slice(s![.., .., .., 0]);

    let mut total = Vector3::zeros();
    let mut count = 0usize;
    for ((i, j, k), &v) in vol.indexed_iter() {
        if v != 0.0 {
            let world = img.affine * Vector4::new(i as f64, j as f64, k as f64, 1.0);
            total += world.xyz();
            count += 1;
        }
    }
    if count == 0 {
        return Err(ContargError::EmptyCluster);
    }
    Ok(total / count as f64)
}
