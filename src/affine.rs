//! Voxel-to-world transforms stored in nifti headers.
//!
//! Reading and writing go through nifti's `nalgebra_affine` support. Headers
//! whose quaternion fields nifti cannot turn into a transform fall back to the
//! base affine built from the voxel sizes.

use nalgebra::{Matrix4, Vector3};
use nifti::{NiftiHeader, XForm};
use tracing::warn;

// largest overshoot of b² + c² + d² above one that still gives a unit quaternion
const QUATERNION_TOLERANCE: f64 = f32::EPSILON as f64 * 3.0;

/// Whether nifti can build the qform transform of `header`.
fn qform_is_usable(header: &NiftiHeader) -> bool {
    let spacings_positive = header.pixdim[1..4].iter().all(|&p| p >= 0.0);
    let qfac_valid = (header.pixdim[0].abs() - 1.0).abs() < 1e-11;
    let (b, c, d) = (
        header.quatern_b as f64,
        header.quatern_c as f64,
        header.quatern_d as f64,
    );
    let unit = 1.0 - (b * b + c * c + d * d) >= -QUATERNION_TOLERANCE;
    spacings_positive && qfac_valid && unit
}

/// Best available voxel-to-world affine of a header: the sform when its code
/// is set, then the qform, then the base affine centred on the grid.
pub fn best_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code != 0 || header.qform_code == 0 {
        return header.affine::<f64>();
    }
    let mut header = header.clone();
    // an unset qfac means 1
    if header.pixdim[0] == 0.0 {
        header.pixdim[0] = 1.0;
    }
    if !qform_is_usable(&header) {
        warn!(
            "Invalid qform (pixdim {:?}); using the base affine instead",
            &header.pixdim[..4]
        );
        header.qform_code = 0;
    }
    header.affine::<f64>()
}

/// Stores `affine` in `header`, as sform and as an unused qform.
///
/// An sform code already present is kept; a header without one is marked as
/// aligned to another file.
pub fn write_affine(header: &mut NiftiHeader, affine: &Matrix4<f64>) {
    let code = match header.sform() {
        Ok(XForm::Unknown) | Err(_) => XForm::AlignedAnat,
        Ok(code) => code,
    };
    let zooms = voxel_sizes(affine);
    if zooms.iter().all(|z| z.is_finite() && *z > 0.0) {
        header.set_affine(affine);
    }
    header.set_sform(affine, code);
}

/// Voxel edge lengths in mm: the column norms of the linear part.
pub fn voxel_sizes(affine: &Matrix4<f64>) -> Vector3<f64> {
    let linear = affine.fixed_slice::<3, 3>(0, 0);
    Vector3::new(
        linear.column(0).norm(),
        linear.column(1).norm(),
        linear.column(2).norm(),
    )
}
