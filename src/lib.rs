//! Seed-based functional connectivity maps from fMRI runs.
//!
//! Runs are smoothed, band-passed, cleaned of the global signal and
//! standardized, then concatenated and correlated voxel by voxel with either
//! the mean series of a reference ROI ([`connectivity::reference_voxel_connectivity`])
//! or a seed-map weighted series restricted to a stimulus ROI
//! ([`connectivity::seedmap_voxel_connectivity`]).

pub mod affine;
pub mod com;
pub mod common;
pub mod connectivity;
pub mod error;
pub mod masker;
pub mod masking;
pub mod signal;
pub mod smoothing;

pub use com::center_of_mass_mm;
pub use common::Image;
pub use connectivity::{
    reference_voxel_connectivity, reference_voxel_connectivity_from_paths,
    seedmap_voxel_connectivity, seedmap_voxel_connectivity_from_paths,
};
pub use error::{ContargError, Result};
pub use masking::BrainMask;
