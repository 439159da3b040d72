mod common;

use approx::assert_abs_diff_eq;
use contarg::{
    center_of_mass_mm, reference_voxel_connectivity, reference_voxel_connectivity_from_paths,
    seedmap_voxel_connectivity, seedmap_voxel_connectivity_from_paths, ContargError, Image,
};
use nalgebra::{Matrix4, Vector3};
use ndarray::Array3;

use common::*;

const N_T: usize = 60;

#[test]
fn test_reference_map_is_zero_outside_mask() {
    let mask = brain_mask();
    let runs = vec![bold_run(N_T, 1), bold_run(N_T, 2)];
    let map = reference_voxel_connectivity(&runs, &mask, &reference_roi(), TR, Some(4.0), None)
        .unwrap();

    assert_eq!(map.data.shape(), &[GRID, GRID, GRID]);
    assert!(values_outside(&map, &mask).iter().all(|&v| v == 0.0));
    let inside = values_inside(&map, &mask);
    assert!(inside.iter().any(|&v| v != 0.0));
    assert!(inside.iter().all(|v| v.is_finite()));

    let roi = values_inside(&map, &reference_roi());
    let mean = roi.iter().sum::<f64>() / roi.len() as f64;
    assert!(mean > 0.0, "reference ROI mean connectivity {}", mean);
}

#[test]
fn test_single_run_in_memory_matches_single_path() {
    let dir = tempfile::tempdir().unwrap();
    let run = bold_run(N_T, 3);
    let mask = write(dir.path(), "mask.nii", &brain_mask());
    let refroi = write(dir.path(), "refroi.nii", &reference_roi());
    let bold = [write(dir.path(), "run-1_bold.nii", &run)];

    let in_memory = reference_voxel_connectivity(
        std::slice::from_ref(&run),
        &brain_mask(),
        &reference_roi(),
        TR,
        Some(4.0),
        None,
    )
    .unwrap();
    let from_path =
        reference_voxel_connectivity_from_paths(&bold, &mask, &refroi, TR, Some(4.0), None).unwrap();
    for (a, b) in in_memory.data.iter().zip(from_path.data.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }

    // a single run gives a different map than the same run stacked with another
    let stacked = reference_voxel_connectivity(
        &[run, bold_run(N_T, 5)],
        &brain_mask(),
        &reference_roi(),
        TR,
        Some(4.0),
        None,
    )
    .unwrap();
    assert!(stacked
        .data
        .iter()
        .zip(in_memory.data.iter())
        .any(|(a, b)| (a - b).abs() > 1e-6));
}

#[test]
fn test_run_order_does_not_change_reference_map() {
    let mask = brain_mask();
    let (r1, r2) = (bold_run(N_T, 1), bold_run(N_T + 10, 2));
    let forward =
        reference_voxel_connectivity(&[r1.clone(), r2.clone()], &mask, &reference_roi(), TR, Some(4.0), None)
            .unwrap();
    let backward =
        reference_voxel_connectivity(&[r2, r1], &mask, &reference_roi(), TR, Some(4.0), None)
            .unwrap();
    for (a, b) in forward.data.iter().zip(backward.data.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
}

#[test]
fn test_reference_map_from_paths_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let mask = write(dir.path(), "mask.nii", &brain_mask());
    let refroi = write(dir.path(), "refroi.nii.gz", &reference_roi());
    let bold = vec![
        write(dir.path(), "run-1_bold.nii", &bold_run(N_T, 1)),
        write(dir.path(), "run-2_bold.nii.gz", &bold_run(N_T, 2)),
    ];
    let out = dir.path().join("refvox.nii.gz");

    let map = reference_voxel_connectivity_from_paths(&bold, &mask, &refroi, TR, Some(4.0), Some(out.as_path()))
        .unwrap();
    assert!(out.exists());

    let loaded = Image::load(&out).unwrap();
    assert_eq!(loaded.data.shape(), &[GRID, GRID, GRID]);
    for (a, b) in loaded.data.iter().zip(map.data.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(loaded.affine, affine(), epsilon = 1e-6);

    let in_memory = reference_voxel_connectivity(
        &[bold_run(N_T, 1), bold_run(N_T, 2)],
        &brain_mask(),
        &reference_roi(),
        TR,
        Some(4.0),
        None,
    )
    .unwrap();
    for (a, b) in in_memory.data.iter().zip(map.data.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_seedmap_map_is_zero_outside_stimulus_roi() {
    let mask = brain_mask();
    let stim = stimulus_roi();
    let runs = vec![bold_run(N_T, 1), bold_run(N_T, 2)];
    let map = seedmap_voxel_connectivity(&runs, &mask, &seed_map(), &stim, 3, TR, Some(4.0), None)
        .unwrap();

    assert!(values_outside(&map, &stim).iter().all(|&v| v == 0.0));
    let inside = values_inside(&map, &stim);
    assert_eq!(inside.len(), 8);
    assert!(inside.iter().any(|&v| v != 0.0));
    assert!(inside.iter().all(|v| v.is_finite()));
}

#[test]
fn test_seedmap_from_paths_matches_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mask = write(dir.path(), "mask.nii", &brain_mask());
    let seedmap = write(dir.path(), "seedmap.nii", &seed_map());
    let stimroi = write(dir.path(), "stimroi.nii", &stimulus_roi());
    let bold = vec![write(dir.path(), "run-1_bold.nii", &bold_run(N_T, 4))];
    let out = dir.path().join("seedmap_vox.nii");

    let from_paths = seedmap_voxel_connectivity_from_paths(
        &bold,
        &mask,
        &seedmap,
        &stimroi,
        2,
        TR,
        Some(4.0),
        Some(out.as_path()),
    )
    .unwrap();
    assert!(out.exists());

    let in_memory = seedmap_voxel_connectivity(
        &[bold_run(N_T, 4)],
        &brain_mask(),
        &seed_map(),
        &stimulus_roi(),
        2,
        TR,
        Some(4.0),
        None,
    )
    .unwrap();
    for (a, b) in from_paths.data.iter().zip(in_memory.data.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_seed_map_inside_stimulus_roi_only_has_no_weight() {
    let runs = vec![bold_run(N_T, 1)];
    let result = seedmap_voxel_connectivity(
        &runs,
        &brain_mask(),
        &seed_map_inside_stimulus(),
        &stimulus_roi(),
        0,
        TR,
        Some(4.0),
        None,
    );
    assert!(matches!(result, Err(ContargError::ZeroWeightSum)));
}

#[test]
fn test_too_many_dummy_volumes() {
    let runs = vec![bold_run(N_T, 1)];
    let result = seedmap_voxel_connectivity(
        &runs,
        &brain_mask(),
        &seed_map(),
        &stimulus_roi(),
        N_T,
        TR,
        None,
        None,
    );
    assert!(matches!(
        result,
        Err(ContargError::TooFewTimepoints(N_T, _))
    ));
}

#[test]
fn test_invalid_inputs_are_rejected() {
    let mask = brain_mask();
    let runs = vec![bold_run(N_T, 1)];

    let result = reference_voxel_connectivity(&runs, &mask, &reference_roi(), 0.0, None, None);
    assert!(matches!(result, Err(ContargError::InvalidRepetitionTime(_))));

    let result = reference_voxel_connectivity(&[], &mask, &reference_roi(), TR, None, None);
    assert!(matches!(result, Err(ContargError::NoRuns)));

    let small = Image::new(Array3::<f64>::ones((4, 4, 4)).into_dyn(), affine());
    let result = reference_voxel_connectivity(&runs, &mask, &small, TR, None, None);
    assert!(matches!(result, Err(ContargError::GridMismatch(_, _))));

    let empty = Image::new(Array3::<f64>::zeros((GRID, GRID, GRID)).into_dyn(), affine());
    let result = reference_voxel_connectivity(&runs, &mask, &empty, TR, None, None);
    assert!(matches!(result, Err(ContargError::EmptyRegion(_))));
}

#[test]
fn test_roi_with_shifted_affine_is_rejected() {
    let mask = brain_mask();
    let runs = vec![bold_run(N_T, 1)];
    let mut shifted = reference_roi();
    shifted.affine[(0, 3)] += 50.0;
    let result = reference_voxel_connectivity(&runs, &mask, &shifted, TR, None, None);
    assert!(matches!(result, Err(ContargError::AffineMismatch(_))));

    let mut moved_run = bold_run(N_T, 2);
    moved_run.affine[(2, 3)] -= 10.0;
    let result = seedmap_voxel_connectivity(
        &[bold_run(N_T, 1), moved_run],
        &mask,
        &seed_map(),
        &stimulus_roi(),
        0,
        TR,
        Some(4.0),
        None,
    );
    assert!(matches!(result, Err(ContargError::AffineMismatch(_))));
}

#[test]
fn test_runs_on_another_grid_are_rejected() {
    let mask = brain_mask();
    let data = ndarray::Array4::<f64>::ones((GRID + 1, GRID, GRID, N_T));
    let odd_run = Image::new(data.into_dyn(), affine());
    let result = reference_voxel_connectivity(
        &[bold_run(N_T, 1), odd_run],
        &mask,
        &reference_roi(),
        TR,
        None,
        None,
    );
    assert!(matches!(result, Err(ContargError::GridMismatch(_, _))));
}

#[test]
fn test_center_of_mass_of_written_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let mut vol = Array3::<f64>::zeros((GRID, GRID, GRID));
    vol[[2, 3, 4]] = 1.0;
    let path = write(
        dir.path(),
        "cluster.nii",
        &Image::new(vol.into_dyn(), Matrix4::identity()),
    );
    let com = center_of_mass_mm(&Image::load(&path).unwrap()).unwrap();
    assert_eq!(com, Vector3::new(2.0, 3.0, 4.0));

    let cluster = Image::load(&path).unwrap();
    let mut shifted = cluster.clone();
    shifted.affine = affine();
    let com = center_of_mass_mm(&shifted).unwrap();
    assert_abs_diff_eq!(com, Vector3::new(-2.0, 0.0, 2.0), epsilon = 1e-12);
}
