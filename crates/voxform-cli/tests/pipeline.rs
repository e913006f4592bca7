//! End-to-end pipeline tests: volumes and transforms round-trip through
//! stores and transform files exactly as the command-line tools drive
//! them.

use ndarray::{ArrayD, IxDyn};
use tempfile::tempdir;
use voxform_core::affine::TransformParameters;
use voxform_core::resample::{resample_grid, resample_linear, uniformize};
use voxform_core::{AxisKind, Dimension, Order, Sampling, Volume};
use voxform_io::{load_volume, save_volume, xfm, XfmFile};

fn ramp_volume(shape: [usize; 3], step: [f64; 3], start: [f64; 3]) -> Volume {
    let mut data = ArrayD::zeros(IxDyn(&shape));
    for (i, v) in data.iter_mut().enumerate() {
        *v = (i % 101) as f64;
    }
    let dims = vec![
        Dimension::spatial(AxisKind::X, shape[2], start[0], step[0]),
        Dimension::spatial(AxisKind::Y, shape[1], start[1], step[1]),
        Dimension::spatial(AxisKind::Z, shape[0], start[2], step[2]),
    ];
    Volume::new(data, dims).unwrap()
}

#[test]
fn identity_transform_file_reproduces_source() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("src");
    let xfm_path = dir.path().join("id.xfm");
    let out_path = dir.path().join("out");

    let src = ramp_volume([4, 5, 6], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
    save_volume(&src_path, &src, None).unwrap();

    let mut id = XfmFile::new();
    id.append_linear(voxform_core::Affine::identity());
    id.save(&xfm_path).unwrap();

    let loaded = load_volume(&src_path).unwrap();
    let matrix = xfm::load_linear(&xfm_path).unwrap();
    let out = resample_linear(
        &loaded,
        &Sampling::like(&loaded),
        &matrix,
        Order::Nearest,
        0.0,
    )
    .unwrap();
    save_volume(&out_path, &out, Some(src_path.as_path())).unwrap();

    let back = load_volume(&out_path).unwrap();
    for (a, b) in back.data().iter().zip(loaded.data().iter()) {
        assert!((a - b).abs() < 0.01);
    }
}

#[test]
fn like_volume_controls_output_sampling() {
    let dir = tempdir().unwrap();
    let src = ramp_volume([4, 4, 4], [2.0, 2.0, 2.0], [0.0, 0.0, 0.0]);
    let like = ramp_volume([8, 8, 8], [1.0, 1.0, 1.0], [-0.5, -0.5, -0.5]);

    let xfm_path = dir.path().join("id.xfm");
    let mut id = XfmFile::new();
    id.append_linear(voxform_core::Affine::identity());
    id.save(&xfm_path).unwrap();

    let matrix = xfm::load_linear(&xfm_path).unwrap();
    let out = resample_linear(&src, &Sampling::like(&like), &matrix, Order::Linear, 0.0).unwrap();
    assert_eq!(out.spatial_shape(), [8, 8, 8]);
    assert!(
        voxform_core::geometry::frobenius_distance(
            out.voxel_to_world(),
            like.voxel_to_world()
        ) < 1e-9
    );
}

#[test]
fn scenario_transform_point_through_file() {
    let dir = tempdir().unwrap();
    let xfm_path = dir.path().join("param.xfm");

    let par = TransformParameters {
        center: [2.21, -3.765, 4.09],
        translations: [1.23, 6.4, -7.8],
        scales: [0.2, 4.3, -3.0],
        ..Default::default()
    };
    let mut file = XfmFile::new();
    file.append_linear(par);
    file.save(&xfm_path).unwrap();

    let chain = xfm::load_chain(&xfm_path).unwrap();
    let p = voxform_core::Vec3::new(6.68, 3.14, 7.00);
    let q = chain.transform_point(&p).unwrap();
    assert!((q[0] - 4.334).abs() < 1e-8);
    assert!((q[1] - 32.3265).abs() < 1e-8);
    assert!((q[2] - (-12.44)).abs() < 1e-8);

    let back = chain.inverse_transform_point(&p).unwrap();
    assert!((back[0] - 18.41).abs() < 1e-6);
    assert!((back[1] - (-3.64756)).abs() < 1e-4);
    assert!((back[2] - 0.52).abs() < 1e-6);
}

#[test]
fn grid_transform_round_trips_through_files() {
    let dir = tempdir().unwrap();
    let grid_path = dir.path().join("grid");
    let xfm_path = dir.path().join("nl.xfm");

    // Constant +1.5 world-x displacement.
    let mut grid_data = ArrayD::zeros(IxDyn(&[4, 4, 8, 3]));
    for (ix, v) in grid_data.indexed_iter_mut() {
        if ix[3] == 0 {
            *v = 1.5;
        }
    }
    let grid = Volume::new(
        grid_data,
        vec![
            Dimension::spatial(AxisKind::X, 8, 0.0, 1.5),
            Dimension::spatial(AxisKind::Y, 4, 0.0, 1.5),
            Dimension::spatial(AxisKind::Z, 4, 0.0, 1.5),
            Dimension::vector(3),
        ],
    )
    .unwrap();
    save_volume(&grid_path, &grid, None).unwrap();

    let mut file = XfmFile::new();
    file.append_linear(voxform_core::Affine::identity());
    file.append_grid("grid", false);
    file.save(&xfm_path).unwrap();

    let chain = xfm::load_chain(&xfm_path).unwrap();
    assert_eq!(chain.len(), 2);
    let (grid_vol, invert) = chain.grid_only().unwrap();
    assert!(!invert);
    assert_eq!(grid_vol.vector_length(), Some(3));

    // Point function: interior points move by the constant offset.
    let p = voxform_core::Vec3::new(4.5, 3.0, 3.0);
    let q = chain.transform_point(&p).unwrap();
    assert!((q - voxform_core::Vec3::new(6.0, 3.0, 3.0)).norm() < 1e-2);

    // Bulk path: the source on the same sampling shifts by one voxel per
    // 1.5 world units.
    let src = ramp_volume([4, 4, 8], [1.5, 1.5, 1.5], [0.0, 0.0, 0.0]);
    let out = resample_grid(&src, &chain, Order::Linear, -1.0).unwrap();
    let o = out.output.spatial_view().unwrap();
    let s = src.spatial_view().unwrap();
    for z in 0..4 {
        for y in 0..4 {
            for x in 0..7 {
                assert!(
                    (o[(z, y, x)] - s[(z, y, x + 1)]).abs() < 1e-6,
                    "at ({z},{y},{x})"
                );
            }
        }
    }
}

#[test]
fn uniformize_pipeline_is_idempotent() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("src");

    let src = ramp_volume([4, 5, 6], [2.0, 2.0, 2.0], [1.0, 2.0, 3.0]);
    save_volume(&src_path, &src, None).unwrap();
    let loaded = load_volume(&src_path).unwrap();

    let once = uniformize(&loaded, 1.0, 0.1, Order::Linear, 0.0).unwrap();
    assert_eq!(once.spatial_shape(), [8, 10, 12]);

    // Already uniform: returned unchanged, same sampling object.
    let twice = uniformize(&once, 1.0, 0.1, Order::Linear, 0.0).unwrap();
    assert_eq!(twice.data(), once.data());
    assert_eq!(twice.voxel_to_world(), once.voxel_to_world());
}
