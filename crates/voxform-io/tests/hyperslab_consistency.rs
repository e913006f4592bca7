//! Hyperslab reads must agree with slicing the whole volume, for every
//! combination of scalar and range selections across all axes.

use ndarray::{ArrayD, IxDyn, Slice};
use tempfile::tempdir;
use voxform_core::{AxisKind, Dimension};
use voxform_io::{DataKind, Slab, VolumeDefinition, VolumeFile};

fn ramp(shape: &[usize]) -> ArrayD<f64> {
    let mut a = ArrayD::zeros(IxDyn(shape));
    for (i, v) in a.iter_mut().enumerate() {
        *v = i as f64;
    }
    a
}

fn make_store(path: &std::path::Path, dims: Vec<Dimension>, data: &ArrayD<f64>) {
    let mut f = VolumeDefinition::new(dims, DataKind::Double, DataKind::Double)
        .create(path)
        .unwrap();
    f.setup_standard_order();
    f.save_complete(data).unwrap();
}

/// Slice the expected result out of the whole buffer for one selection.
fn expected_slab(whole: &ArrayD<f64>, slab: &[Slab]) -> ArrayD<f64> {
    let mut view = whole.view();
    for (axis, sel) in slab.iter().enumerate() {
        let (start, end) = match sel {
            Slab::Full => (0, whole.shape()[axis]),
            Slab::At(k) => (*k, k + 1),
            Slab::Range { start, count } => (*start, start + count),
        };
        view.slice_axis_inplace(
            ndarray::Axis(axis),
            Slice::from(start as isize..end as isize),
        );
    }
    let mut out = view.to_owned();
    for (axis, sel) in slab.iter().enumerate().rev() {
        if matches!(sel, Slab::At(_)) {
            out = out.index_axis_move(ndarray::Axis(axis), 0);
        }
    }
    out
}

#[test]
fn slab_matches_whole_volume_for_all_combinations() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vol");
    let shape = [4usize, 5, 6];
    let data = ramp(&shape);
    let dims = vec![
        Dimension::spatial(AxisKind::X, 6, 0.0, 1.0),
        Dimension::spatial(AxisKind::Y, 5, 0.0, 1.0),
        Dimension::spatial(AxisKind::Z, 4, 0.0, 1.0),
    ];
    make_store(&path, dims, &data);

    let mut f = VolumeFile::open(&path).unwrap();
    f.setup_standard_order();
    let whole = f.load_complete().unwrap();
    assert_eq!(whole, data);

    let choices = |len: usize| {
        vec![
            Slab::Full,
            Slab::At(len / 2),
            Slab::Range {
                start: 1,
                count: len - 2,
            },
        ]
    };

    for a in choices(shape[0]) {
        for b in choices(shape[1]) {
            for c in choices(shape[2]) {
                let slab = [a, b, c];
                let got = f.load_hyperslab(&slab).unwrap();
                let expect = expected_slab(&whole, &slab);
                assert_eq!(got, expect, "selection {slab:?}");
            }
        }
    }
}

#[test]
fn slab_defaults_missing_axes_to_full_extent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vol");
    let data = ramp(&[4, 5, 6]);
    let dims = vec![
        Dimension::spatial(AxisKind::X, 6, 0.0, 1.0),
        Dimension::spatial(AxisKind::Y, 5, 0.0, 1.0),
        Dimension::spatial(AxisKind::Z, 4, 0.0, 1.0),
    ];
    make_store(&path, dims, &data);

    let mut f = VolumeFile::open(&path).unwrap();
    f.setup_standard_order();
    let got = f.load_hyperslab(&[Slab::At(2)]).unwrap();
    let expect = expected_slab(&data, &[Slab::At(2), Slab::Full, Slab::Full]);
    assert_eq!(got, expect);
}

#[test]
fn slab_round_trips_through_write() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("src");
    let dst_path = dir.path().join("dst");
    let data = ramp(&[4, 5, 6]);
    let dims = vec![
        Dimension::spatial(AxisKind::X, 6, 0.0, 1.0),
        Dimension::spatial(AxisKind::Y, 5, 0.0, 1.0),
        Dimension::spatial(AxisKind::Z, 4, 0.0, 1.0),
    ];
    make_store(&src_path, dims.clone(), &data);

    let mut src = VolumeFile::open(&src_path).unwrap();
    src.setup_standard_order();
    let slab_sel = [Slab::At(2), Slab::Full, Slab::Full];
    let plane = src.load_hyperslab(&slab_sel).unwrap();

    let mut dst = VolumeDefinition::new(dims, DataKind::Double, DataKind::Double)
        .create(&dst_path)
        .unwrap();
    dst.setup_standard_order();
    dst.save_complete(&ArrayD::zeros(IxDyn(&[4, 5, 6]))).unwrap();
    dst.save_hyperslab(&plane, &slab_sel).unwrap();
    let back = dst.load_hyperslab(&slab_sel).unwrap();
    assert_eq!(back, plane);

    // The rest of the destination is untouched.
    let whole = dst.load_complete().unwrap();
    assert_eq!(whole[IxDyn(&[2, 1, 1])], data[IxDyn(&[2, 1, 1])]);
    assert_eq!(whole[IxDyn(&[0, 1, 1])], 0.0);
}

#[test]
fn slab_consistency_with_permuted_file_order() {
    // A file stored Y-fastest still reads the same in standard order.
    let dir = tempdir().unwrap();
    let path = dir.path().join("vol");
    let data = ramp(&[4, 5, 6]);
    let dims = vec![
        Dimension::spatial(AxisKind::Y, 5, 0.0, 1.0),
        Dimension::spatial(AxisKind::Z, 4, 0.0, 1.0),
        Dimension::spatial(AxisKind::X, 6, 0.0, 1.0),
    ];
    make_store(&path, dims, &data);

    let mut f = VolumeFile::open(&path).unwrap();
    f.setup_standard_order();
    let whole = f.load_complete().unwrap();
    assert_eq!(whole, data);

    let slab = [
        Slab::Range { start: 1, count: 2 },
        Slab::At(3),
        Slab::Range { start: 2, count: 3 },
    ];
    let got = f.load_hyperslab(&slab).unwrap();
    let expect = expected_slab(&whole, &slab);
    assert_eq!(got, expect);
}
