use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_delta_kernel() {
    let cf = ConvFuncStore::delta(3, 100).unwrap();
    assert_eq!(cf.sampling(), [100, 100]);
    assert_eq!(cf.support(), [3, 3]);
    assert_eq!(cf.data()[0], 1.0);
    assert!(cf.data()[1..].iter().all(|&v| v == 0.0));

    assert_abs_diff_eq!(cf.tap(0, 0, 0), 1.0);
    assert_abs_diff_eq!(cf.tap(1, -1, 0), 0.0);
    assert_abs_diff_eq!(cf.tap(0, 0, 1), 0.0);
}

#[test]
fn test_grdsf_values() {
    // The spheroidal function is normalised to ~1 at its centre.
    assert_abs_diff_eq!(grdsf(0.0), 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(grdsf(1.0), 0.0);
    assert_abs_diff_eq!(grdsf(-1.5), 0.0);
    // Symmetric.
    assert_abs_diff_eq!(grdsf(0.3), grdsf(-0.3));
    assert_abs_diff_eq!(grdsf(0.8), grdsf(-0.8));
    // Continuous across the two approximation intervals.
    assert_abs_diff_eq!(grdsf(0.75 - 1e-9), grdsf(0.75), epsilon = 1e-3);
}

#[test]
fn test_spheroidal_kernel_shape() {
    let cf = ConvFuncStore::spheroidal(3, 100).unwrap();
    let data = cf.data();
    assert_abs_diff_eq!(data[0], 1.0, epsilon = 1e-3);

    // Monotonically decreasing out to the edge of the support.
    for pair in data[..300].windows(2) {
        assert!(pair[1] <= pair[0], "{} > {}", pair[1], pair[0]);
    }
    // Nothing beyond the support.
    assert!(data[300..].iter().all(|&v| v == 0.0));
}

#[test]
fn test_table_too_short() {
    // support 3, sampling 4: taps up to 3*4 + 2 must exist.
    let result = ConvFuncStore::new(vec![1.0; 14], [4, 4], [3, 3]);
    assert_eq!(
        result,
        Err(ResamplerError::ConvFuncTooShort {
            len: 14,
            support: 3,
            sampling: 4,
            needed: 15,
        })
    );
    assert!(ConvFuncStore::new(vec![1.0; 15], [4, 4], [3, 3]).is_ok());

    // Odd sampling rounds the half-cell reach up.
    assert!(ConvFuncStore::new(vec![1.0; 3 * 3 + 2], [3, 3], [3, 3]).is_err());
    assert!(ConvFuncStore::new(vec![1.0; 3 * 3 + 3], [3, 3], [3, 3]).is_ok());
}

#[test]
fn test_zero_sampling() {
    assert_eq!(
        ConvFuncStore::new(vec![1.0; 10], [1, 0], [1, 1]),
        Err(ResamplerError::ZeroSampling { axis: 1 })
    );
    assert!(ConvFuncStore::delta(1, 0).is_err());
    assert!(ConvFuncStore::spheroidal(1, 0).is_err());
}

#[test]
fn test_per_axis_sampling() {
    let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
    let cf = ConvFuncStore::new(data, [2, 5], [3, 2]).unwrap();
    // x: 2 * -3 + 1 = -5 -> tap 5
    assert_abs_diff_eq!(cf.tap(0, -3, 1), 5.0);
    // y: 5 * 2 - 2 = 8 -> tap 8
    assert_abs_diff_eq!(cf.tap(1, 2, -2), 8.0);
}
