//! Helpers on [`faer::Col`] state vectors: the error-weighted RMS norms used
//! for convergence and local-error tests, and the sign-change scan used by the
//! root finder.

use faer::Col;

/// Weighted squared RMS norm of `x`, with weights `|y_i| * rtol + atol_i`.
pub fn squared_norm(x: &Col<f64>, y: &Col<f64>, atol: &Col<f64>, rtol: f64) -> f64 {
    let n = x.nrows();
    assert_eq!(y.nrows(), n, "vector lengths do not match");
    assert_eq!(atol.nrows(), n, "vector lengths do not match");
    let mut acc = 0.0;
    for i in 0..n {
        let w = y[i].abs() * rtol + atol[i];
        acc += (x[i] / w) * (x[i] / w);
    }
    acc / n as f64
}

/// Weighted squared RMS norm restricted to the components where `mask` is
/// true. Used for the local error test, where algebraic components carry no
/// truncation error of their own and are left out of the weighting.
pub fn squared_norm_masked(
    x: &Col<f64>,
    y: &Col<f64>,
    atol: &Col<f64>,
    rtol: f64,
    mask: &[bool],
) -> f64 {
    let n = x.nrows();
    assert_eq!(mask.len(), n, "mask length does not match vector length");
    let mut acc = 0.0;
    let mut count = 0usize;
    for i in 0..n {
        if !mask[i] {
            continue;
        }
        let w = y[i].abs() * rtol + atol[i];
        acc += (x[i] / w) * (x[i] / w);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    acc / count as f64
}

/// Scan two event-function evaluations for sign changes.
///
/// Returns `(found_root, max_frac, index)` where `found_root` is set if any
/// component of `g1` is exactly zero, and `index` identifies the component
/// with the largest normalised crossing fraction `|g1 / (g1 - g0)|` among
/// those with `g0 * g1 < 0` (`None` when no component changed sign).
pub fn root_scan(g0: &Col<f64>, g1: &Col<f64>) -> (bool, f64, Option<usize>) {
    assert_eq!(g0.nrows(), g1.nrows(), "vector lengths do not match");
    let mut max_frac = 0.0;
    let mut max_frac_index = None;
    let mut found_root = false;
    for i in 0..g0.nrows() {
        if g1[i] == 0.0 {
            found_root = true;
        }
        if g0[i] * g1[i] < 0.0 {
            let frac = (g1[i] / (g1[i] - g0[i])).abs();
            if max_frac_index.is_none() || frac > max_frac {
                max_frac = frac;
                max_frac_index = Some(i);
            }
        }
    }
    (found_root, max_frac, max_frac_index)
}

/// True iff every entry of `x` is finite.
pub fn all_finite(x: &Col<f64>) -> bool {
    x.iter().all(|v| v.is_finite())
}

#[cfg(test)]
pub fn assert_eq_st(x: &Col<f64>, expected: &[f64], tol: f64) {
    assert_eq!(x.nrows(), expected.len(), "vector lengths do not match");
    for i in 0..x.nrows() {
        assert!(
            (x[i] - expected[i]).abs() < tol,
            "element {} mismatch: {} vs {}",
            i,
            x[i],
            expected[i]
        );
    }
}
