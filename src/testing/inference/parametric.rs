//! Parametric tests: Wald, two-coefficient z-test and Welch's t-test.
//!
//! The Wald and z-tests consume fitted estimates and their standard errors. The t-tests
//! either take raw observations or precomputed group moments; both paths share the same
//! Welch kernel.

use crate::testing::utils::{
    batch_len, check_finite, check_non_negative, clip_probability, rows_from_concatenated,
    safe_div, Param,
};
use anyhow::bail;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Wald test of `H0: theta = theta0` for a scalar parameter per entity.
///
/// Uses `z = (theta_mle - theta0) / theta_sd` against a standard normal, two-sided.
/// A zero standard error yields `1.0` when the estimate equals `theta0` and `0.0` otherwise.
///
/// # Errors
///
/// Fails on mismatched lengths or negative standard errors.
pub fn wald_test<'a>(
    theta_mle: impl Into<Param<'a, f64>>,
    theta_sd: impl Into<Param<'a, f64>>,
    theta0: impl Into<Param<'a, f64>>,
) -> anyhow::Result<Array1<f64>> {
    let (theta_mle, theta_sd, theta0) = (theta_mle.into(), theta_sd.into(), theta0.into());

    let n = batch_len(&[
        ("theta_mle", theta_mle.len()),
        ("theta_sd", theta_sd.len()),
        ("theta0", theta0.len()),
    ])?;
    log::debug!("wald_test on {} entities", n);

    let theta_mle = theta_mle.broadcast(n);
    let theta_sd = theta_sd.broadcast(n);
    let theta0 = theta0.broadcast(n);
    check_non_negative("theta_sd", &theta_sd.view())?;

    let normal = Normal::new(0.0, 1.0)?;
    let p_values = Zip::from(&theta_mle)
        .and(&theta_sd)
        .and(&theta0)
        .map_collect(|&mle, &sd, &null| two_sided_z_p_value(mle - null, sd, &normal));

    Ok(p_values)
}

/// Two-sided z-test for equality of two independent coefficient estimates.
///
/// The combined standard error is `sqrt(theta_sd0^2 + theta_sd1^2)`, which is only valid
/// when the two estimates are statistically independent. A zero combined standard error
/// follows the same convention as [`wald_test`].
///
/// # Errors
///
/// Fails on mismatched lengths or negative standard errors.
pub fn two_coef_z_test<'a>(
    theta_mle0: impl Into<Param<'a, f64>>,
    theta_mle1: impl Into<Param<'a, f64>>,
    theta_sd0: impl Into<Param<'a, f64>>,
    theta_sd1: impl Into<Param<'a, f64>>,
) -> anyhow::Result<Array1<f64>> {
    let (theta_mle0, theta_mle1) = (theta_mle0.into(), theta_mle1.into());
    let (theta_sd0, theta_sd1) = (theta_sd0.into(), theta_sd1.into());

    let n = batch_len(&[
        ("theta_mle0", theta_mle0.len()),
        ("theta_mle1", theta_mle1.len()),
        ("theta_sd0", theta_sd0.len()),
        ("theta_sd1", theta_sd1.len()),
    ])?;
    log::debug!("two_coef_z_test on {} entities", n);

    let theta_mle0 = theta_mle0.broadcast(n);
    let theta_mle1 = theta_mle1.broadcast(n);
    let theta_sd0 = theta_sd0.broadcast(n);
    let theta_sd1 = theta_sd1.broadcast(n);
    check_non_negative("theta_sd0", &theta_sd0.view())?;
    check_non_negative("theta_sd1", &theta_sd1.view())?;

    let normal = Normal::new(0.0, 1.0)?;
    let p_values = Zip::from(&theta_mle0)
        .and(&theta_mle1)
        .and(&theta_sd0)
        .and(&theta_sd1)
        .map_collect(|&mle0, &mle1, &sd0, &sd1| {
            two_sided_z_p_value(mle0 - mle1, sd0.hypot(sd1), &normal)
        });

    Ok(p_values)
}

/// Welch's t-test from precomputed group moments.
///
/// # Arguments
///
/// * `mu0`, `mu1` - Group means
/// * `var0`, `var1` - Unbiased sample variances
/// * `n0`, `n1` - Group sizes, at least 2 each
///
/// # Returns
///
/// Two-sided p-values. When both variances are zero the result is `1.0` for equal means
/// and `0.0` otherwise. Means whose difference overflows to infinity give `0.0`; a
/// variance so small that `var / n` underflows to zero counts as a zero variance.
pub fn t_test_moments<'a>(
    mu0: impl Into<Param<'a, f64>>,
    mu1: impl Into<Param<'a, f64>>,
    var0: impl Into<Param<'a, f64>>,
    var1: impl Into<Param<'a, f64>>,
    n0: impl Into<Param<'a, usize>>,
    n1: impl Into<Param<'a, usize>>,
) -> anyhow::Result<Array1<f64>> {
    let (mu0, mu1, var0, var1) = (mu0.into(), mu1.into(), var0.into(), var1.into());
    let (n0, n1) = (n0.into(), n1.into());

    let n = batch_len(&[
        ("mu0", mu0.len()),
        ("mu1", mu1.len()),
        ("var0", var0.len()),
        ("var1", var1.len()),
        ("n0", n0.len()),
        ("n1", n1.len()),
    ])?;
    log::debug!("t_test_moments on {} entities", n);

    let var0 = var0.broadcast(n);
    let var1 = var1.broadcast(n);
    check_non_negative("var0", &var0.view())?;
    check_non_negative("var1", &var1.view())?;

    let n0 = n0.broadcast(n);
    let n1 = n1.broadcast(n);
    for (name, sizes) in [("n0", &n0), ("n1", &n1)] {
        if let Some((i, size)) = sizes.iter().enumerate().find(|&(_, &size)| size < 2) {
            bail!("Invalid {} at index {}: {} (need at least 2 observations)", name, i, size);
        }
    }

    let mu0 = mu0.broadcast(n);
    let mu1 = mu1.broadcast(n);
    let p_values = Array1::from_shape_fn(n, |i| {
        welch_p_value(mu0[i], var0[i], n0[i] as f64, mu1[i], var1[i], n1[i] as f64)
    });

    Ok(p_values)
}

/// Welch's t-test on raw observations, one row per entity.
///
/// Group sizes are fixed across entities but may differ between `x0` and `x1`.
///
/// # Errors
///
/// Fails if the row counts differ, a group has fewer than 2 columns, or any
/// observation is not finite.
pub fn t_test_raw(x0: ArrayView2<f64>, x1: ArrayView2<f64>) -> anyhow::Result<Array1<f64>> {
    if x0.nrows() != x1.nrows() {
        bail!(
            "Length mismatch: x0 has {} entities but x1 has {}",
            x0.nrows(),
            x1.nrows()
        );
    }
    if x0.ncols() < 2 || x1.ncols() < 2 {
        bail!(
            "Welch's t-test needs at least 2 observations per group, got {} and {}",
            x0.ncols(),
            x1.ncols()
        );
    }
    check_finite("x0", &x0)?;
    check_finite("x1", &x1)?;
    log::debug!(
        "t_test_raw on {} entities ({} vs {} observations)",
        x0.nrows(),
        x0.ncols(),
        x1.ncols()
    );

    let p_values: Vec<f64> = (0..x0.nrows())
        .into_par_iter()
        .map(|i| welch_from_samples(x0.row(i), x1.row(i)))
        .collect();

    Ok(Array1::from_vec(p_values))
}

/// [`t_test_raw`] on flat inputs holding `n_entities` consecutive, equally sized groups.
pub fn t_test_raw_concatenated(
    x0: &[f64],
    x1: &[f64],
    n_entities: usize,
) -> anyhow::Result<Array1<f64>> {
    let x0 = rows_from_concatenated("x0", x0, n_entities)?;
    let x1 = rows_from_concatenated("x1", x1, n_entities)?;
    t_test_raw(x0, x1)
}

/// Welch p-value of two raw samples.
///
/// Both samples are shifted to the midrange and divided by the half-range of their
/// pooled values before any moment is taken. Welch's t and its degrees of freedom are
/// unchanged by a shared affine map, and the rescaled values lie in `[-1, 1]`, so
/// squares cannot underflow for tiny magnitudes nor overflow for huge ones.
pub(crate) fn welch_from_samples(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    if x.is_empty() || y.is_empty() {
        return f64::NAN;
    }
    let (lo, hi) = x
        .iter()
        .chain(y.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return f64::NAN;
    }

    let center = lo / 2.0 + hi / 2.0;
    let half_range = hi / 2.0 - lo / 2.0;
    if half_range == 0.0 {
        // Every observation is identical
        return 1.0;
    }

    let x = x.mapv(|v| (v - center) / half_range);
    let y = y.mapv(|v| (v - center) / half_range);
    let (nx, ny) = (x.len() as f64, y.len() as f64);
    let mean_x = x.mean().unwrap_or(f64::NAN);
    let mean_y = y.mean().unwrap_or(f64::NAN);
    welch_p_value(mean_x, x.var(1.0), nx, mean_y, y.var(1.0), ny)
}

/// Two-sided Welch p-value from group moments, with the zero-variance convention.
///
/// The squared standard errors are divided by the larger of the two before they are
/// combined, which keeps the degrees of freedom finite for any finite moments.
pub(crate) fn welch_p_value(
    mean1: f64,
    var1: f64,
    n1: f64,
    mean2: f64,
    var2: f64,
    n2: f64,
) -> f64 {
    let term1 = var1 / n1;
    let term2 = var2 / n2;
    let mean_diff = mean1 - mean2;

    if mean_diff.is_nan() || term1.is_nan() || term2.is_nan() {
        return f64::NAN;
    }

    let largest = term1.max(term2);
    if largest == 0.0 {
        return if mean_diff == 0.0 { 1.0 } else { 0.0 };
    }
    let (rel1, rel2) = (term1 / largest, term2 / largest);
    let rel_var = rel1 + rel2;

    let Some(t_stat) = safe_div(mean_diff, largest.sqrt() * rel_var.sqrt()) else {
        return if mean_diff == 0.0 { 1.0 } else { 0.0 };
    };
    if t_stat == 0.0 {
        return 1.0;
    }
    if t_stat.is_infinite() {
        return 0.0;
    }

    // Welch-Satterthwaite equation for degrees of freedom
    let df = rel_var * rel_var / (rel1 * rel1 / (n1 - 1.0) + rel2 * rel2 / (n2 - 1.0));

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => clip_probability(2.0 * t_dist.sf(t_stat.abs())),
        // df is undefined only for groups of one observation; use the normal limit
        Err(_) => match Normal::new(0.0, 1.0) {
            Ok(normal) => clip_probability(2.0 * normal.sf(t_stat.abs())),
            Err(_) => f64::NAN,
        },
    }
}

/// Two-sided normal p-value of `delta / sd`, with the zero-variance convention.
#[inline]
pub(crate) fn two_sided_z_p_value(delta: f64, sd: f64, normal: &Normal) -> f64 {
    if delta.is_nan() || sd.is_nan() {
        return f64::NAN;
    }
    match safe_div(delta, sd) {
        Some(z) => clip_probability(2.0 * normal.sf(z.abs())),
        None if delta == 0.0 => 1.0,
        None => 0.0,
    }
}
