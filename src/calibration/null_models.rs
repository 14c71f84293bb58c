//! Null-model calibration of each p-value function.
//!
//! Every routine synthesizes `n` test instances drawn exactly from the data-generating
//! process assumed by the test's null hypothesis, runs the test on the whole batch and
//! checks the resulting p-values for uniformity with a Kolmogorov-Smirnov test.

use crate::calibration::goodness::{ks_test_uniform, KsResult};
use crate::testing::{
    likelihood_ratio_test, t_test_moments, t_test_raw, two_coef_z_test, wald_test, wilcoxon,
};
use anyhow::bail;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, LogNormal, Normal};

/// Spread of the log-normal per-entity scales.
const LOG_SCALE_SD: f64 = 0.5;

/// Calibrate [`likelihood_ratio_test`] with deviances drawn from chi-square(`df`).
///
/// Each deviance is encoded as `ll_full = dev / 2`, `ll_reduced = 0` so the test
/// recovers it exactly.
pub fn calibrate_likelihood_ratio_test<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    df: usize,
) -> anyhow::Result<KsResult> {
    check_trials(n)?;
    if df == 0 {
        bail!("Likelihood-ratio calibration needs at least one degree of freedom");
    }

    let chi_square = ChiSquared::new(df as f64)?;
    let ll_full = Array1::from_shape_simple_fn(n, || chi_square.sample(rng) / 2.0);

    let p_values = likelihood_ratio_test(&ll_full, 0.0, df, 0usize)?;
    ks_test_uniform(p_values.view())
}

/// Calibrate [`wald_test`] with standard normal estimates around `theta0 = 0`.
pub fn calibrate_wald_test<R: Rng + ?Sized>(rng: &mut R, n: usize) -> anyhow::Result<KsResult> {
    check_trials(n)?;

    let standard = Normal::<f64>::new(0.0, 1.0)?;
    let theta_mle = Array1::from_shape_simple_fn(n, || standard.sample(rng));

    let p_values = wald_test(&theta_mle, 1.0, 0.0)?;
    ks_test_uniform(p_values.view())
}

/// Calibrate [`two_coef_z_test`] with two independent draws from a shared
/// per-entity posterior.
pub fn calibrate_two_coef_z_test<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
) -> anyhow::Result<KsResult> {
    check_trials(n)?;

    let (locs, scales) = draw_entity_parameters(rng, n)?;
    let standard = Normal::<f64>::new(0.0, 1.0)?;
    let theta_mle0 = &locs + &(&scales * &Array1::from_shape_simple_fn(n, || standard.sample(rng)));
    let theta_mle1 = &locs + &(&scales * &Array1::from_shape_simple_fn(n, || standard.sample(rng)));

    let p_values = two_coef_z_test(&theta_mle0, &theta_mle1, &scales, &scales)?;
    ks_test_uniform(p_values.view())
}

/// Calibrate [`wilcoxon`] with `n_test` observations per group drawn from the same
/// entity-specific normal distribution.
pub fn calibrate_wilcoxon<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    n_test: usize,
) -> anyhow::Result<KsResult> {
    check_trials(n)?;
    if n_test == 0 {
        bail!("Wilcoxon calibration needs at least one observation per group");
    }

    let (x0, x1) = draw_null_samples(rng, n, n_test)?;
    let p_values = wilcoxon(x0.view(), x1.view())?;
    ks_test_uniform(p_values.view())
}

/// Calibrate [`t_test_raw`] with `n_test` observations per group drawn from the same
/// entity-specific normal distribution.
pub fn calibrate_t_test_raw<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    n_test: usize,
) -> anyhow::Result<KsResult> {
    check_trials(n)?;
    check_group_size(n_test)?;

    let (x0, x1) = draw_null_samples(rng, n, n_test)?;
    let p_values = t_test_raw(x0.view(), x1.view())?;
    ks_test_uniform(p_values.view())
}

/// Calibrate [`t_test_moments`] with group moments drawn from their exact sampling
/// distributions under a shared normal population.
///
/// For `n_test` observations from N(loc, scale²) the sample mean is
/// N(loc, scale² / n_test) and `(n_test - 1) * var / scale²` is chi-square(n_test - 1),
/// independently of the mean.
pub fn calibrate_t_test_moments<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    n_test: usize,
) -> anyhow::Result<KsResult> {
    check_trials(n)?;
    check_group_size(n_test)?;

    let (locs, scales) = draw_entity_parameters(rng, n)?;
    let standard = Normal::<f64>::new(0.0, 1.0)?;
    let dof = (n_test - 1) as f64;
    let chi_square = ChiSquared::new(dof)?;
    let se_of_mean = &scales / (n_test as f64).sqrt();
    let variances = scales.mapv(|s| s * s);

    let mu0 = &locs + &(&se_of_mean * &Array1::from_shape_simple_fn(n, || standard.sample(rng)));
    let mu1 = &locs + &(&se_of_mean * &Array1::from_shape_simple_fn(n, || standard.sample(rng)));
    let var0 = &variances * &Array1::from_shape_simple_fn(n, || chi_square.sample(rng) / dof);
    let var1 = &variances * &Array1::from_shape_simple_fn(n, || chi_square.sample(rng) / dof);

    let p_values = t_test_moments(&mu0, &mu1, &var0, &var1, n_test, n_test)?;
    ks_test_uniform(p_values.view())
}

/// Per-entity locations ~ N(0, 1) and scales ~ LogNormal(0, 0.5).
fn draw_entity_parameters<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
) -> anyhow::Result<(Array1<f64>, Array1<f64>)> {
    let loc_dist = Normal::<f64>::new(0.0, 1.0)?;
    let scale_dist = LogNormal::<f64>::new(0.0, LOG_SCALE_SD)?;
    let locs = Array1::from_shape_simple_fn(n, || loc_dist.sample(rng));
    let scales = Array1::from_shape_simple_fn(n, || scale_dist.sample(rng));
    Ok((locs, scales))
}

/// Two `n x n_test` sample matrices whose rows share an entity-specific normal law.
fn draw_null_samples<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    n_test: usize,
) -> anyhow::Result<(Array2<f64>, Array2<f64>)> {
    let (locs, scales) = draw_entity_parameters(rng, n)?;
    let standard = Normal::<f64>::new(0.0, 1.0)?;
    let x0 = Array2::from_shape_fn((n, n_test), |(i, _)| {
        locs[i] + scales[i] * standard.sample(rng)
    });
    let x1 = Array2::from_shape_fn((n, n_test), |(i, _)| {
        locs[i] + scales[i] * standard.sample(rng)
    });
    Ok((x0, x1))
}

fn check_trials(n: usize) -> anyhow::Result<()> {
    if n == 0 {
        bail!("Calibration needs at least one trial");
    }
    Ok(())
}

fn check_group_size(n_test: usize) -> anyhow::Result<()> {
    if n_test < 2 {
        bail!(
            "Welch's t-test calibration needs at least 2 observations per group, got {}",
            n_test
        );
    }
    Ok(())
}
