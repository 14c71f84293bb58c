//! Likelihood-ratio test for nested models.

use crate::testing::utils::{batch_len, clip_probability, Param};
use anyhow::bail;
use ndarray::{Array1, Zip};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Likelihood-ratio test of a reduced model nested in a full model.
///
/// The deviance `2 * (ll_full - ll_reduced)` is clipped at zero, since optimizer noise
/// can leave the reduced fit marginally above the full one, and referred to a
/// chi-square distribution with `df_full - df_reduced` degrees of freedom.
///
/// # Arguments
///
/// * `ll_full`, `ll_reduced` - Log-likelihoods of the full and reduced model per entity
/// * `df_full`, `df_reduced` - Parameter counts of the two models
///
/// # Returns
///
/// One upper-tail p-value per entity. Entities with `df_full == df_reduced` get `1.0`.
///
/// # Errors
///
/// Fails if per-entity arguments differ in length or if `df_full < df_reduced` anywhere.
pub fn likelihood_ratio_test<'a>(
    ll_full: impl Into<Param<'a, f64>>,
    ll_reduced: impl Into<Param<'a, f64>>,
    df_full: impl Into<Param<'a, usize>>,
    df_reduced: impl Into<Param<'a, usize>>,
) -> anyhow::Result<Array1<f64>> {
    let (ll_full, ll_reduced) = (ll_full.into(), ll_reduced.into());
    let (df_full, df_reduced) = (df_full.into(), df_reduced.into());

    let n = batch_len(&[
        ("ll_full", ll_full.len()),
        ("ll_reduced", ll_reduced.len()),
        ("df_full", df_full.len()),
        ("df_reduced", df_reduced.len()),
    ])?;
    log::debug!("likelihood_ratio_test on {} entities", n);

    let ll_full = ll_full.broadcast(n);
    let ll_reduced = ll_reduced.broadcast(n);
    let df_full = df_full.broadcast(n);
    let df_reduced = df_reduced.broadcast(n);

    if let Some((i, (&full, &reduced))) = df_full
        .iter()
        .zip(df_reduced.iter())
        .enumerate()
        .find(|(_, (full, reduced))| full < reduced)
    {
        bail!(
            "Invalid degrees of freedom at index {}: df_full ({}) < df_reduced ({})",
            i,
            full,
            reduced
        );
    }

    let p_values = Zip::from(&ll_full)
        .and(&ll_reduced)
        .and(&df_full)
        .and(&df_reduced)
        .map_collect(|&full, &reduced, &df1, &df0| {
            chi_square_upper_tail(2.0 * (full - reduced), df1 - df0)
        });

    Ok(p_values)
}

#[inline]
fn chi_square_upper_tail(deviance: f64, df: usize) -> f64 {
    if df == 0 {
        return 1.0;
    }
    if deviance.is_nan() {
        return f64::NAN;
    }
    let deviance = deviance.max(0.0);

    match ChiSquared::new(df as f64) {
        Ok(chi_dist) => clip_probability(chi_dist.sf(deviance)),
        Err(_) => 1.0,
    }
}
