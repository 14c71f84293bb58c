use crate::testing::utils::{check_finite, clip_probability, rows_from_concatenated};
use anyhow::bail;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use statrs::distribution::{ContinuousCDF, Normal};

/// Two-sided Wilcoxon rank-sum (Mann-Whitney U) test, one row per entity.
///
/// Uses the normal approximation to U with a continuity correction of 0.5 and the
/// tie-corrected variance. Groups whose pooled values are all identical have zero
/// variance and get a p-value of `1.0`.
///
/// # Errors
///
/// Fails if the row counts differ, either group has no columns, or any observation is
/// not finite.
pub fn wilcoxon(x0: ArrayView2<f64>, x1: ArrayView2<f64>) -> anyhow::Result<Array1<f64>> {
    if x0.nrows() != x1.nrows() {
        bail!(
            "Length mismatch: x0 has {} entities but x1 has {}",
            x0.nrows(),
            x1.nrows()
        );
    }
    if x0.ncols() == 0 || x1.ncols() == 0 {
        return Err(anyhow::anyhow!("Groups cannot be empty"));
    }
    check_finite("x0", &x0)?;
    check_finite("x1", &x1)?;
    log::debug!(
        "wilcoxon on {} entities ({} vs {} observations)",
        x0.nrows(),
        x0.ncols(),
        x1.ncols()
    );

    let normal = Normal::new(0.0, 1.0)?;
    let p_values: Vec<f64> = (0..x0.nrows())
        .into_par_iter()
        .map(|row| rank_sum_p_value(x0.row(row), x1.row(row), &normal))
        .collect();

    Ok(Array1::from_vec(p_values))
}

/// [`wilcoxon`] on flat inputs holding `n_entities` consecutive, equally sized groups.
pub fn wilcoxon_concatenated(
    x0: &[f64],
    x1: &[f64],
    n_entities: usize,
) -> anyhow::Result<Array1<f64>> {
    let x0 = rows_from_concatenated("x0", x0, n_entities)?;
    let x1 = rows_from_concatenated("x1", x1, n_entities)?;
    wilcoxon(x0, x1)
}

pub(crate) fn rank_sum_p_value(x: ArrayView1<f64>, y: ArrayView1<f64>, normal: &Normal) -> f64 {
    let nx = x.len();
    let ny = y.len();
    if nx == 0 || ny == 0 {
        return f64::NAN;
    }

    // Combine samples and assign group labels (true for x)
    let mut combined: Vec<(f64, bool)> = Vec::with_capacity(nx + ny);
    combined.extend(x.iter().map(|&v| (v, true)));
    combined.extend(y.iter().map(|&v| (v, false)));
    combined.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Average ranks over ties, accumulating sum(t^3 - t) for the variance correction
    let mut rank_sum_x = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let val = combined[i].0;
        let mut j = i + 1;
        while j < combined.len() && combined[j].0 == val {
            j += 1;
        }

        let rank = (i + j + 1) as f64 / 2.0;
        let in_x = combined[i..j].iter().filter(|(_, is_x)| *is_x).count();
        rank_sum_x += rank * in_x as f64;

        let t = (j - i) as f64;
        tie_term += t * t * t - t;
        i = j;
    }

    let (nx_f, ny_f) = (nx as f64, ny as f64);
    let total = nx_f + ny_f;
    let u_x = rank_sum_x - nx_f * (nx_f + 1.0) / 2.0;
    let mean_u = nx_f * ny_f / 2.0;

    let tie_adjustment = if total > 1.0 {
        tie_term / (total * (total - 1.0))
    } else {
        0.0
    };
    let var_u = nx_f * ny_f / 12.0 * ((total + 1.0) - tie_adjustment);
    if var_u <= 0.0 {
        return 1.0;
    }

    let z = ((u_x - mean_u).abs() - 0.5) / var_u.sqrt();
    clip_probability(2.0 * normal.sf(z))
}
