//! One-sample Kolmogorov-Smirnov test against the uniform(0, 1) distribution.

use anyhow::bail;
use ndarray::ArrayView1;

/// Outcome of a goodness-of-fit test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsResult {
    /// Largest absolute gap between the empirical and the uniform CDF.
    pub statistic: f64,
    /// Two-sided p-value of the test.
    pub p_value: f64,
    pub n: usize,
}

/// Two-sided Kolmogorov-Smirnov test of `samples` against uniform(0, 1).
///
/// The p-value comes from the asymptotic Kolmogorov distribution evaluated at
/// `(sqrt(n) + 0.12 + 0.11 / sqrt(n)) * D` (Stephens' correction), which is accurate
/// for the sample sizes used in calibration runs.
pub fn ks_test_uniform(samples: ArrayView1<f64>) -> anyhow::Result<KsResult> {
    let n = samples.len();
    if n == 0 {
        bail!("Kolmogorov-Smirnov test needs at least one sample");
    }
    if let Some((i, v)) = samples.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        bail!("Non-finite sample at index {}: {}", i, v);
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let nf = n as f64;
    let statistic = sorted
        .iter()
        .enumerate()
        .fold(0.0f64, |d_max, (i, &x)| {
            let cdf = x.clamp(0.0, 1.0);
            let d_plus = (i + 1) as f64 / nf - cdf;
            let d_minus = cdf - i as f64 / nf;
            d_max.max(d_plus).max(d_minus)
        });

    let sqrt_n = nf.sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * statistic;

    Ok(KsResult {
        statistic,
        p_value: kolmogorov_survival(lambda),
        n,
    })
}

/// `P(K > lambda)` for the Kolmogorov distribution.
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }

    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = sign * (-2.0 * k * k * lambda * lambda).exp();
        sum += term;
        if term.abs() <= 1e-12 * sum.abs() || term.abs() <= 1e-300 {
            return (2.0 * sum).clamp(0.0, 1.0);
        }
        sign = -sign;
    }

    // The series only fails to converge for lambda near zero
    1.0
}
