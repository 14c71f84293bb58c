//! Statistical self-test of the p-value functions.
//!
//! Under data drawn from a test's null model its p-values must be uniform on `[0, 1]`.
//! Each calibration reports the Kolmogorov-Smirnov p-value of that uniformity check.
//! These diagnostics are random variables: a well-calibrated test still falls below
//! `alpha` in roughly an `alpha` fraction of runs, so a low value is flagged, not
//! treated as a failure.

use crate::testing::TestMethod;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::fmt;

pub mod goodness;
pub mod null_models;

pub use goodness::{ks_test_uniform, KsResult};
pub use null_models::{
    calibrate_likelihood_ratio_test, calibrate_t_test_moments, calibrate_t_test_raw,
    calibrate_two_coef_z_test, calibrate_wald_test, calibrate_wilcoxon,
};

pub const DEFAULT_SEED: u64 = 0x5eed_de57;

/// Settings shared by the calibration routines.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Number of synthetic null-model test instances per calibration
    pub n: usize,
    /// Observations per group for the sample-based tests
    pub n_test: usize,
    /// Degrees-of-freedom difference for the likelihood-ratio calibration
    pub df: usize,
    /// Diagnostics below this threshold are flagged
    pub alpha: f64,
    pub seed: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            n: 1000,
            n_test: 100,
            df: 3,
            alpha: 0.01,
            seed: DEFAULT_SEED,
        }
    }
}

impl CalibrationConfig {
    pub fn with_n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    pub fn with_n_test(mut self, n_test: usize) -> Self {
        self.n_test = n_test;
        self
    }

    pub fn with_df(mut self, df: usize) -> Self {
        self.df = df;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Uniformity check of one test's p-values under its null model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationDiagnostic {
    pub method: TestMethod,
    /// Kolmogorov-Smirnov distance to the uniform distribution
    pub statistic: f64,
    /// Kolmogorov-Smirnov p-value; large values indicate good calibration
    pub p_value: f64,
}

impl CalibrationDiagnostic {
    fn new(method: TestMethod, ks: KsResult) -> Self {
        CalibrationDiagnostic {
            method,
            statistic: ks.statistic,
            p_value: ks.p_value,
        }
    }

    pub fn is_flagged(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

impl fmt::Display for CalibrationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KS-test pvalue for null model match of {}: {}",
            self.method, self.p_value
        )
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub diagnostics: Vec<CalibrationDiagnostic>,
    pub alpha: f64,
}

impl CalibrationReport {
    pub fn get(&self, method: TestMethod) -> Option<&CalibrationDiagnostic> {
        self.diagnostics.iter().find(|d| d.method == method)
    }

    /// Diagnostics whose uniformity check fell below `alpha`.
    pub fn flagged(&self) -> Vec<&CalibrationDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_flagged(self.alpha))
            .collect()
    }
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

/// Calibrate one test under its null model, drawing from `rng` with `config`'s sizes.
pub fn calibrate_method<R: Rng + ?Sized>(
    rng: &mut R,
    method: TestMethod,
    config: &CalibrationConfig,
) -> anyhow::Result<CalibrationDiagnostic> {
    let ks = match method {
        TestMethod::LikelihoodRatio => calibrate_likelihood_ratio_test(rng, config.n, config.df)?,
        TestMethod::Wald => calibrate_wald_test(rng, config.n)?,
        TestMethod::TwoCoefZ => calibrate_two_coef_z_test(rng, config.n)?,
        TestMethod::Wilcoxon => calibrate_wilcoxon(rng, config.n, config.n_test)?,
        TestMethod::TTestRaw => calibrate_t_test_raw(rng, config.n, config.n_test)?,
        TestMethod::TTestMoments => calibrate_t_test_moments(rng, config.n, config.n_test)?,
    };
    Ok(CalibrationDiagnostic::new(method, ks))
}

/// Run the likelihood-ratio, Wald, z-test, Wilcoxon and raw t-test calibrations.
///
/// A single generator seeded from `config.seed` drives all five, in that order, so a
/// given configuration always reproduces the same report.
pub fn calibrate_all(config: &CalibrationConfig) -> anyhow::Result<CalibrationReport> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    log::debug!(
        "Calibrating with n={}, n_test={}, df={}, seed={}",
        config.n,
        config.n_test,
        config.df,
        config.seed
    );

    let diagnostics = [
        TestMethod::LikelihoodRatio,
        TestMethod::Wald,
        TestMethod::TwoCoefZ,
        TestMethod::Wilcoxon,
        TestMethod::TTestRaw,
    ]
    .into_iter()
    .map(|method| calibrate_method(&mut rng, method, config))
    .collect::<anyhow::Result<Vec<_>>>()?;

    for diagnostic in &diagnostics {
        log::info!("{}", diagnostic);
        if diagnostic.is_flagged(config.alpha) {
            log::warn!(
                "{} flagged: KS p = {} below alpha = {}",
                diagnostic.method,
                diagnostic.p_value,
                config.alpha
            );
        }
    }

    Ok(CalibrationReport {
        diagnostics,
        alpha: config.alpha,
    })
}

/// Run [`calibrate_all`] with default settings and `n` trials, printing each diagnostic.
pub fn calibrate_and_print(n: usize) -> anyhow::Result<CalibrationReport> {
    let report = calibrate_all(&CalibrationConfig::default().with_n(n))?;
    print!("{}", report);
    Ok(report)
}
