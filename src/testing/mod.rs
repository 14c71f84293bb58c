use std::fmt;

pub mod inference;

pub mod utils;

pub use inference::likelihood::likelihood_ratio_test;
pub use inference::nonparametric::{wilcoxon, wilcoxon_concatenated};
pub use inference::parametric::{
    t_test_moments, t_test_raw, t_test_raw_concatenated, two_coef_z_test, wald_test,
};
pub use inference::MatrixStatTests;
pub use utils::Param;

/// Tests that operate on raw observations rather than fitted summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTest {
    Wilcoxon,
    WelchT, // Unequal variance
}

/// The batched p-value functions exposed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestMethod {
    LikelihoodRatio,
    Wald,
    TwoCoefZ,
    Wilcoxon,
    TTestRaw,
    TTestMoments,
}

impl TestMethod {
    /// Name of the public function implementing this test.
    pub fn function_name(&self) -> &'static str {
        match self {
            TestMethod::LikelihoodRatio => "likelihood_ratio_test",
            TestMethod::Wald => "wald_test",
            TestMethod::TwoCoefZ => "two_coef_z_test",
            TestMethod::Wilcoxon => "wilcoxon",
            TestMethod::TTestRaw => "t_test_raw",
            TestMethod::TTestMoments => "t_test_moments",
        }
    }
}

impl fmt::Display for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.function_name())
    }
}
