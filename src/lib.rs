//! # de-stats
//!
//! Batched hypothesis tests forming the inference layer of a differential expression toolkit.
//!
//! Given per-entity (e.g. per-gene) summaries of fitted models, or raw observations for two
//! groups, every function returns one p-value per entity for the null hypothesis of no effect.
//! Inputs are whole arrays so that genome-scale runs with hundreds of thousands of entities
//! stay a single batched call.
//!
//! ## Core Features
//!
//! - **Likelihood-ratio test**: deviance of nested models against a chi-square reference
//! - **Wald and two-coefficient z-tests**: estimates and standard errors against a normal reference
//! - **Wilcoxon rank-sum and Welch t-tests**: raw samples, dense rows or sparse `CsrMatrix` input
//! - **Calibration**: checks that each test yields uniform p-values under its own null model
//!
//! ## Quick Start
//!
//! ```
//! use de_stats::testing::wald_test;
//!
//! let p = wald_test(&[2.0, 0.0], &[1.0, 0.0], 0.0).unwrap();
//! assert!((p[0] - 0.0455).abs() < 1e-4);
//! assert_eq!(p[1], 1.0);
//! ```
//!
//! ## Module Organization
//!
//! - **[`testing`]**: The batched p-value functions and their shared input handling
//! - **[`calibration`]**: Null-model synthesis and the uniformity self-test

pub mod testing;
pub mod calibration;
