use approx::assert_relative_eq;
use de_stats::calibration::ks_test_uniform;
use de_stats::testing::{
    likelihood_ratio_test, t_test_moments, t_test_raw, t_test_raw_concatenated, two_coef_z_test,
    wald_test, wilcoxon, wilcoxon_concatenated, MatrixStatTests, SampleTest,
};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{array, Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn assert_in_unit_interval(p_values: &Array1<f64>) {
    for &p in p_values {
        assert!((0.0..=1.0).contains(&p), "p-value {} outside [0, 1]", p);
    }
}

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize, shift: f64) -> Array2<f64> {
    let normal = Normal::new(shift, 1.0).unwrap();
    Array2::from_shape_fn((rows, cols), |_| normal.sample(rng))
}

#[cfg(test)]
mod likelihood_ratio {
    use super::*;

    #[test]
    fn deviance_of_ten_on_three_df() {
        let p = likelihood_ratio_test(&[5.0], &[0.0], 3usize, 0usize).unwrap();
        assert_eq!(p.len(), 1);
        assert_relative_eq!(p[0], 0.018566, epsilon = 1e-5);
    }

    #[test]
    fn chi_square_critical_value() {
        let p = likelihood_ratio_test(3.841459 / 2.0, 0.0, 2usize, 1usize).unwrap();
        assert_relative_eq!(p[0], 0.05, epsilon = 1e-6);
    }

    #[test]
    fn equal_df_returns_one() {
        let p = likelihood_ratio_test(&[100.0, 0.0, -3.0], 0.0, 4usize, 4usize).unwrap();
        assert_eq!(p, array![1.0, 1.0, 1.0]);
    }

    #[test]
    fn negative_deviance_is_clipped() {
        let p = likelihood_ratio_test(&[-10.0], &[-9.9999], 2usize, 0usize).unwrap();
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn per_entity_degrees_of_freedom() {
        let df_full = vec![3usize, 2, 5];
        let df_reduced = vec![0usize, 2, 4];
        let p = likelihood_ratio_test(&[5.0, 5.0, 0.5], 0.0, &df_full, &df_reduced).unwrap();

        assert_relative_eq!(p[0], 0.018566, epsilon = 1e-5);
        assert_eq!(p[1], 1.0);
        // chi-square(1) upper tail at 1.0
        assert_relative_eq!(p[2], 0.317311, epsilon = 1e-5);
    }

    #[test]
    fn larger_deviance_gives_smaller_p_value() {
        let ll_full = [0.5, 1.0, 2.0, 4.0, 8.0];
        let p = likelihood_ratio_test(&ll_full, 0.0, 2usize, 0usize).unwrap();
        assert!(p.to_vec().windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn rejects_df_full_below_df_reduced() {
        let err = likelihood_ratio_test(&[1.0, 1.0], 0.0, &[3usize, 1], 2usize).unwrap_err();
        assert!(err.to_string().contains("index 1"), "{}", err);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = likelihood_ratio_test(&[1.0, 2.0, 3.0], &[0.0, 0.0], 1usize, 0usize).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ll_full has 3"), "{}", msg);
        assert!(msg.contains("ll_reduced has 2"), "{}", msg);
    }
}

#[cfg(test)]
mod wald {
    use super::*;

    #[test]
    fn z_of_two() {
        let p = wald_test(&[2.0], &[1.0], 0.0).unwrap();
        assert_relative_eq!(p[0], 0.045500, epsilon = 1e-5);
    }

    #[test]
    fn estimate_at_null_value() {
        let p = wald_test(&[1.5], &[0.3], 1.5).unwrap();
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_standard_error() {
        let p = wald_test(&[0.0, 0.7, 0.0], &[0.0, 0.0, 0.0], &[0.0, 0.0, 0.1]).unwrap();
        assert_eq!(p, array![1.0, 0.0, 0.0]);
    }

    #[test]
    fn sign_flip_is_symmetric() {
        let mle = array![0.3, -1.2, 2.5, 4.0];
        let sd = array![0.5, 0.4, 1.0, 2.0];
        let p = wald_test(&mle, &sd, 0.0).unwrap();
        let flipped = wald_test(&mle.mapv(|v| -v), &sd, 0.0).unwrap();
        for (a, b) in p.iter().zip(flipped.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn rejects_negative_standard_error() {
        let err = wald_test(&[1.0, 1.0], &[1.0, -0.5], 0.0).unwrap_err();
        assert!(err.to_string().contains("theta_sd"), "{}", err);
    }

    #[test]
    fn extreme_statistics_stay_in_range() {
        let p = wald_test(&[1e6, -1e6, 1e-12], 1.0, 0.0).unwrap();
        assert_in_unit_interval(&p);
        assert!(p[0] < 1e-300);
        assert!(p[1] < 1e-300);
        assert_relative_eq!(p[2], 1.0, epsilon = 1e-9);
    }
}

#[cfg(test)]
mod z_test {
    use super::*;

    #[test]
    fn combined_standard_error() {
        // z = 2.0 / sqrt(0.6^2 + 0.8^2) = 2.0
        let p = two_coef_z_test(&[3.0], &[1.0], &[0.6], &[0.8]).unwrap();
        assert_relative_eq!(p[0], 0.045500, epsilon = 1e-5);
    }

    #[test]
    fn swapping_groups_is_symmetric() {
        let mle0 = array![0.1, 2.0, -3.0];
        let mle1 = array![0.5, -1.0, -2.5];
        let sd0 = array![0.2, 1.0, 0.7];
        let sd1 = array![0.3, 0.5, 0.1];
        let p = two_coef_z_test(&mle0, &mle1, &sd0, &sd1).unwrap();
        let swapped = two_coef_z_test(&mle1, &mle0, &sd1, &sd0).unwrap();
        for (a, b) in p.iter().zip(swapped.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn zero_combined_standard_error() {
        let p = two_coef_z_test(&[1.0, 1.0], &[1.0, 2.0], 0.0, 0.0).unwrap();
        assert_eq!(p, array![1.0, 0.0]);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let err = two_coef_z_test(&[1.0, 2.0], &[1.0], 1.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("Length mismatch"), "{}", err);
    }
}

#[cfg(test)]
mod rank_sum {
    use super::*;

    #[test]
    fn identical_groups() {
        let x = array![[1.0, 2.0, 3.0, 4.0, 5.0]];
        let p = wilcoxon(x.view(), x.view()).unwrap();
        assert_eq!(p[0], 1.0);
    }

    #[test]
    fn separated_groups() {
        let x0 = array![[1.0, 2.0, 3.0, 4.0, 5.0]];
        let x1 = array![[6.0, 7.0, 8.0, 9.0, 10.0]];
        let p = wilcoxon(x0.view(), x1.view()).unwrap();
        assert_relative_eq!(p[0], 0.012186, epsilon = 1e-5);
    }

    #[test]
    fn all_values_tied() {
        let x0 = array![[3.0, 3.0, 3.0], [0.0, 0.0, 0.0]];
        let x1 = array![[3.0, 3.0, 3.0], [0.0, 0.0, 0.0]];
        let p = wilcoxon(x0.view(), x1.view()).unwrap();
        assert_eq!(p, array![1.0, 1.0]);
    }

    #[test]
    fn tie_correction_shrinks_variance() {
        // Heavy ties: pooled values {0 x6, 1 x4}, U_x = 2.5, mean 12.5
        let x0 = array![[0.0, 0.0, 0.0, 0.0, 0.0]];
        let x1 = array![[0.0, 1.0, 1.0, 1.0, 1.0]];
        let p = wilcoxon(x0.view(), x1.view()).unwrap();

        // var_u = 25 / 12 * (11 - (210 + 60) / 90) = 16.6667
        let z = (10.0 - 0.5) / (25.0_f64 / 12.0 * 8.0).sqrt();
        let normal = statrs::distribution::Normal::new(0.0, 1.0).unwrap();
        let expected = 2.0 * statrs::distribution::ContinuousCDF::sf(&normal, z);
        assert_relative_eq!(p[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn unequal_group_sizes_and_swap_symmetry() {
        let mut rng = StdRng::seed_from_u64(7);
        let x0 = random_matrix(&mut rng, 50, 8, 0.0);
        let x1 = random_matrix(&mut rng, 50, 13, 0.5);
        let p = wilcoxon(x0.view(), x1.view()).unwrap();
        let swapped = wilcoxon(x1.view(), x0.view()).unwrap();

        assert_eq!(p.len(), 50);
        assert_in_unit_interval(&p);
        for (a, b) in p.iter().zip(swapped.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn concatenated_layout_matches_rows() {
        let x0 = [1.0, 4.0, 2.0, 8.0, 9.0, 7.0];
        let x1 = [3.0, 5.0, 6.0, 1.0, 2.0, 0.5];
        let flat = wilcoxon_concatenated(&x0, &x1, 2).unwrap();
        let rows = wilcoxon(
            Array2::from_shape_vec((2, 3), x0.to_vec()).unwrap().view(),
            Array2::from_shape_vec((2, 3), x1.to_vec()).unwrap().view(),
        )
        .unwrap();
        assert_eq!(flat, rows);
    }

    #[test]
    fn rejects_non_finite_observations() {
        let x0 = array![[1.0, f64::NAN]];
        let x1 = array![[1.0, 2.0]];
        assert!(wilcoxon(x0.view(), x1.view()).is_err());
    }

    #[test]
    fn rejects_uneven_concatenation() {
        let err = wilcoxon_concatenated(&[1.0; 7], &[1.0; 6], 2).unwrap_err();
        assert!(err.to_string().contains("not a multiple"), "{}", err);
    }
}

#[cfg(test)]
mod welch {
    use super::*;

    #[test]
    fn identical_groups() {
        let x = array![[1.0, 2.0, 3.0, 4.0, 5.0]];
        let p = t_test_raw(x.view(), x.view()).unwrap();
        assert_eq!(p[0], 1.0);
    }

    #[test]
    fn separated_groups() {
        // t = -5 on 8 degrees of freedom
        let x0 = array![[1.0, 2.0, 3.0, 4.0, 5.0]];
        let x1 = array![[6.0, 7.0, 8.0, 9.0, 10.0]];
        let p = t_test_raw(x0.view(), x1.view()).unwrap();
        assert_relative_eq!(p[0], 0.0010528, epsilon = 1e-6);
    }

    #[test]
    fn zero_variance_groups() {
        let x0 = array![[2.0, 2.0, 2.0], [2.0, 2.0, 2.0]];
        let x1 = array![[2.0, 2.0, 2.0], [3.0, 3.0, 3.0]];
        let p = t_test_raw(x0.view(), x1.view()).unwrap();
        assert_eq!(p, array![1.0, 0.0]);
    }

    #[test]
    fn one_constant_group() {
        let x0 = array![[5.0, 4.0, 6.0, 5.0, 5.0]];
        let x1 = array![[0.0, 0.0, 0.0, 0.0, 0.0]];
        let p = t_test_raw(x0.view(), x1.view()).unwrap();
        assert!(p[0] < 0.001);
    }

    #[test]
    fn moments_agree_with_raw_samples() {
        let mut rng = StdRng::seed_from_u64(11);
        let x0 = random_matrix(&mut rng, 20, 6, 0.0);
        let x1 = random_matrix(&mut rng, 20, 9, 0.3);
        let raw = t_test_raw(x0.view(), x1.view()).unwrap();

        let mu0 = x0.mean_axis(ndarray::Axis(1)).unwrap();
        let mu1 = x1.mean_axis(ndarray::Axis(1)).unwrap();
        let var0 = x0.var_axis(ndarray::Axis(1), 1.0);
        let var1 = x1.var_axis(ndarray::Axis(1), 1.0);
        let moments = t_test_moments(&mu0, &mu1, &var0, &var1, 6usize, 9usize).unwrap();

        for (a, b) in raw.iter().zip(moments.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn swap_symmetry() {
        let mut rng = StdRng::seed_from_u64(3);
        let x0 = random_matrix(&mut rng, 30, 4, 0.0);
        let x1 = random_matrix(&mut rng, 30, 12, 1.0);
        let p = t_test_raw(x0.view(), x1.view()).unwrap();
        let swapped = t_test_raw(x1.view(), x0.view()).unwrap();
        assert_in_unit_interval(&p);
        for (a, b) in p.iter().zip(swapped.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn concatenated_layout_matches_rows() {
        let x0 = [1.0, 4.0, 2.0, 8.0, 9.0, 7.0];
        let x1 = [3.0, 5.0, 6.0, 1.0, 2.0, 0.5];
        let flat = t_test_raw_concatenated(&x0, &x1, 3).unwrap();
        assert_eq!(flat.len(), 3);
        assert_in_unit_interval(&flat);
    }

    #[test]
    fn rejects_single_observation_groups() {
        let x0 = array![[1.0], [2.0]];
        let x1 = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(t_test_raw(x0.view(), x1.view()).is_err());
    }

    #[test]
    fn tiny_magnitudes_keep_their_p_value() {
        let unit = t_test_raw(array![[1.0, 2.0, 3.0]].view(), array![[1.0, 1.0, 1.5]].view())
            .unwrap();
        let tiny = t_test_raw(
            array![[1e-300, 2e-300, 3e-300]].view(),
            array![[1e-300, 1e-300, 1.5e-300]].view(),
        )
        .unwrap();

        // t = 1.3868 on 2.331 degrees of freedom
        assert_relative_eq!(unit[0], 0.283236, epsilon = 1e-5);
        assert_relative_eq!(tiny[0], unit[0], max_relative = 1e-9);
    }

    #[test]
    fn huge_magnitudes_keep_their_p_value() {
        let x0 = array![[1.0, 2.0, 3.0, 4.0, 5.0]];
        let x1 = array![[6.0, 7.0, 8.0, 9.0, 10.0]];
        let huge = t_test_raw((&x0 * 1e200).view(), (&x1 * 1e200).view()).unwrap();
        assert_relative_eq!(huge[0], 0.0010528, epsilon = 1e-6);

        let shifted = t_test_raw((&x0 + 1e12).view(), (&x1 + 1e12).view()).unwrap();
        assert_relative_eq!(shifted[0], 0.0010528, epsilon = 1e-6);
    }

    #[test]
    fn extreme_moments_keep_their_p_value() {
        // t = -5 on 8 degrees of freedom at both ends of the exponent range
        let p = t_test_moments(3e150, 8e150, 2.5e300, 2.5e300, 5usize, 5usize).unwrap();
        assert_relative_eq!(p[0], 0.0010528, epsilon = 1e-6);

        let p = t_test_moments(3e-150, 8e-150, 2.5e-300, 2.5e-300, 5usize, 5usize).unwrap();
        assert_relative_eq!(p[0], 0.0010528, epsilon = 1e-6);
    }

    #[test]
    fn rejects_invalid_moments() {
        assert!(t_test_moments(0.0, 0.0, -1.0, 1.0, 5usize, 5usize).is_err());
        assert!(t_test_moments(0.0, 0.0, 1.0, 1.0, 1usize, 5usize).is_err());
    }

    #[test]
    fn rejects_mismatched_entity_counts() {
        let x0 = array![[1.0, 2.0], [3.0, 4.0]];
        let x1 = array![[1.0, 2.0]];
        let err = t_test_raw(x0.view(), x1.view()).unwrap_err();
        assert!(err.to_string().contains("x0 has 2"), "{}", err);
    }
}

#[cfg(test)]
mod sparse_matrix {
    use super::*;

    /// Two entities over ten observations: the first separates the groups, the
    /// second is never observed.
    fn expression_matrix() -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(2, 10);
        for col in 0..10 {
            coo.push(0, col, (col + 1) as f64);
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn wilcoxon_matches_dense_rows() {
        let matrix = expression_matrix();
        let group0: Vec<usize> = (0..5).collect();
        let group1: Vec<usize> = (5..10).collect();
        let p = matrix.wilcoxon_groups(&group0, &group1).unwrap();

        assert_relative_eq!(p[0], 0.012186, epsilon = 1e-5);
        assert_eq!(p[1], 1.0);
    }

    #[test]
    fn t_test_matches_dense_rows() {
        let matrix = expression_matrix();
        let group0: Vec<usize> = (0..5).collect();
        let group1: Vec<usize> = (5..10).collect();
        let p = matrix.t_test_raw_groups(&group0, &group1).unwrap();

        assert_relative_eq!(p[0], 0.0010528, epsilon = 1e-6);
        assert_eq!(p[1], 1.0);
    }

    #[test]
    fn single_precision_entries() {
        let mut coo = CooMatrix::<f32>::new(1, 10);
        for col in 0..10 {
            coo.push(0, col, (col + 1) as f32);
        }
        let matrix = CsrMatrix::from(&coo);
        let group0: Vec<usize> = (0..5).collect();
        let group1: Vec<usize> = (5..10).collect();

        let p = matrix.t_test_raw_groups(&group0, &group1).unwrap();
        assert_relative_eq!(p[0], 0.0010528, epsilon = 1e-6);
        let p = matrix.wilcoxon_groups(&group0, &group1).unwrap();
        assert_relative_eq!(p[0], 0.012186, epsilon = 1e-5);
    }

    #[test]
    fn differential_expression_from_labels() {
        let matrix = expression_matrix();
        let labels = [4, 4, 4, 4, 4, 9, 9, 9, 9, 9];
        let wilcoxon_p = matrix
            .differential_expression(&labels, SampleTest::Wilcoxon)
            .unwrap();
        let welch_p = matrix
            .differential_expression(&labels, SampleTest::WelchT)
            .unwrap();

        assert_relative_eq!(wilcoxon_p[0], 0.012186, epsilon = 1e-5);
        assert_relative_eq!(welch_p[0], 0.0010528, epsilon = 1e-6);
    }

    #[test]
    fn rejects_more_than_two_groups() {
        let matrix = expression_matrix();
        let labels = [0, 0, 0, 1, 1, 1, 2, 2, 2, 2];
        assert!(
            matrix
                .differential_expression(&labels, SampleTest::Wilcoxon)
                .is_err()
        );
    }

    #[test]
    fn rejects_out_of_bounds_columns() {
        let matrix = expression_matrix();
        let err = matrix.wilcoxon_groups(&[0, 1], &[2, 10]).unwrap_err();
        assert!(err.to_string().contains("out of bounds"), "{}", err);
    }
}

#[cfg(test)]
mod goodness_of_fit {
    use super::*;

    #[test]
    fn evenly_spaced_sample_fits() {
        let n = 500;
        let samples = Array1::from_shape_fn(n, |i| (i as f64 + 0.5) / n as f64);
        let result = ks_test_uniform(samples.view()).unwrap();
        assert_relative_eq!(result.statistic, 0.5 / n as f64, epsilon = 1e-12);
        assert!(result.p_value > 0.99);
    }

    #[test]
    fn degenerate_sample_is_rejected() {
        let samples = Array1::from_elem(200, 0.0);
        let result = ks_test_uniform(samples.view()).unwrap();
        assert_relative_eq!(result.statistic, 1.0);
        assert!(result.p_value < 1e-10);
    }

    #[test]
    fn mid_range_distance() {
        // Largest gap is the first point's 0.1 lead over the empirical CDF
        let n = 100;
        let samples = Array1::from_shape_fn(n, |i| 0.1 + 0.9 * i as f64 / n as f64);
        let result = ks_test_uniform(samples.view()).unwrap();
        assert_eq!(result.n, n);
        assert_relative_eq!(result.statistic, 0.1, epsilon = 1e-12);
        assert_relative_eq!(result.p_value, 0.256221, epsilon = 1e-5);
    }

    #[test]
    fn empty_sample_is_an_error() {
        let samples: Array1<f64> = Array1::zeros(0);
        assert!(ks_test_uniform(samples.view()).is_err());
    }
}
