use anyhow::bail;
use nalgebra_sparse::CsrMatrix;
use ndarray::{Array1, ArrayView1};
use num_traits::ToPrimitive;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use single_utilities::traits::FloatOpsTS;
use statrs::distribution::Normal;
use crate::testing::SampleTest;
use crate::testing::utils::{extract_unique_groups, get_group_indices};

pub mod likelihood;

pub mod parametric;

pub mod nonparametric;

/// Sample-based tests on expression matrices with one row per entity and one column
/// per observation. Entries absent from a sparse matrix are zeros.
pub trait MatrixStatTests<T>
where
    T: FloatOpsTS,
{
    fn wilcoxon_groups(
        &self,
        group0_indices: &[usize],
        group1_indices: &[usize],
    ) -> anyhow::Result<Array1<f64>>;

    fn t_test_raw_groups(
        &self,
        group0_indices: &[usize],
        group1_indices: &[usize],
    ) -> anyhow::Result<Array1<f64>>;

    /// Compare the two groups defined by one label per column. The lower label is group 0.
    fn differential_expression(
        &self,
        group_ids: &[usize],
        test: SampleTest,
    ) -> anyhow::Result<Array1<f64>>;
}

impl<T> MatrixStatTests<T> for CsrMatrix<T>
where
    T: FloatOpsTS,
{
    fn wilcoxon_groups(
        &self,
        group0_indices: &[usize],
        group1_indices: &[usize],
    ) -> anyhow::Result<Array1<f64>> {
        validate_groups(self.ncols(), group0_indices, group1_indices, 1)?;
        let normal = Normal::new(0.0, 1.0)?;
        map_rows(self, group0_indices, group1_indices, |x, y| {
            nonparametric::rank_sum_p_value(x, y, &normal)
        })
    }

    fn t_test_raw_groups(
        &self,
        group0_indices: &[usize],
        group1_indices: &[usize],
    ) -> anyhow::Result<Array1<f64>> {
        validate_groups(self.ncols(), group0_indices, group1_indices, 2)?;
        map_rows(self, group0_indices, group1_indices, parametric::welch_from_samples)
    }

    fn differential_expression(
        &self,
        group_ids: &[usize],
        test: SampleTest,
    ) -> anyhow::Result<Array1<f64>> {
        if group_ids.len() != self.ncols() {
            bail!(
                "Length mismatch: {} group labels for {} columns",
                group_ids.len(),
                self.ncols()
            );
        }
        let unique_groups = extract_unique_groups(group_ids);
        if unique_groups.len() != 2 {
            bail!(
                "Exactly two groups are required, found {}",
                unique_groups.len()
            );
        }

        let (group0_indices, group1_indices) = get_group_indices(group_ids, &unique_groups);
        log::debug!(
            "differential_expression with {:?}: {} entities, {} vs {} observations",
            test,
            self.nrows(),
            group0_indices.len(),
            group1_indices.len()
        );

        match test {
            SampleTest::Wilcoxon => self.wilcoxon_groups(&group0_indices, &group1_indices),
            SampleTest::WelchT => self.t_test_raw_groups(&group0_indices, &group1_indices),
        }
    }
}

fn validate_groups(
    ncols: usize,
    group0_indices: &[usize],
    group1_indices: &[usize],
    min_size: usize,
) -> anyhow::Result<()> {
    for (name, indices) in [("group 0", group0_indices), ("group 1", group1_indices)] {
        if indices.len() < min_size {
            bail!(
                "{} has {} observations, at least {} required",
                name,
                indices.len(),
                min_size
            );
        }
        if let Some(&col) = indices.iter().find(|&&col| col >= ncols) {
            bail!("{} index {} out of bounds for {} columns", name, col, ncols);
        }
    }
    Ok(())
}

fn map_rows<T, F>(
    matrix: &CsrMatrix<T>,
    group0_indices: &[usize],
    group1_indices: &[usize],
    test: F,
) -> anyhow::Result<Array1<f64>>
where
    T: FloatOpsTS,
    F: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Sync,
{
    let ncols = matrix.ncols();
    let p_values = (0..matrix.nrows())
        .into_par_iter()
        .map(|row_idx| -> anyhow::Result<f64> {
            let row = matrix.row(row_idx);
            let mut dense = vec![0.0; ncols];
            for (&col, value) in row.col_indices().iter().zip(row.values()) {
                let value = ToPrimitive::to_f64(value).ok_or_else(|| {
                    anyhow::anyhow!("Entry ({}, {}) is not representable as f64", row_idx, col)
                })?;
                if !value.is_finite() {
                    bail!("Non-finite entry at ({}, {}): {}", row_idx, col, value);
                }
                dense[col] = value;
            }

            let group0: Vec<f64> = group0_indices.iter().map(|&c| dense[c]).collect();
            let group1: Vec<f64> = group1_indices.iter().map(|&c| dense[c]).collect();
            Ok(test(ArrayView1::from(&group0[..]), ArrayView1::from(&group1[..])))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Array1::from_vec(p_values))
}
