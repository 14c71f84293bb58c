use anyhow::{anyhow, bail};
use ndarray::{Array1, ArrayView1, ArrayView2, CowArray, Ix1};

/// A batched test argument: one value shared by every entity, or one value per entity.
#[derive(Debug, Clone)]
pub enum Param<'a, T> {
    Scalar(T),
    PerEntity(ArrayView1<'a, T>),
}

impl<'a, T: Copy> Param<'a, T> {
    /// Number of entities carried by this argument, `None` for a scalar.
    pub fn len(&self) -> Option<usize> {
        match self {
            Param::Scalar(_) => None,
            Param::PerEntity(values) => Some(values.len()),
        }
    }

    /// Expand to a length-`n` array. Per-entity values are borrowed, scalars are filled.
    pub(crate) fn broadcast(&self, n: usize) -> CowArray<'a, T, Ix1> {
        match self {
            Param::Scalar(value) => CowArray::from(Array1::from_elem(n, *value)),
            Param::PerEntity(values) => CowArray::from(values.clone()),
        }
    }
}

macro_rules! impl_param_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Param<'_, $t> {
                fn from(value: $t) -> Self {
                    Param::Scalar(value)
                }
            }

            impl<'a> From<&'a [$t]> for Param<'a, $t> {
                fn from(values: &'a [$t]) -> Self {
                    Param::PerEntity(ArrayView1::from(values))
                }
            }

            impl<'a, const N: usize> From<&'a [$t; N]> for Param<'a, $t> {
                fn from(values: &'a [$t; N]) -> Self {
                    Param::PerEntity(ArrayView1::from(&values[..]))
                }
            }

            impl<'a> From<&'a Vec<$t>> for Param<'a, $t> {
                fn from(values: &'a Vec<$t>) -> Self {
                    Param::PerEntity(ArrayView1::from(values.as_slice()))
                }
            }

            impl<'a> From<&'a Array1<$t>> for Param<'a, $t> {
                fn from(values: &'a Array1<$t>) -> Self {
                    Param::PerEntity(values.view())
                }
            }

            impl<'a> From<ArrayView1<'a, $t>> for Param<'a, $t> {
                fn from(values: ArrayView1<'a, $t>) -> Self {
                    Param::PerEntity(values)
                }
            }
        )*
    };
}

impl_param_from!(f64, usize);

/// Resolve the batch length shared by a set of named arguments.
///
/// Every per-entity argument must have the same length; scalars adapt to it.
/// A batch made only of scalars holds a single entity.
pub fn batch_len(lengths: &[(&str, Option<usize>)]) -> anyhow::Result<usize> {
    let mut resolved: Option<(&str, usize)> = None;
    for &(name, len) in lengths {
        let Some(len) = len else { continue };
        match resolved {
            None => resolved = Some((name, len)),
            Some((first, n)) if n != len => {
                bail!(
                    "Length mismatch: {} has {} entries but {} has {}",
                    first,
                    n,
                    name,
                    len
                );
            }
            Some(_) => {}
        }
    }
    Ok(resolved.map_or(1, |(_, n)| n))
}

/// Fail if any standard error or variance is negative or NaN.
pub fn check_non_negative(name: &str, values: &ArrayView1<f64>) -> anyhow::Result<()> {
    if let Some((i, v)) = values
        .iter()
        .enumerate()
        .find(|&(_, v)| v.is_nan() || *v < 0.0)
    {
        bail!("Invalid {} at index {}: {} (must be non-negative)", name, i, v);
    }
    Ok(())
}

/// Fail if any observation is NaN or infinite.
pub fn check_finite(name: &str, values: &ArrayView2<f64>) -> anyhow::Result<()> {
    if let Some(((row, col), v)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
        bail!(
            "Non-finite observation in {} at entity {}, sample {}: {}",
            name,
            row,
            col,
            v
        );
    }
    Ok(())
}

/// Division that yields `None` for a zero denominator.
///
/// Any nonzero denominator divides normally, so a subnormal one can still produce an
/// infinite quotient.
#[inline]
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Clamp a probability into `[0, 1]`, leaving NaN untouched.
#[inline]
pub fn clip_probability(p: f64) -> f64 {
    if p.is_nan() { p } else { p.clamp(0.0, 1.0) }
}

/// View a flat concatenation of `n_entities` equally sized slices as one row per entity.
pub fn rows_from_concatenated<'a>(
    name: &str,
    values: &'a [f64],
    n_entities: usize,
) -> anyhow::Result<ArrayView2<'a, f64>> {
    if n_entities == 0 {
        bail!("Number of entities must be positive");
    }
    if values.len() % n_entities != 0 {
        bail!(
            "{} has {} values, which is not a multiple of {} entities",
            name,
            values.len(),
            n_entities
        );
    }
    let per_entity = values.len() / n_entities;
    ArrayView2::from_shape((n_entities, per_entity), values)
        .map_err(|e| anyhow!("Cannot reshape {}: {}", name, e))
}

pub fn extract_unique_groups(group_ids: &[usize]) -> Vec<usize> {
    let mut unique_groups = group_ids.to_vec();
    unique_groups.sort();
    unique_groups.dedup();
    unique_groups
}

/// Get indices for each group
pub fn get_group_indices(group_ids: &[usize], unique_groups: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let group1 = unique_groups[0];
    let group2 = unique_groups[1];

    let group1_indices = group_ids.iter()
        .enumerate()
        .filter_map(|(i, &g)| if g == group1 { Some(i) } else { None })
        .collect();

    let group2_indices = group_ids.iter()
        .enumerate()
        .filter_map(|(i, &g)| if g == group2 { Some(i) } else { None })
        .collect();

    (group1_indices, group2_indices)
}
