//! Vector validation and similarity scoring
//!
//! All functions here are pure: scoring is a function of the inputs and the
//! configured metric, with no access to namespace state.

use crate::types::{DistanceMetric, SparseVector};
use crate::{Error, Result};

/// Validate a dense vector against the index dimension.
///
/// Rejected vectors are never coerced; a mismatch fails the whole batch
/// before any record is applied.
pub fn validate_dense(values: &[f32], expected_dim: usize) -> Result<()> {
    if values.len() != expected_dim {
        return Err(Error::DimensionMismatch {
            expected: expected_dim,
            actual: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid_request(
            "vector contains a non-finite component",
        ));
    }
    Ok(())
}

/// Validate a sparse vector: parallel lists of equal length, strictly
/// increasing indices (uniqueness), finite values.
pub fn validate_sparse(sparse: &SparseVector) -> Result<()> {
    if sparse.indices.len() != sparse.values.len() {
        return Err(Error::invalid_request(format!(
            "sparse indices/values length mismatch: {} vs {}",
            sparse.indices.len(),
            sparse.values.len()
        )));
    }
    if sparse.indices.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::invalid_request(
            "sparse indices must be strictly increasing",
        ));
    }
    if sparse.values.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid_request(
            "sparse vector contains a non-finite value",
        ));
    }
    Ok(())
}

/// Score a candidate against a query under the given metric.
///
/// Callers must have validated both vectors to the same dimension.
pub fn score(metric: DistanceMetric, query: &[f32], candidate: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Euclidean => squared_euclidean(query, candidate),
        DistanceMetric::Cosine => cosine_similarity(query, candidate),
        DistanceMetric::DotProduct => dot_product(query, candidate),
    }
}

/// Squared Euclidean distance. Lower is more similar.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Raw inner product. Higher is more similar.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine of the angle between vectors, in [-1, 1]. Higher is more similar.
///
/// A zero-magnitude vector on either side yields 0.0 rather than dividing
/// by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = dot_product(a, a).sqrt();
    let norm_b = dot_product(b, b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Inner product of two sparse vectors restricted to indices present in
/// both, via a linear merge walk over the sorted index lists.
pub fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let mut result = 0.0;
    let mut i = 0;
    let mut j = 0;

    while i < a.indices.len() && j < b.indices.len() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result += a.values[i] * b.values[j];
                i += 1;
                j += 1;
            }
        }
    }

    result
}

/// Combined score for one candidate record.
///
/// - dense query only: the metric score;
/// - dense + sparse with hybrid requested: metric score plus the sparse
///   inner product (candidates without a sparse component contribute 0);
/// - sparse query only: the sparse term alone.
pub fn score_record(
    metric: DistanceMetric,
    dense_query: Option<&[f32]>,
    sparse_query: Option<&SparseVector>,
    hybrid: bool,
    candidate_dense: &[f32],
    candidate_sparse: Option<&SparseVector>,
) -> f32 {
    let sparse_term = match (sparse_query, candidate_sparse) {
        (Some(q), Some(c)) => sparse_dot(q, c),
        _ => 0.0,
    };

    match dense_query {
        Some(query) => {
            let dense = score(metric, query, candidate_dense);
            if hybrid && sparse_query.is_some() {
                dense + sparse_term
            } else {
                dense
            }
        }
        None => sparse_term,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_dense_dimension() {
        assert!(validate_dense(&[1.0, 2.0], 2).is_ok());

        let err = validate_dense(&[1.0, 2.0, 3.0], 2).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_validate_dense_rejects_nan() {
        assert!(validate_dense(&[1.0, f32::NAN], 2).is_err());
        assert!(validate_dense(&[1.0, f32::INFINITY], 2).is_err());
    }

    #[test]
    fn test_validate_sparse() {
        let ok = SparseVector::new(vec![1, 5, 9], vec![0.5, 0.25, 1.0]);
        assert!(validate_sparse(&ok).is_ok());

        let dup = SparseVector::new(vec![1, 5, 5], vec![0.5, 0.25, 1.0]);
        assert!(validate_sparse(&dup).is_err());

        let unsorted = SparseVector::new(vec![5, 1], vec![0.5, 0.25]);
        assert!(validate_sparse(&unsorted).is_err());

        let ragged = SparseVector::new(vec![1, 2], vec![0.5]);
        assert!(validate_sparse(&ragged).is_err());
    }

    #[test]
    fn test_squared_euclidean() {
        let d = squared_euclidean(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 25.0).abs() < 1e-6);
        assert_eq!(squared_euclidean(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_known_values() {
        // Identical direction
        let s = cosine_similarity(&[1.0, 1.5], &[2.0, 3.0]);
        assert!((s - 1.0).abs() < 1e-6);

        // The concrete ordering from the query scenario
        let s2 = cosine_similarity(&[1.0, 1.5], &[2.0, 1.0]);
        assert!((s2 - 0.868_243).abs() < 1e-4);

        let s3 = cosine_similarity(&[1.0, 1.5], &[0.1, 3.0]);
        assert!((s3 - 0.849_981).abs() < 1e-4);

        // Orthogonal
        let s4 = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(s4.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_guard() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_sparse_dot_intersection_only() {
        let a = SparseVector::new(vec![0, 2, 5], vec![1.0, 2.0, 3.0]);
        let b = SparseVector::new(vec![1, 2, 5], vec![1.0, 2.0, 1.0]);
        // Shared indices 2 and 5: 2*2 + 3*1 = 7
        assert!((sparse_dot(&a, &b) - 7.0).abs() < 1e-6);

        let disjoint = SparseVector::new(vec![10, 20], vec![1.0, 1.0]);
        assert_eq!(sparse_dot(&a, &disjoint), 0.0);
    }

    #[test]
    fn test_score_record_hybrid() {
        let sparse_q = SparseVector::new(vec![3], vec![2.0]);
        let sparse_c = SparseVector::new(vec![3], vec![4.0]);

        // Dense only
        let dense_only = score_record(
            DistanceMetric::DotProduct,
            Some(&[1.0, 2.0]),
            None,
            false,
            &[2.0, 1.0],
            Some(&sparse_c),
        );
        assert!((dense_only - 4.0).abs() < 1e-6);

        // Hybrid adds the sparse inner product
        let hybrid = score_record(
            DistanceMetric::DotProduct,
            Some(&[1.0, 2.0]),
            Some(&sparse_q),
            true,
            &[2.0, 1.0],
            Some(&sparse_c),
        );
        assert!((hybrid - 12.0).abs() < 1e-6);

        // Sparse only ignores the dense component
        let sparse_only = score_record(
            DistanceMetric::DotProduct,
            None,
            Some(&sparse_q),
            false,
            &[2.0, 1.0],
            Some(&sparse_c),
        );
        assert!((sparse_only - 8.0).abs() < 1e-6);
    }
}
