//! Vector operations for exact nearest-neighbor search.

use rayon::prelude::*;

/// A corpus position paired with its distance to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    pub distance: f32,
}

/// Utility struct for vector operations.
pub struct VectorOps;

impl VectorOps {
    /// Squared L2 distance. Mismatched dimensions are infinitely far apart.
    pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
    }

    /// Brute-force k nearest neighbors by squared L2 distance.
    ///
    /// Returns at most `min(k, haystack.len())` neighbors, nearest first; equal
    /// distances keep insertion order.
    pub fn nearest(haystack: &[Vec<f32>], query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || haystack.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<Neighbor> = haystack
            .par_iter()
            .enumerate()
            .map(|(id, v)| Neighbor {
                id,
                distance: Self::l2_distance_squared(v, query),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        scored
    }

    /// True when every component is zero.
    pub fn is_zero(vector: &[f32]) -> bool {
        vector.iter().all(|x| *x == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_distance_squared() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((VectorOps::l2_distance_squared(&a, &b) - 25.0).abs() < 1e-6);
        assert_eq!(VectorOps::l2_distance_squared(&a, &[1.0]), f32::INFINITY);
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let hay = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.7, 0.3],
        ];
        let res = VectorOps::nearest(&hay, &[1.0, 0.0], 2);
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].id, 1);
        assert_eq!(res[1].id, 2);
    }

    #[test]
    fn test_nearest_bounded_by_corpus() {
        let hay = vec![vec![1.0], vec![2.0]];
        assert_eq!(VectorOps::nearest(&hay, &[0.0], 10).len(), 2);
        assert!(VectorOps::nearest(&hay, &[0.0], 0).is_empty());
        assert!(VectorOps::nearest(&[], &[0.0], 3).is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let hay = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        let ids: Vec<usize> = VectorOps::nearest(&hay, &[1.0, 0.0], 3)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
