use ndarray::prelude::*;
use ordered_float::OrderedFloat;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Error;

const LEAF_SIZE: usize = 16;

/// Neighborhood selection mode for spatial queries.
#[derive(Debug, Clone, Copy)]
pub enum Neighborhood {
    /// All points within the given radius.
    Radius(f64),
    /// The k closest points.
    KNearest(usize),
}

enum KdNode {
    Leaf {
        points: Array2<f64>,
        indices: Vec<usize>,
    },
    NonLeaf {
        middle_value: f64,
        left: Box<KdNode>,
        right: Box<KdNode>,
    },
}

/// KdTree for nearest neighbor, k-nearest and radius searches. The split
/// axis cycles with the depth, so the tree works for any point dimension;
/// the registration pipeline uses it both for 3D points and for 33D FPFH
/// descriptors.
pub struct KdTree {
    root: Box<KdNode>,
    dim: usize,
}

impl KdTree {
    /// Create a new KdTree from a set of points.
    /// The points are stored in a 2D array, where each row is a point.
    ///
    /// # Arguments
    ///
    /// * points - 2D array of points.
    pub fn new(points: &ArrayView2<f64>) -> Self {
        // Recursive creation.
        fn rec(points: &ArrayView2<f64>, mut indices: Vec<usize>, depth: usize) -> KdNode {
            // Stop recursion if this should be a leaf node.
            if indices.len() <= LEAF_SIZE {
                return KdNode::Leaf {
                    points: points.select(Axis(0), &indices),
                    indices,
                };
            }

            let k = depth % points.shape()[1];
            indices.sort_unstable_by(|idx1, idx2| {
                let a = points[[*idx1, k]];
                let b = points[[*idx2, k]];
                a.partial_cmp(&b)
                    .unwrap_or(Ordering::Equal)
                    .then(idx1.cmp(idx2))
            });

            let mid = indices.len() / 2;
            KdNode::NonLeaf {
                middle_value: points[[indices[mid], k]],
                left: Box::new(rec(points, indices[0..mid].to_vec(), depth + 1)),
                right: Box::new(rec(points, indices[mid..].to_vec(), depth + 1)),
            }
        }

        let dim = points.shape()[1];
        let indices = Vec::from_iter(0..points.shape()[0]);
        KdTree {
            root: Box::new(rec(points, indices, 0)),
            dim,
        }
    }

    /// Find the exact nearest neighbor to a query point.
    ///
    /// # Arguments
    ///
    /// * query - The query point, `dim` coordinates.
    ///
    /// # Returns
    ///
    /// A tuple containing the index of the nearest neighbor and the squared
    /// distance to it.
    pub fn nearest(&self, query: &[f64]) -> (usize, f64) {
        let mut best = (usize::MAX, f64::INFINITY);
        self.nearest_rec(&self.root, query, 0, &mut best);
        best
    }

    fn nearest_rec(&self, node: &KdNode, query: &[f64], depth: usize, best: &mut (usize, f64)) {
        match node {
            KdNode::Leaf { points, indices } => {
                for (row, &index) in points.axis_iter(Axis(0)).zip(indices.iter()) {
                    let dist = squared_distance(&row, query);
                    if dist < best.1 || (dist == best.1 && index < best.0) {
                        *best = (index, dist);
                    }
                }
            }
            KdNode::NonLeaf {
                middle_value,
                left,
                right,
            } => {
                let k = depth % self.dim;
                let diff = query[k] - middle_value;
                let (near, far) = if query[k] < *middle_value {
                    (left, right)
                } else {
                    (right, left)
                };

                self.nearest_rec(near, query, depth + 1, best);
                if diff * diff <= best.1 {
                    self.nearest_rec(far, query, depth + 1, best);
                }
            }
        }
    }

    /// Find the k nearest neighbors of a query point.
    ///
    /// # Returns
    ///
    /// Up to k (index, squared distance) pairs, ascending by distance and
    /// then by index.
    pub fn k_nearest(&self, query: &[f64], k: usize) -> Vec<(usize, f64)> {
        if k == 0 {
            return Vec::new();
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.k_nearest_rec(&self.root, query, 0, k, &mut heap);

        let mut found = heap
            .into_iter()
            .map(|(dist, index)| (index, dist.into_inner()))
            .collect::<Vec<_>>();
        found.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        found
    }

    fn k_nearest_rec(
        &self,
        node: &KdNode,
        query: &[f64],
        depth: usize,
        k: usize,
        heap: &mut BinaryHeap<(OrderedFloat<f64>, usize)>,
    ) {
        match node {
            KdNode::Leaf { points, indices } => {
                for (row, &index) in points.axis_iter(Axis(0)).zip(indices.iter()) {
                    let dist = squared_distance(&row, query);
                    heap.push((OrderedFloat(dist), index));
                    if heap.len() > k {
                        heap.pop();
                    }
                }
            }
            KdNode::NonLeaf {
                middle_value,
                left,
                right,
            } => {
                let k_axis = depth % self.dim;
                let diff = query[k_axis] - middle_value;
                let (near, far) = if query[k_axis] < *middle_value {
                    (left, right)
                } else {
                    (right, left)
                };

                self.k_nearest_rec(near, query, depth + 1, k, heap);

                let worst = heap
                    .peek()
                    .map(|(dist, _)| dist.into_inner())
                    .unwrap_or(f64::INFINITY);
                if heap.len() < k || diff * diff <= worst {
                    self.k_nearest_rec(far, query, depth + 1, k, heap);
                }
            }
        }
    }

    /// Find all points within `radius` of a query point.
    ///
    /// # Returns
    ///
    /// (index, squared distance) pairs, ascending by distance and then by
    /// index.
    pub fn radius_search(&self, query: &[f64], radius: f64) -> Vec<(usize, f64)> {
        let mut found = Vec::new();
        self.radius_rec(&self.root, query, 0, radius * radius, &mut found);
        found.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        found
    }

    fn radius_rec(
        &self,
        node: &KdNode,
        query: &[f64],
        depth: usize,
        squared_radius: f64,
        found: &mut Vec<(usize, f64)>,
    ) {
        match node {
            KdNode::Leaf { points, indices } => {
                for (row, &index) in points.axis_iter(Axis(0)).zip(indices.iter()) {
                    let dist = squared_distance(&row, query);
                    if dist <= squared_radius {
                        found.push((index, dist));
                    }
                }
            }
            KdNode::NonLeaf {
                middle_value,
                left,
                right,
            } => {
                let k = depth % self.dim;
                let diff = query[k] - middle_value;
                let (near, far) = if query[k] < *middle_value {
                    (left, right)
                } else {
                    (right, left)
                };

                self.radius_rec(near, query, depth + 1, squared_radius, found);
                if diff * diff <= squared_radius {
                    self.radius_rec(far, query, depth + 1, squared_radius, found);
                }
            }
        }
    }

    /// Query a neighborhood using the given selection mode.
    ///
    /// # Arguments
    ///
    /// * query - The query point.
    /// * query_index - Index of the query point, used for error reporting.
    /// * mode - Radius or k-nearest selection.
    pub fn search(
        &self,
        query: &[f64],
        query_index: usize,
        mode: &Neighborhood,
    ) -> Result<Vec<(usize, f64)>, Error> {
        let found = match mode {
            Neighborhood::Radius(radius) => self.radius_search(query, *radius),
            Neighborhood::KNearest(k) => self.k_nearest(query, *k),
        };

        if found.is_empty() {
            Err(Error::InsufficientNeighbors { index: query_index })
        } else {
            Ok(found)
        }
    }
}

fn squared_distance(row: &ArrayView1<f64>, query: &[f64]) -> f64 {
    row.iter()
        .zip(query.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

#[cfg(test)]
mod tests {
    use ndarray::prelude::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::{KdTree, Neighborhood};

    fn random_points(n: usize, seed: u8) -> Array2<f64> {
        let mut rng = SmallRng::from_seed([seed; 32]);
        Array2::from_shape_fn((n, 3), |_| rng.gen_range(-10.0..10.0))
    }

    fn brute_force_nearest(points: &Array2<f64>, query: &[f64]) -> (usize, f64) {
        let mut best = (usize::MAX, f64::INFINITY);
        for (index, row) in points.axis_iter(Axis(0)).enumerate() {
            let dist = row
                .iter()
                .zip(query.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>();
            if dist < best.1 {
                best = (index, dist);
            }
        }
        best
    }

    #[test]
    fn should_find_nearest_points() {
        let points = array![[1., 2., 3.], [2., 3., 4.], [5., 6., 7.], [8., 9., 1.]];
        let tree = KdTree::new(&points.view());

        let queries = [
            ([8., 9.1, 1.3], 3),
            ([5.1, 6.4, 7.], 2),
            ([1.5, 2.1, 3.3], 0),
            ([2.2, 3.1, 4.2], 1),
        ];

        for (query, expected) in queries {
            let (index, _) = tree.nearest(&query);
            assert_eq!(index, expected);
        }
    }

    #[test]
    fn should_match_brute_force() {
        let points = random_points(500, 5);
        let queries = random_points(100, 7);
        let tree = KdTree::new(&points.view());

        for query in queries.axis_iter(Axis(0)) {
            let query = query.as_slice().unwrap();
            let expected = brute_force_nearest(&points, query);
            assert_eq!(tree.nearest(query), expected);
        }
    }

    #[test]
    fn should_find_k_nearest() {
        let points = random_points(300, 11);
        let tree = KdTree::new(&points.view());
        let query = [0.5, -0.5, 0.25];

        let found = tree.k_nearest(&query, 10);
        assert_eq!(found.len(), 10);

        // Ascending distances.
        for pair in found.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }

        // The closest of the k is the overall nearest.
        assert_eq!(found[0], brute_force_nearest(&points, &query));
    }

    #[test]
    fn should_find_all_within_radius() {
        let points = random_points(400, 3);
        let tree = KdTree::new(&points.view());
        let query = [1.0, 1.0, 1.0];
        let radius = 4.0;

        let found = tree.radius_search(&query, radius);

        let expected = points
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| {
                row.iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    <= radius * radius
            })
            .count();
        assert_eq!(found.len(), expected);
        assert!(found.iter().all(|(_, dist)| *dist <= radius * radius));
    }

    #[test]
    fn empty_radius_search_is_insufficient_neighbors() {
        let points = array![[0., 0., 0.], [1., 0., 0.]];
        let tree = KdTree::new(&points.view());

        let result = tree.search(&[100., 100., 100.], 7, &Neighborhood::Radius(0.5));
        assert!(matches!(
            result,
            Err(crate::error::Error::InsufficientNeighbors { index: 7 })
        ));
    }

    #[test]
    fn should_search_high_dimensional_points() {
        let mut rng = SmallRng::from_seed([9; 32]);
        let descriptors = Array2::from_shape_fn((200, 33), |_| rng.gen_range(0.0..100.0));
        let tree = KdTree::new(&descriptors.view());

        for index in [0, 57, 140, 199] {
            let query = descriptors.row(index).to_vec();
            let (found, dist) = tree.nearest(&query);
            assert_eq!(found, index);
            assert_eq!(dist, 0.0);
        }
    }
}
