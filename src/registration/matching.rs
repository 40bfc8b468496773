use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::fpfh::FpfhSet;
use crate::kdtree::KdTree;
use crate::pointcloud::PointCloud;

/// A hypothesized matching pair of points between two clouds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub source: usize,
    pub target: usize,
    /// L2 distance in descriptor space.
    pub distance: f64,
}

/// Match descriptors between two clouds by nearest neighbor in the 33D
/// feature space.
///
/// # Arguments
///
/// * source, target - FPFH descriptor sets.
/// * similarity_threshold - Minimum cosine similarity between matched
///   descriptors, in [0, 1].
/// * mutual_filter - Keep only mutually-nearest pairs (cross-check).
pub fn match_features(
    source: &FpfhSet,
    target: &FpfhSet,
    similarity_threshold: f64,
    mutual_filter: bool,
) -> Vec<Correspondence> {
    if source.is_empty() || target.is_empty() {
        return Vec::new();
    }

    let target_tree = KdTree::new(&target.histograms.view());
    let source_tree = if mutual_filter {
        Some(KdTree::new(&source.histograms.view()))
    } else {
        None
    };

    let mut correspondences = Vec::new();
    for source_index in 0..source.len() {
        let query = source.descriptor(source_index).to_vec();
        let (target_index, squared_dist) = target_tree.nearest(&query);

        let similarity = cosine_similarity(
            &query,
            target.descriptor(target_index).as_slice().unwrap_or(&[]),
        );
        if similarity < similarity_threshold {
            continue;
        }

        if let Some(source_tree) = &source_tree {
            let back_query = target.descriptor(target_index).to_vec();
            let (back_index, _) = source_tree.nearest(&back_query);
            if back_index != source_index {
                continue;
            }
        }

        correspondences.push(Correspondence {
            source: source_index,
            target: target_index,
            distance: squared_dist.sqrt(),
        });
    }

    correspondences
}

/// Prune structurally inconsistent correspondences with the tuple test.
///
/// Random correspondence triplets are sampled and a triplet survives only
/// if every pairwise point distance ratio between the two clouds lies in
/// (tuple_scale, 1 / tuple_scale). Members of surviving triplets form the
/// pruned set; at most `max_tuples` triplets are collected.
pub fn tuple_filter(
    correspondences: &[Correspondence],
    source: &PointCloud,
    target: &PointCloud,
    tuple_scale: f64,
    max_tuples: usize,
    seed: u64,
) -> Vec<Correspondence> {
    if correspondences.len() < 3 {
        return correspondences.to_vec();
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut keep = vec![false; correspondences.len()];
    let mut accepted = 0;

    let trials = correspondences.len() * 100;
    for _ in 0..trials {
        if accepted >= max_tuples {
            break;
        }

        let i = rng.gen_range(0..correspondences.len());
        let j = rng.gen_range(0..correspondences.len());
        let k = rng.gen_range(0..correspondences.len());
        if i == j || j == k || i == k {
            continue;
        }

        let triplet = [&correspondences[i], &correspondences[j], &correspondences[k]];
        if tuple_is_consistent(&triplet, source, target, tuple_scale) {
            keep[i] = true;
            keep[j] = true;
            keep[k] = true;
            accepted += 1;
        }
    }

    let filtered = correspondences
        .iter()
        .zip(keep.iter())
        .filter(|(_, keep)| **keep)
        .map(|(corr, _)| *corr)
        .collect::<Vec<_>>();

    if filtered.is_empty() {
        log::warn!("tuple test rejected every correspondence, keeping the unpruned set");
        return correspondences.to_vec();
    }

    log::debug!(
        "tuple test kept {}/{} correspondences ({} tuples)",
        filtered.len(),
        correspondences.len(),
        accepted
    );
    filtered
}

fn tuple_is_consistent(
    triplet: &[&Correspondence; 3],
    source: &PointCloud,
    target: &PointCloud,
    tuple_scale: f64,
) -> bool {
    for a in 0..3 {
        let b = (a + 1) % 3;
        let source_dist =
            (source.point(triplet[a].source) - source.point(triplet[b].source)).norm();
        let target_dist =
            (target.point(triplet[a].target) - target.point(triplet[b].target)).norm();
        if target_dist <= 0.0 {
            return false;
        }

        let ratio = source_dist / target_dist;
        if ratio <= tuple_scale || ratio >= 1.0 / tuple_scale {
            return false;
        }
    }
    true
}

fn cosine_similarity(lfs: &[f64], rhs: &[f64]) -> f64 {
    let dot: f64 = lfs.iter().zip(rhs.iter()).map(|(a, b)| a * b).sum();
    let lfs_norm: f64 = lfs.iter().map(|a| a * a).sum::<f64>().sqrt();
    let rhs_norm: f64 = rhs.iter().map(|b| b * b).sum::<f64>().sqrt();
    if lfs_norm <= 0.0 || rhs_norm <= 0.0 {
        return 0.0;
    }
    dot / (lfs_norm * rhs_norm)
}
