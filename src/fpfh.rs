use nalgebra::Vector3;
use ndarray::prelude::*;
use rayon::prelude::*;

use crate::error::Error;
use crate::kdtree::{KdTree, Neighborhood};
use crate::normals::DegeneratePolicy;
use crate::pointcloud::PointCloud;

/// Bins per angular feature.
pub const HISTOGRAM_BINS: usize = 11;
/// Total descriptor length: three concatenated 11-bin histograms.
pub const FPFH_DIM: usize = 3 * HISTOGRAM_BINS;

/// Each 11-bin sub-histogram is normalized to this sum.
const SUB_HISTOGRAM_SUM: f64 = 100.0;

/// FPFH descriptors for a point cloud, one 33-length histogram per point,
/// indexed like the cloud.
pub struct FpfhSet {
    pub histograms: Array2<f64>,
}

impl FpfhSet {
    pub fn len(&self) -> usize {
        self.histograms.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }

    pub fn descriptor(&self, index: usize) -> ArrayView1<f64> {
        self.histograms.row(index)
    }
}

/// Fast Point Feature Histogram estimation.
///
/// Two-stage computation: a Simplified PFH (SPFH) per point from its
/// immediate pairs, then a distance-weighted pooling of neighbor SPFHs.
/// Reusing the SPFHs across overlapping neighborhoods drops the cost from
/// O(k^2) to O(k) per point.
pub struct FpfhEstimator {
    pub neighborhood: Neighborhood,
    pub degenerate: DegeneratePolicy,
}

impl Default for FpfhEstimator {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::KNearest(30),
            degenerate: DegeneratePolicy::Fallback,
        }
    }
}

impl FpfhEstimator {
    /// Compute the FPFH descriptor of every point.
    ///
    /// # Arguments
    ///
    /// * cloud - Input cloud. Must carry normals (see
    ///   [`crate::normals::NormalEstimator`]).
    /// * tree - Spatial index built over `cloud`.
    pub fn compute(&self, cloud: &PointCloud, tree: &KdTree) -> Result<FpfhSet, Error> {
        if cloud.normals.is_none() {
            return Err(Error::invalid_configuration(
                "FPFH requires per-point normals; estimate them first",
            ));
        }

        // Stage 1: neighborhoods and SPFHs, parallel over points. The
        // ordered collect keeps results independent of thread scheduling.
        let neighborhoods = (0..cloud.len())
            .into_par_iter()
            .map(|index| self.neighbors_of(cloud, tree, index))
            .collect::<Result<Vec<_>, Error>>()?;

        let spfhs = (0..cloud.len())
            .into_par_iter()
            .map(|index| spfh_at(cloud, index, &neighborhoods[index]))
            .collect::<Vec<[f64; FPFH_DIM]>>();

        // Stage 2: pool neighbor SPFHs weighted by inverse distance.
        let pooled = (0..cloud.len())
            .into_par_iter()
            .map(|index| pool_spfh(&spfhs, index, &neighborhoods[index]))
            .collect::<Vec<[f64; FPFH_DIM]>>();

        let mut histograms = Array2::<f64>::zeros((cloud.len(), FPFH_DIM));
        for (index, histogram) in pooled.iter().enumerate() {
            for (k, value) in histogram.iter().enumerate() {
                histograms[[index, k]] = *value;
            }
        }

        Ok(FpfhSet { histograms })
    }

    /// Neighbor indices and distances of a point, excluding the point
    /// itself.
    fn neighbors_of(
        &self,
        cloud: &PointCloud,
        tree: &KdTree,
        index: usize,
    ) -> Result<Vec<(usize, f64)>, Error> {
        let point = cloud.point(index);
        let query = [point[0], point[1], point[2]];

        let found = match tree.search(&query, index, &self.neighborhood) {
            Ok(found) => found,
            Err(err) => {
                return match self.degenerate {
                    DegeneratePolicy::Propagate => Err(err),
                    DegeneratePolicy::Fallback => Ok(Vec::new()),
                }
            }
        };

        let neighbors = found
            .into_iter()
            .filter(|(other, _)| *other != index)
            .map(|(other, squared_dist)| (other, squared_dist.sqrt()))
            .collect::<Vec<_>>();

        if neighbors.is_empty() {
            match self.degenerate {
                DegeneratePolicy::Propagate => {
                    return Err(Error::DegenerateNeighborhood {
                        index,
                        neighbors: 0,
                    })
                }
                DegeneratePolicy::Fallback => {
                    log::warn!(
                        "point {} has no FPFH neighbors, descriptor left empty",
                        index
                    );
                }
            }
        }

        Ok(neighbors)
    }
}

/// Simplified PFH of one point: binned angular features against each
/// neighbor, each 11-bin block normalized independently.
fn spfh_at(cloud: &PointCloud, index: usize, neighbors: &[(usize, f64)]) -> [f64; FPFH_DIM] {
    let mut histogram = [0.0; FPFH_DIM];
    let point = cloud.point(index);
    let normal = cloud.normal(index).unwrap_or_else(Vector3::z);

    for (other, _) in neighbors {
        let neighbor = cloud.point(*other);
        let neighbor_normal = cloud.normal(*other).unwrap_or_else(Vector3::z);

        if let Some((alpha, phi, theta)) = pair_features(&point, &normal, &neighbor, &neighbor_normal)
        {
            histogram[bin(alpha, -1.0, 1.0)] += 1.0;
            histogram[HISTOGRAM_BINS + bin(phi, -1.0, 1.0)] += 1.0;
            histogram[2 * HISTOGRAM_BINS
                + bin(theta, -std::f64::consts::PI, std::f64::consts::PI)] += 1.0;
        }
    }

    normalize_blocks(&mut histogram);
    histogram
}

/// FPFH(p) = SPFH(p) + (1/k) sum_q SPFH(q) / ||p - q||.
fn pool_spfh(
    spfhs: &[[f64; FPFH_DIM]],
    index: usize,
    neighbors: &[(usize, f64)],
) -> [f64; FPFH_DIM] {
    let mut pooled = spfhs[index];

    let k = neighbors.iter().filter(|(_, dist)| *dist > 0.0).count();
    if k > 0 {
        for (other, dist) in neighbors {
            if *dist <= 0.0 {
                continue;
            }
            let weight = 1.0 / (k as f64 * dist);
            for (value, neighbor_value) in pooled.iter_mut().zip(spfhs[*other].iter()) {
                *value += weight * neighbor_value;
            }
        }
    }

    normalize_blocks(&mut pooled);
    pooled
}

/// Angular features (alpha, phi, theta) of an ordered point pair in the
/// Darboux frame u = n_p, v = d x u, w = u x v.
///
/// Returns `None` for coincident points and for offsets parallel to the
/// source normal, where the frame is undefined.
fn pair_features(
    point: &Vector3<f64>,
    normal: &Vector3<f64>,
    neighbor: &Vector3<f64>,
    neighbor_normal: &Vector3<f64>,
) -> Option<(f64, f64, f64)> {
    let offset = neighbor - point;
    let distance = offset.norm();
    if distance <= f64::EPSILON {
        return None;
    }
    let direction = offset / distance;

    let u = *normal;
    let mut v = direction.cross(&u);
    let v_norm = v.norm();
    if v_norm <= f64::EPSILON {
        return None;
    }
    v /= v_norm;
    let w = u.cross(&v);

    let alpha = v.dot(neighbor_normal);
    let phi = u.dot(&direction);
    let theta = w.dot(neighbor_normal).atan2(u.dot(neighbor_normal));

    Some((alpha, phi, theta))
}

fn bin(value: f64, min: f64, max: f64) -> usize {
    let normalized = (value - min) / (max - min);
    ((normalized * HISTOGRAM_BINS as f64) as usize).min(HISTOGRAM_BINS - 1)
}

fn normalize_blocks(histogram: &mut [f64; FPFH_DIM]) {
    for block in 0..3 {
        let start = block * HISTOGRAM_BINS;
        let end = start + HISTOGRAM_BINS;
        let sum: f64 = histogram[start..end].iter().sum();
        if sum > 0.0 {
            for value in &mut histogram[start..end] {
                *value *= SUB_HISTOGRAM_SUM / sum;
            }
        }
    }
}
