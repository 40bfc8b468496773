use itertools::izip;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::error::Error;
use crate::kdtree::{KdTree, Neighborhood};
use crate::pointcloud::PointCloud;

const ORIENTATION_EPS: f64 = 1e-9;

/// What to do when a point's neighborhood is too small for a stable
/// estimate.
#[derive(Debug, Clone, Copy)]
pub enum DegeneratePolicy {
    /// Surface the error to the caller.
    Propagate,
    /// Substitute a best-effort value and log a warning.
    Fallback,
}

/// Per-point surface normal and curvature estimation by PCA of the local
/// neighborhood covariance.
///
/// Normals are oriented away from the cloud centroid so adjacent points do
/// not flip sign. Curvature is the smallest eigenvalue over the eigenvalue
/// sum.
pub struct NormalEstimator {
    pub neighborhood: Neighborhood,
    /// Minimum neighbor count (excluding the point itself) for a rank-3
    /// covariance.
    pub min_neighbors: usize,
    pub degenerate: DegeneratePolicy,
}

impl Default for NormalEstimator {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::KNearest(15),
            min_neighbors: 3,
            degenerate: DegeneratePolicy::Fallback,
        }
    }
}

impl NormalEstimator {
    /// Estimate normals and curvatures for every point.
    ///
    /// # Arguments
    ///
    /// * cloud - Input point cloud.
    /// * tree - Spatial index built over `cloud`.
    ///
    /// # Returns
    ///
    /// A new cloud with the same points plus normal and curvature
    /// attributes.
    pub fn compute(&self, cloud: &PointCloud, tree: &KdTree) -> Result<PointCloud, Error> {
        let centroid = cloud.centroid();

        let estimates = (0..cloud.len())
            .into_par_iter()
            .map(|index| self.normal_at(cloud, tree, index, &centroid))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut normals = Array2::<f64>::zeros((cloud.len(), 3));
        let mut curvatures = Array1::<f64>::zeros(cloud.len());
        for (mut row, out_curvature, (normal, curvature)) in
            izip!(normals.rows_mut(), curvatures.iter_mut(), estimates.iter())
        {
            row[0] = normal[0];
            row[1] = normal[1];
            row[2] = normal[2];
            *out_curvature = *curvature;
        }

        PointCloud::with_attributes(cloud.points.clone(), Some(normals), Some(curvatures))
    }

    fn normal_at(
        &self,
        cloud: &PointCloud,
        tree: &KdTree,
        index: usize,
        cloud_centroid: &Vector3<f64>,
    ) -> Result<(Vector3<f64>, f64), Error> {
        let point = cloud.point(index);
        let query = [point[0], point[1], point[2]];

        let found = match tree.search(&query, index, &self.neighborhood) {
            Ok(found) => found,
            Err(err) => return self.degenerate_fallback(index, 0, err),
        };

        let num_neighbors = found.iter().filter(|(other, _)| *other != index).count();
        if num_neighbors < self.min_neighbors {
            return self.degenerate_fallback(
                index,
                num_neighbors,
                Error::DegenerateNeighborhood {
                    index,
                    neighbors: num_neighbors,
                },
            );
        }

        let mut mean = Vector3::zeros();
        for (other, _) in &found {
            mean += cloud.point(*other);
        }
        mean /= found.len() as f64;

        let mut covariance = Matrix3::zeros();
        for (other, _) in &found {
            let offset = cloud.point(*other) - mean;
            covariance += offset * offset.transpose();
        }
        covariance /= (found.len() - 1) as f64;

        let eigen = covariance.symmetric_eigen();
        let smallest = {
            let values = &eigen.eigenvalues;
            let mut smallest = 0;
            for k in 1..3 {
                if values[k] < values[smallest] {
                    smallest = k;
                }
            }
            smallest
        };

        let mut normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();
        normal.normalize_mut();
        // Orient away from the cloud centroid. Flat clouds leave the dot
        // product near zero, so break the tie toward +Z.
        let orientation = (point - cloud_centroid).dot(&normal);
        if orientation < -ORIENTATION_EPS || (orientation.abs() <= ORIENTATION_EPS && normal[2] < 0.0)
        {
            normal = -normal;
        }

        let eigen_sum = eigen.eigenvalues.iter().sum::<f64>();
        let curvature = if eigen_sum > 0.0 {
            eigen.eigenvalues[smallest] / eigen_sum
        } else {
            0.0
        };

        Ok((normal, curvature))
    }

    fn degenerate_fallback(
        &self,
        index: usize,
        neighbors: usize,
        err: Error,
    ) -> Result<(Vector3<f64>, f64), Error> {
        match self.degenerate {
            DegeneratePolicy::Propagate => Err(err),
            DegeneratePolicy::Fallback => {
                log::warn!(
                    "degenerate neighborhood at point {} ({} neighbors), using fallback normal",
                    index,
                    neighbors
                );
                Ok((Vector3::z(), 0.0))
            }
        }
    }
}
