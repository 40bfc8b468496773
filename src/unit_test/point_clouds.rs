use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::fpfh::{FpfhEstimator, FpfhSet};
use crate::kdtree::{KdTree, Neighborhood};
use crate::normals::NormalEstimator;
use crate::pointcloud::PointCloud;

/// Synthetic surface patch: points scattered over a 10 x 6 rectangle with a
/// gentle sinusoidal relief. The relief makes every local neighborhood
/// distinctive, so FPFH matching on the patch is well posed.
pub(crate) fn sample_wavy_patch(num_points: usize, seed: u8) -> PointCloud {
    let mut rng = SmallRng::from_seed([seed; 32]);
    let mut points = Array2::<f64>::zeros((num_points, 3));
    for mut row in points.rows_mut() {
        let x = rng.gen_range(0.0..10.0);
        let y = rng.gen_range(0.0..6.0);
        row[0] = x;
        row[1] = y;
        row[2] = 0.5 * (0.8 * x).sin() * (0.6 * y).cos();
    }
    PointCloud::from_points(points).unwrap()
}

/// Normals plus FPFH descriptors for a patch-sized cloud.
pub(crate) fn wavy_patch_features(cloud: &PointCloud) -> FpfhSet {
    let tree = KdTree::new(&cloud.points.view());
    let with_normals = NormalEstimator {
        neighborhood: Neighborhood::KNearest(20),
        ..Default::default()
    }
    .compute(cloud, &tree)
    .unwrap();

    FpfhEstimator {
        neighborhood: Neighborhood::Radius(1.2),
        ..Default::default()
    }
    .compute(&with_normals, &tree)
    .unwrap()
}
