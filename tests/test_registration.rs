use nalgebra::Vector3;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use fastreg::fpfh::{FpfhEstimator, FpfhSet};
use fastreg::kdtree::Neighborhood;
use fastreg::normals::NormalEstimator;
use fastreg::registration::{register, RegistrationParams};
use fastreg::{KdTree, PointCloud, Transform};

/// Surface patch over a 10 x 6 rectangle with a sinusoidal relief.
fn sample_patch(num_points: usize, seed: u8) -> PointCloud {
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

fn compute_features(cloud: &PointCloud) -> (PointCloud, FpfhSet) {
    let tree = KdTree::new(&cloud.points.view());
    let with_normals = NormalEstimator {
        neighborhood: Neighborhood::KNearest(20),
        ..Default::default()
    }
    .compute(cloud, &tree)
    .unwrap();

    let features = FpfhEstimator {
        neighborhood: Neighborhood::Radius(1.2),
        ..Default::default()
    }
    .compute(&with_normals, &tree)
    .unwrap();

    (with_normals, features)
}

#[test]
fn test_fast_global_registration() {
    let source = sample_patch(1000, 42);
    let ground_truth = Transform::from_axis_angle(
        &Vector3::z(),
        30.0_f64.to_radians(),
        &Vector3::new(5.0, 0.0, 0.0),
    );
    let target = &ground_truth * &source;

    let (source, source_features) = compute_features(&source);
    let (target, target_features) = compute_features(&target);

    let mut params = RegistrationParams::default();
    params
        .max_iterations(500)
        .max_tuples(1000)
        .similarity_threshold(0.95)
        .gnc_factor(1.4);

    let result = register(&source, &source_features, &target, &target_features, params).unwrap();
    assert!(result.converged);

    let angle_error = (result.transform.angle().to_degrees() - 30.0).abs();
    assert!(angle_error < 1.0, "rotation angle off by {angle_error}°");

    let translation_error = (result.transform.translation() - Vector3::new(5.0, 0.0, 0.0)).norm();
    assert!(
        translation_error < 0.05,
        "translation off by {translation_error}"
    );

    assert!(result.num_inliers > 0);
}

#[test]
fn test_registration_round_trip() {
    let source = sample_patch(800, 9);
    let ground_truth = Transform::from_axis_angle(
        &Vector3::new(0.1, -0.2, 1.0),
        0.35,
        &Vector3::new(-2.0, 1.0, 0.75),
    );
    let target = &ground_truth * &source;

    let (source, source_features) = compute_features(&source);
    let (target, target_features) = compute_features(&target);

    let mut params = RegistrationParams::default();
    params.max_iterations(200);

    // Forward and backward registrations should be inverses.
    let forward = register(&source, &source_features, &target, &target_features, params)
        .unwrap()
        .transform;
    let backward = register(&target, &target_features, &source, &source_features, params)
        .unwrap()
        .transform;

    let round_trip = &forward * &backward;
    assert!(round_trip.angle() < 0.01);
    assert!(round_trip.translation().norm() < 0.05);
}
