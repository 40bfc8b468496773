use nalgebra::Vector3;
use rayon::prelude::*;

use crate::error::Error;
use crate::fpfh::FpfhSet;
use crate::optim::GaussNewton;
use crate::pointcloud::PointCloud;
use crate::transform::Transform;

use super::matching::{match_features, tuple_filter};
use super::params::RegistrationParams;

const ACCUMULATION_CHUNK: usize = 256;

/// Outcome of a registration run.
///
/// `converged` is false when the solver ran out of usable correspondences
/// before finishing; the transform is then a best-effort estimate and
/// callers must not use it blindly.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Transform mapping the source cloud onto the target cloud.
    pub transform: Transform,
    pub converged: bool,
    /// Outer iterations performed.
    pub iterations: usize,
    /// Correspondences within the final distance threshold.
    pub num_inliers: usize,
    /// RMSE over those inliers.
    pub inlier_rmse: f64,
    /// Value of the robustness parameter when the solver stopped.
    pub final_mu: f64,
}

/// Fast global registration (Zhou, Park, Koltun 2016): FPFH correspondence
/// matching followed by a graduated non-convexity optimization of a scaled
/// Geman-McClure objective.
///
/// No initial alignment is required.
pub struct FastGlobalRegistration<'target> {
    pub params: RegistrationParams,
    target: &'target PointCloud,
    target_features: &'target FpfhSet,
}

impl<'target> FastGlobalRegistration<'target> {
    /// Create a new registration instance.
    ///
    /// # Arguments
    ///
    /// * params - Algorithm parameters, validated eagerly.
    /// * target - Target point cloud.
    /// * target_features - FPFH descriptors of the target cloud.
    pub fn new(
        params: RegistrationParams,
        target: &'target PointCloud,
        target_features: &'target FpfhSet,
    ) -> Result<Self, Error> {
        params.validate()?;
        if target.len() != target_features.len() {
            return Err(Error::invalid_configuration(
                "target feature count does not match the target point count",
            ));
        }

        Ok(Self {
            params,
            target,
            target_features,
        })
    }

    /// Estimate the rigid transform that aligns the source cloud to the
    /// target cloud.
    ///
    /// # Arguments
    ///
    /// * source - Source point cloud.
    /// * source_features - FPFH descriptors of the source cloud.
    pub fn align(
        &self,
        source: &PointCloud,
        source_features: &FpfhSet,
    ) -> Result<RegistrationResult, Error> {
        if source.len() != source_features.len() {
            return Err(Error::invalid_configuration(
                "source feature count does not match the source point count",
            ));
        }

        let scale = source.diameter().max(self.target.diameter());
        let max_distance = self.params.max_correspondence_distance.resolve(scale);

        let correspondences = match_features(
            source_features,
            self.target_features,
            self.params.similarity_threshold,
            self.params.mutual_filter,
        );
        log::debug!("{} candidate correspondences", correspondences.len());

        let correspondences = tuple_filter(
            &correspondences,
            source,
            self.target,
            self.params.tuple_scale,
            self.params.max_tuples,
            self.params.seed,
        );

        if correspondences.len() < self.params.min_correspondences {
            return Err(Error::DidNotConverge(format!(
                "{} correspondences after pruning, need at least {}",
                correspondences.len(),
                self.params.min_correspondences
            )));
        }

        let pairs = correspondences
            .iter()
            .map(|corr| (source.point(corr.source), self.target.point(corr.target)))
            .collect::<Vec<_>>();

        Ok(self.solve(&pairs, max_distance, scale))
    }

    /// Graduated non-convexity loop over point-to-point correspondences.
    ///
    /// mu starts at the squared cloud scale and shrinks by `gnc_factor`
    /// every `iterations_per_level` iterations toward the squared distance
    /// threshold. The (mu, T) pair is loop-local state; every iteration
    /// produces a new transform rather than mutating shared state.
    fn solve(
        &self,
        pairs: &[(Vector3<f64>, Vector3<f64>)],
        max_distance: f64,
        scale: f64,
    ) -> RegistrationResult {
        let mu_floor = max_distance * max_distance;
        let mut mu = (scale * scale).max(mu_floor);

        let mut transform = Transform::eye();
        let mut optimizer = GaussNewton::<6>::new();
        let mut converged = true;
        let mut iterations = 0;

        for iteration in 0..self.params.max_iterations {
            iterations = iteration + 1;

            if iteration > 0 && iteration % self.params.iterations_per_level == 0 {
                mu /= self.params.gnc_factor;
                if mu < mu_floor {
                    // Annealed past the inlier threshold.
                    break;
                }
            }

            // Accumulate over fixed chunks and merge in order, so the sums
            // do not depend on thread scheduling.
            let partials = pairs
                .par_chunks(ACCUMULATION_CHUNK)
                .map(|chunk| accumulate_chunk(chunk, &transform, mu))
                .collect::<Vec<_>>();
            optimizer.reset();
            for partial in &partials {
                optimizer.add(partial);
            }
            log::trace!(
                "iteration {}: mu {:.3e}, weighted msr {:.3e}",
                iteration,
                mu,
                optimizer.mean_squared_residual()
            );

            if optimizer.count() / 3 < self.params.min_correspondences {
                log::warn!(
                    "only {} correspondences survive at mu = {:.3e}, stopping early",
                    optimizer.count() / 3,
                    mu
                );
                converged = false;
                break;
            }

            let update = match optimizer.solve() {
                Some(update) => update,
                None => {
                    converged = false;
                    break;
                }
            };
            transform = &Transform::from_se3_exp(&update) * &transform;

            if update.norm() < self.params.update_tolerance {
                break;
            }
        }

        let (num_inliers, inlier_rmse) = evaluate(pairs, &transform, max_distance);
        log::debug!(
            "registration stopped after {} iterations, {} inliers, rmse {:.4e}",
            iterations,
            num_inliers,
            inlier_rmse
        );

        RegistrationResult {
            transform,
            converged,
            iterations,
            num_inliers,
            inlier_rmse,
            final_mu: mu,
        }
    }
}

/// Normal-equation contributions of one chunk of correspondences at the
/// current mu level. Residuals above mu are outliers and contribute
/// nothing.
fn accumulate_chunk(
    chunk: &[(Vector3<f64>, Vector3<f64>)],
    transform: &Transform,
    mu: f64,
) -> GaussNewton<6> {
    let mut partial = GaussNewton::<6>::new();

    for (source_point, target_point) in chunk {
        let transformed = transform.transform_point(source_point);
        let residual = target_point - transformed;
        let squared_norm = residual.norm_squared();

        if squared_norm > mu {
            continue;
        }

        // Scaled Geman-McClure influence.
        let weight = (mu / (mu + squared_norm)).powi(2);
        let sqrt_weight = weight.sqrt();

        let x = transformed;
        let jacobian = [
            [1.0, 0.0, 0.0, 0.0, x[2], -x[1]],
            [0.0, 1.0, 0.0, -x[2], 0.0, x[0]],
            [0.0, 0.0, 1.0, x[1], -x[0], 0.0],
        ];
        for (component, row) in jacobian.iter().enumerate() {
            let mut weighted_row = *row;
            for value in &mut weighted_row {
                *value *= sqrt_weight;
            }
            partial.step(sqrt_weight * residual[component], &weighted_row);
        }
    }

    partial
}

/// Inlier count and RMSE of the correspondence set under a transform.
fn evaluate(
    pairs: &[(Vector3<f64>, Vector3<f64>)],
    transform: &Transform,
    max_distance: f64,
) -> (usize, f64) {
    let mut inliers = 0;
    let mut squared_sum = 0.0;
    for (source_point, target_point) in pairs {
        let squared_dist =
            (target_point - transform.transform_point(source_point)).norm_squared();
        if squared_dist <= max_distance * max_distance {
            inliers += 1;
            squared_sum += squared_dist;
        }
    }

    let rmse = if inliers > 0 {
        (squared_sum / inliers as f64).sqrt()
    } else {
        0.0
    };
    (inliers, rmse)
}

/// Registers the source cloud onto the target cloud.
///
/// # Returns
///
/// The transform mapping source points into the target frame, along with
/// convergence information.
pub fn register(
    source: &PointCloud,
    source_features: &FpfhSet,
    target: &PointCloud,
    target_features: &FpfhSet,
    params: RegistrationParams,
) -> Result<RegistrationResult, Error> {
    FastGlobalRegistration::new(params, target, target_features)?.align(source, source_features)
}
