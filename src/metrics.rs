use crate::transform::Transform;

/// Metrics for comparing two transforms.
#[derive(Clone, Debug, Default)]
pub struct TransformMetrics {
    /// Angle between the two transforms in radians.
    pub angle: f64,
    /// Translation vector size between the two transforms.
    pub translation: f64,
}

impl TransformMetrics {
    /// Creates a new `TransformMetrics` from two transforms.
    pub fn new(lfs: &Transform, rhs: &Transform) -> Self {
        let lfs_inv = lfs.inverse();
        let diff = &lfs_inv * rhs;

        Self {
            angle: diff.angle(),
            translation: diff.translation().norm(),
        }
    }

    /// Returns the total error of the two transforms.
    pub fn total(&self) -> f64 {
        self.angle + self.translation
    }
}

impl std::fmt::Display for TransformMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "angle: {:.2}°, translation: {:.5}",
            self.angle.to_degrees(),
            self.translation
        )
    }
}
