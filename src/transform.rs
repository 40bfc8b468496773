use nalgebra::{
    Isometry3, Matrix3, Matrix4, Point3, Translation3, Unit, UnitQuaternion, Vector3, Vector6,
};
use ndarray::{Array2, Axis};

use std::ops;

/// Rigid transform (rotation + translation). The rotation is stored as a
/// unit quaternion, so it is a proper rotation (determinant +1) by
/// construction.
#[derive(Clone, Debug)]
pub struct Transform(Isometry3<f64>);

impl Transform {
    /// Identity transform.
    pub fn eye() -> Self {
        Self(Isometry3::identity())
    }

    /// Rotation of `angle` radians around `axis`, followed by the given
    /// translation.
    pub fn from_axis_angle(axis: &Vector3<f64>, angle: f64, translation: &Vector3<f64>) -> Self {
        Self(Isometry3::from_parts(
            Translation3::new(translation[0], translation[1], translation[2]),
            UnitQuaternion::from_axis_angle(&Unit::new_normalize(*axis), angle),
        ))
    }

    /// Exponential map of a se(3) parameter vector, translation first:
    /// `[tx, ty, tz, wx, wy, wz]`.
    pub fn from_se3_exp(params: &Vector6<f64>) -> Self {
        let translation = Translation3::new(params[0], params[1], params[2]);
        let so3 = Vector3::new(params[3], params[4], params[5]);

        Self(Isometry3::from_parts(
            translation,
            UnitQuaternion::from_scaled_axis(so3),
        ))
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f64 {
        self.0.rotation.angle()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.0.translation.vector
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        self.0.rotation.to_rotation_matrix().into_inner()
    }

    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        // Points get rotation and translation; a bare Vector3 would only be
        // rotated.
        self.0.transform_point(&Point3::from(*point)).coords
    }

    /// Rotates a vector without translating it. Use for normals.
    pub fn transform_normal(&self, normal: &Vector3<f64>) -> Vector3<f64> {
        self.0.rotation * normal
    }
}

impl ops::Mul<&Array2<f64>> for &Transform {
    type Output = Array2<f64>;

    fn mul(self, rhs: &Array2<f64>) -> Self::Output {
        let mut result = Array2::<f64>::zeros((rhs.len_of(Axis(0)), 3));

        for (in_iter, mut out_iter) in rhs.axis_iter(Axis(0)).zip(result.axis_iter_mut(Axis(0))) {
            let v = self
                .0
                .transform_point(&Point3::new(in_iter[0], in_iter[1], in_iter[2]))
                .coords;
            out_iter[0] = v[0];
            out_iter[1] = v[1];
            out_iter[2] = v[2];
        }

        result
    }
}

impl ops::Mul<&Vector3<f64>> for &Transform {
    type Output = Vector3<f64>;

    fn mul(self, rhs: &Vector3<f64>) -> Self::Output {
        self.0.transform_point(&Point3::from(*rhs)).coords
    }
}

impl ops::Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Self::Output {
        Transform(self.0 * rhs.0)
    }
}

impl From<Transform> for Matrix4<f64> {
    fn from(transform: Transform) -> Self {
        transform.0.into()
    }
}
