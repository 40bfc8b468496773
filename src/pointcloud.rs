use nalgebra::Vector3;
use ndarray::prelude::*;
use ndarray::{Array1, Array2};

use crate::error::Error;
use crate::transform::Transform;

/// Ordered set of 3D points with optional per-point attributes stored in
/// parallel arrays. All attribute arrays have the same length as the point
/// array.
pub struct PointCloud {
    pub points: Array2<f64>,
    pub normals: Option<Array2<f64>>,
    pub curvatures: Option<Array1<f64>>,
}

impl PointCloud {
    /// Create a point cloud without attributes.
    ///
    /// # Arguments
    ///
    /// * points - 2D array of shape (n, 3), one point per row.
    pub fn from_points(points: Array2<f64>) -> Result<Self, Error> {
        if points.len_of(Axis(1)) != 3 {
            return Err(Error::invalid_configuration(
                "points must have shape (n, 3)",
            ));
        }
        Ok(Self {
            points,
            normals: None,
            curvatures: None,
        })
    }

    /// Create a point cloud with attributes, checking that the parallel
    /// arrays agree in length.
    pub fn with_attributes(
        points: Array2<f64>,
        normals: Option<Array2<f64>>,
        curvatures: Option<Array1<f64>>,
    ) -> Result<Self, Error> {
        let len = points.len_of(Axis(0));
        if let Some(normals) = &normals {
            if normals.len_of(Axis(0)) != len || normals.len_of(Axis(1)) != 3 {
                return Err(Error::invalid_configuration(
                    "normals array does not match the point count",
                ));
            }
        }
        if let Some(curvatures) = &curvatures {
            if curvatures.len() != len {
                return Err(Error::invalid_configuration(
                    "curvatures array does not match the point count",
                ));
            }
        }

        let mut cloud = Self::from_points(points)?;
        cloud.normals = normals;
        cloud.curvatures = curvatures;
        Ok(cloud)
    }

    pub fn len(&self) -> usize {
        self.points.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Vector3<f64> {
        let row = self.points.row(index);
        Vector3::new(row[0], row[1], row[2])
    }

    pub fn normal(&self, index: usize) -> Option<Vector3<f64>> {
        self.normals.as_ref().map(|normals| {
            let row = normals.row(index);
            Vector3::new(row[0], row[1], row[2])
        })
    }

    pub fn centroid(&self) -> Vector3<f64> {
        let mut sum = Vector3::zeros();
        for point in self.points.axis_iter(Axis(0)) {
            sum += Vector3::new(point[0], point[1], point[2]);
        }
        sum / self.len().max(1) as f64
    }

    /// Diagonal of the axis-aligned bounding box. Used as the cloud scale
    /// for relative correspondence distances and the GNC schedule.
    pub fn diameter(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }

        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for point in self.points.axis_iter(Axis(0)) {
            for k in 0..3 {
                min[k] = min[k].min(point[k]);
                max[k] = max[k].max(point[k]);
            }
        }

        ((max[0] - min[0]).powi(2) + (max[1] - min[1]).powi(2) + (max[2] - min[2]).powi(2)).sqrt()
    }
}

impl std::ops::Mul<&PointCloud> for &Transform {
    type Output = PointCloud;

    fn mul(self, rhs: &PointCloud) -> PointCloud {
        let normals = rhs.normals.as_ref().map(|normals| {
            let mut rotated = Array2::<f64>::zeros(normals.raw_dim());
            for (normal, mut out) in normals
                .axis_iter(Axis(0))
                .zip(rotated.axis_iter_mut(Axis(0)))
            {
                let v = self.transform_normal(&nalgebra::Vector3::new(
                    normal[0], normal[1], normal[2],
                ));
                out[0] = v[0];
                out[1] = v[1];
                out[2] = v[2];
            }
            rotated
        });

        PointCloud {
            points: self * &rhs.points,
            normals,
            curvatures: rhs.curvatures.clone(),
        }
    }
}
