pub mod error;
pub mod fpfh;
pub mod kdtree;
pub mod metrics;
pub mod normals;
pub mod pointcloud;
pub mod registration;
pub mod transform;

mod optim;

#[cfg(test)]
mod unit_test;

pub use crate::error::Error;
pub use crate::kdtree::{KdTree, Neighborhood};
pub use crate::pointcloud::PointCloud;
pub use crate::transform::Transform;
