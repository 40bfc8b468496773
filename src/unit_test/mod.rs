mod point_clouds;
pub(crate) use point_clouds::{sample_wavy_patch, wavy_patch_features};
