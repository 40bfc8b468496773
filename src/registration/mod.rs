mod params;
pub use params::{DistanceMode, MaxCorrespondenceDistance, RegistrationParams};
mod matching;
pub use matching::{match_features, tuple_filter, Correspondence};
mod fgr;
pub use fgr::{register, FastGlobalRegistration, RegistrationResult};
