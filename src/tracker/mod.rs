pub mod flexion;
pub mod hysteresis;
pub mod landmark_filter;
pub mod one_euro;
pub mod roi;

pub use flexion::{compute_finger_angles, FlexionMeasurement};
pub use hysteresis::{
    FingerState, HysteresisClassifier, HysteresisDomain, HysteresisSnapshot, PinchState, Thresholds,
};
pub use landmark_filter::{HandFilter, LandmarkFilter, VectorFilter};
pub use one_euro::ScalarFilter;
pub use roi::{remap_landmarks, CropRegion, RoiState, RoiTracker};
