pub mod landmark;
pub mod synthetic;

pub use landmark::{Finger, HandLandmark, Landmark};
