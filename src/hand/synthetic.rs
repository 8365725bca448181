//! Synthetic hand poses.
//!
//! Used by `landmark_sender` to drive a tracker without a detector, and by
//! tests that need deterministic geometry.

use super::landmark::{Finger, HandLandmark, Landmark};

/// Open palm facing the camera, every finger fully extended (0° flexion).
pub fn open_hand() -> Vec<Landmark> {
    let points: [[f32; 2]; HandLandmark::COUNT] = [
        [0.50, 0.80], // wrist
        [0.56, 0.76],
        [0.62, 0.70],
        [0.68, 0.64],
        [0.74, 0.58], // thumb tip
        [0.54, 0.60],
        [0.54, 0.50],
        [0.54, 0.44],
        [0.54, 0.38], // index tip
        [0.50, 0.58],
        [0.50, 0.47],
        [0.50, 0.40],
        [0.50, 0.34], // middle tip
        [0.46, 0.60],
        [0.46, 0.50],
        [0.46, 0.44],
        [0.46, 0.39], // ring tip
        [0.42, 0.63],
        [0.42, 0.55],
        [0.42, 0.50],
        [0.42, 0.46], // pinky tip
    ];
    points.iter().map(|p| Landmark::new(p[0], p[1], 0.0)).collect()
}

/// Moves the thumb tip so that it sits `distance` to the right of the index tip.
pub fn with_pinch_distance(mut hand: Vec<Landmark>, distance: f32) -> Vec<Landmark> {
    let index_tip = hand[HandLandmark::IndexTip as usize];
    hand[HandLandmark::ThumbTip as usize] =
        Landmark::new(index_tip.x + distance, index_tip.y, index_tip.z);
    hand
}

/// Rotates the distal part of `finger` around its middle joint in the image
/// plane. Starting from a straight finger this yields `degrees` of flexion.
pub fn curl_finger(mut hand: Vec<Landmark>, finger: Finger, degrees: f32) -> Vec<Landmark> {
    let [_, vertex, tip] = finger.joints();
    let pivot = hand[vertex as usize];
    let (sin, cos) = degrees.to_radians().sin_cos();
    for lm in &mut hand[vertex as usize + 1..=tip as usize] {
        let dx = lm.x - pivot.x;
        let dy = lm.y - pivot.y;
        lm.x = pivot.x + dx * cos - dy * sin;
        lm.y = pivot.y + dx * sin + dy * cos;
    }
    hand
}

/// Shifts every landmark by `(dx, dy)`.
pub fn translate(hand: &[Landmark], dx: f32, dy: f32) -> Vec<Landmark> {
    hand.iter()
        .map(|lm| Landmark::new(lm.x + dx, lm.y + dy, lm.z))
        .collect()
}
