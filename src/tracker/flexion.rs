use serde::{Deserialize, Serialize};

use crate::config::FingersConfig;
use crate::geometry::flexion_degrees;
use crate::hand::{Finger, HandLandmark, Landmark};

/// 指1本分の屈曲角
///
/// `angle_degrees` は 0° = まっすぐ。指が無効、またはランドマーク不足なら `None`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlexionMeasurement {
    pub finger: Finger,
    pub angle_degrees: Option<f32>,
}

/// 5本分の屈曲角を求める
///
/// 無効な指は幾何計算自体を行わない。21点に満たない手は全指 `None`。
pub fn compute_finger_angles(
    landmarks: &[Landmark],
    fingers: &FingersConfig,
) -> [FlexionMeasurement; Finger::COUNT] {
    let complete = landmarks.len() >= HandLandmark::COUNT;
    Finger::ALL.map(|finger| {
        let angle_degrees = if complete && fingers.is_enabled(finger) {
            let [a, b, c] = finger.joints();
            let angle = flexion_degrees(
                &landmarks[a as usize],
                &landmarks[b as usize],
                &landmarks[c as usize],
            );
            Some(angle).filter(|v| v.is_finite())
        } else {
            None
        };
        FlexionMeasurement { finger, angle_degrees }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::synthetic::{curl_finger, open_hand};

    #[test]
    fn test_open_hand_is_straight() {
        let angles = compute_finger_angles(&open_hand(), &FingersConfig::default());
        for m in angles {
            let angle = m.angle_degrees.unwrap();
            assert!(angle.abs() < 0.5, "{:?} flexion {}", m.finger, angle);
        }
    }

    #[test]
    fn test_curled_index() {
        let hand = curl_finger(open_hand(), Finger::Index, 90.0);
        let angles = compute_finger_angles(&hand, &FingersConfig::default());
        let index = angles[Finger::Index as usize];
        assert_eq!(index.finger, Finger::Index);
        assert!((index.angle_degrees.unwrap() - 90.0).abs() < 0.5);
        let middle = angles[Finger::Middle as usize].angle_degrees.unwrap();
        assert!(middle.abs() < 0.5);
    }

    #[test]
    fn test_disabled_finger_is_none() {
        let mut fingers = FingersConfig::default();
        fingers.thumb = false;
        fingers.pinky = false;
        let angles = compute_finger_angles(&open_hand(), &fingers);
        assert_eq!(angles[Finger::Thumb as usize].angle_degrees, None);
        assert_eq!(angles[Finger::Pinky as usize].angle_degrees, None);
        assert!(angles[Finger::Index as usize].angle_degrees.is_some());
    }

    #[test]
    fn test_incomplete_hand_is_none() {
        let hand = open_hand();
        let angles = compute_finger_angles(&hand[..20], &FingersConfig::default());
        assert!(angles.iter().all(|m| m.angle_degrees.is_none()));
        let angles = compute_finger_angles(&[], &FingersConfig::default());
        assert!(angles.iter().all(|m| m.angle_degrees.is_none()));
    }
}
