//! Dual-threshold state classifier with frame-count confirmation.
//!
//! A raw candidate state is derived from the measurement every frame. The
//! visible state only moves once the same candidate has been seen for
//! `required_stable_frames` consecutive frames, so single-frame spikes around
//! a threshold never toggle it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Validated threshold pair plus confirmation length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    low: f32,
    high: f32,
    required_stable_frames: u32,
}

impl Thresholds {
    /// `low < high` and `required_stable_frames >= 1` are checked here, at
    /// configuration time, so classification never sees an inverted pair.
    pub fn new(
        section: &'static str,
        low: f32,
        high: f32,
        required_stable_frames: u32,
    ) -> Result<Self, ConfigError> {
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(ConfigError::ThresholdOrder { section, low, high });
        }
        if required_stable_frames == 0 {
            return Err(ConfigError::OutOfRange {
                field: "stable_frames",
                reason: format!("{section} needs at least one confirmation frame"),
            });
        }
        Ok(Self {
            low,
            high,
            required_stable_frames,
        })
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn required_stable_frames(&self) -> u32 {
        self.required_stable_frames
    }
}

/// A discrete state domain classified from one continuous measurement.
pub trait HysteresisDomain: Copy + Eq + fmt::Debug {
    /// Raw state suggested by this frame's measurement alone.
    fn candidate(measurement: f32, thresholds: &Thresholds, current: Self) -> Self;
}

/// Finger posture from its flexion angle (0° = straight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FingerState {
    Straight,
    InBetween,
    Bent,
}

impl HysteresisDomain for FingerState {
    fn candidate(measurement: f32, thresholds: &Thresholds, _current: Self) -> Self {
        if measurement < thresholds.low {
            FingerState::Straight
        } else if measurement > thresholds.high {
            FingerState::Bent
        } else {
            FingerState::InBetween
        }
    }
}

impl FingerState {
    pub fn as_str(self) -> &'static str {
        match self {
            FingerState::Straight => "straight",
            FingerState::InBetween => "in-between",
            FingerState::Bent => "bent",
        }
    }
}

/// Pinch from the thumb-tip to index-tip distance.
///
/// Enter below the low threshold, leave above the high one; the band in
/// between keeps whatever state is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinchState {
    Inactive,
    Pinching,
}

impl HysteresisDomain for PinchState {
    fn candidate(measurement: f32, thresholds: &Thresholds, current: Self) -> Self {
        if measurement < thresholds.low {
            PinchState::Pinching
        } else if measurement > thresholds.high {
            PinchState::Inactive
        } else {
            current
        }
    }
}

impl PinchState {
    pub fn as_str(self) -> &'static str {
        match self {
            PinchState::Inactive => "inactive",
            PinchState::Pinching => "pinching",
        }
    }
}

/// Read-only view of a classifier after one update.
///
/// `pending` and `stable_frame_count` are diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisSnapshot<S> {
    pub current: S,
    pub pending: Option<S>,
    pub stable_frame_count: u32,
    /// Last accepted measurement (distance or angle).
    pub measurement: Option<f32>,
    /// State before this frame, when this frame confirmed a transition.
    pub transitioned_from: Option<S>,
}

impl<S> HysteresisSnapshot<S> {
    pub fn changed(&self) -> bool {
        self.transitioned_from.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct HysteresisClassifier<S> {
    current: S,
    pending: Option<S>,
    stable_frame_count: u32,
    measurement: Option<f32>,
}

impl<S: HysteresisDomain> HysteresisClassifier<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            pending: None,
            stable_frame_count: 0,
            measurement: None,
        }
    }

    /// Feed one frame. `None` (or a non-finite value) leaves every field
    /// untouched: a missing measurement is not evidence of a change.
    pub fn update(&mut self, measurement: Option<f32>, thresholds: &Thresholds) -> HysteresisSnapshot<S> {
        let value = match measurement {
            Some(v) if v.is_finite() => v,
            _ => return self.snapshot(),
        };
        self.measurement = Some(value);

        let candidate = S::candidate(value, thresholds, self.current);
        if candidate == self.current {
            self.pending = None;
            self.stable_frame_count = 0;
            return self.snapshot();
        }

        if self.pending == Some(candidate) {
            self.stable_frame_count += 1;
        } else {
            self.pending = Some(candidate);
            self.stable_frame_count = 1;
        }

        if self.stable_frame_count >= thresholds.required_stable_frames {
            let previous = self.current;
            self.current = candidate;
            self.pending = None;
            self.stable_frame_count = 0;
            let mut snapshot = self.snapshot();
            snapshot.transitioned_from = Some(previous);
            return snapshot;
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> HysteresisSnapshot<S> {
        HysteresisSnapshot {
            current: self.current,
            pending: self.pending,
            stable_frame_count: self.stable_frame_count,
            measurement: self.measurement,
            transitioned_from: None,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn pending(&self) -> Option<S> {
        self.pending
    }

    pub fn stable_frame_count(&self) -> u32 {
        self.stable_frame_count
    }

    pub fn reset(&mut self, initial: S) {
        *self = Self::new(initial);
    }
}
