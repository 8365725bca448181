//! Per-frame hand pipeline.
//!
//! raw landmarks → landmark filter → flexion → finger classifiers
//!                                 → tip distance → pinch classifier
//! raw landmarks → ROI tracker
//!
//! `HandTracker` owns one `HandPipeline` per hand slot plus the active
//! `TrackingConfig`. Each `process` call is one transaction against that
//! config; settings are only swapped between calls.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, FilterConfig, TrackingConfig};
use crate::geometry::distance_3d;
use crate::hand::landmark::is_complete_hand;
use crate::hand::{Finger, HandLandmark, Landmark};
use crate::tracker::{
    compute_finger_angles, FingerState, FlexionMeasurement, HandFilter, HysteresisClassifier,
    HysteresisSnapshot, PinchState, RoiState, RoiTracker, Thresholds,
};

/// One detected hand as delivered by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub slot: usize,
    pub landmarks: Vec<Landmark>,
}

/// One detector frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp_ms: f64,
    pub hands: Vec<HandObservation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HandEvent {
    FingerChanged {
        finger: Finger,
        from: FingerState,
        to: FingerState,
    },
    PinchStarted,
    PinchEnded,
}

/// Everything derived for one hand slot from one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandReport {
    pub slot: usize,
    /// Smoothed landmarks; empty when the hand was absent or incomplete.
    pub landmarks: Vec<Landmark>,
    pub flexion: [FlexionMeasurement; Finger::COUNT],
    pub fingers: [HysteresisSnapshot<FingerState>; Finger::COUNT],
    pub pinch: HysteresisSnapshot<PinchState>,
    pub pinch_distance: Option<f32>,
    /// Whether the detector should scan the whole next frame.
    pub full_frame: bool,
    /// Region for the next frame when `full_frame` is false.
    pub roi: Option<RoiState>,
    pub events: Vec<HandEvent>,
}

impl HandReport {
    pub fn finger(&self, finger: Finger) -> &HysteresisSnapshot<FingerState> {
        &self.fingers[finger as usize]
    }

    pub fn flexion(&self, finger: Finger) -> Option<f32> {
        self.flexion[finger as usize].angle_degrees
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub timestamp_ms: f64,
    pub hands: Vec<HandReport>,
}

impl FrameReport {
    pub fn hand(&self, slot: usize) -> Option<&HandReport> {
        self.hands.iter().find(|h| h.slot == slot)
    }
}

const INITIAL_FINGER_STATE: FingerState = FingerState::InBetween;
const INITIAL_PINCH_STATE: PinchState = PinchState::Inactive;

/// Long-lived state for a single hand slot.
#[derive(Debug, Clone)]
pub struct HandPipeline {
    slot: usize,
    filter: HandFilter,
    fingers: [HysteresisClassifier<FingerState>; Finger::COUNT],
    pinch: HysteresisClassifier<PinchState>,
    roi: RoiTracker,
}

impl HandPipeline {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            filter: HandFilter::new(),
            fingers: std::array::from_fn(|_| HysteresisClassifier::new(INITIAL_FINGER_STATE)),
            pinch: HysteresisClassifier::new(INITIAL_PINCH_STATE),
            roi: RoiTracker::new(),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn filter_mut(&mut self) -> &mut HandFilter {
        &mut self.filter
    }

    /// Run one frame. `None` means the slot had no hand this frame.
    ///
    /// Thresholds come pre-validated from the tracker so a frame never sees a
    /// half-applied config.
    fn process(
        &mut self,
        landmarks: Option<&[Landmark]>,
        timestamp_ms: f64,
        config: &TrackingConfig,
        finger_thresholds: &Thresholds,
        pinch_thresholds: &Thresholds,
    ) -> HandReport {
        let raw = landmarks.unwrap_or(&[]);
        let full_frame = self.roi.update(raw, timestamp_ms, &config.roi);

        let filtered = if is_complete_hand(raw) {
            self.filter
                .filter(raw, timestamp_ms / 1000.0, &config.filter)
        } else {
            if !raw.is_empty() {
                debug!(slot = self.slot, count = raw.len(), "incomplete hand, skipping measurements");
            }
            Vec::new()
        };

        let flexion = compute_finger_angles(&filtered, &config.fingers);
        let mut events = Vec::new();

        let fingers = std::array::from_fn(|i| {
            let snapshot = self.fingers[i].update(flexion[i].angle_degrees, finger_thresholds);
            if let Some(from) = snapshot.transitioned_from {
                let finger = Finger::ALL[i];
                info!(
                    slot = self.slot,
                    finger = finger.as_str(),
                    from = from.as_str(),
                    to = snapshot.current.as_str(),
                    "finger state changed"
                );
                events.push(HandEvent::FingerChanged {
                    finger,
                    from,
                    to: snapshot.current,
                });
            }
            snapshot
        });

        let pinch_distance = if filtered.len() >= HandLandmark::COUNT {
            let d = distance_3d(
                &filtered[HandLandmark::ThumbTip as usize],
                &filtered[HandLandmark::IndexTip as usize],
            );
            Some(d).filter(|d| d.is_finite())
        } else {
            None
        };
        let pinch = self.pinch.update(pinch_distance, pinch_thresholds);
        if pinch.changed() {
            info!(slot = self.slot, state = pinch.current.as_str(), "pinch state changed");
            events.push(match pinch.current {
                PinchState::Pinching => HandEvent::PinchStarted,
                PinchState::Inactive => HandEvent::PinchEnded,
            });
        }

        HandReport {
            slot: self.slot,
            landmarks: filtered,
            flexion,
            fingers,
            pinch,
            pinch_distance,
            full_frame,
            roi: self.roi.region(),
            events,
        }
    }

    /// Forget everything learned about the current occupant of this slot.
    pub fn reset(&mut self) {
        self.filter.reset();
        for c in &mut self.fingers {
            c.reset(INITIAL_FINGER_STATE);
        }
        self.pinch.reset(INITIAL_PINCH_STATE);
        self.roi.reset();
    }
}

/// All hand slots plus the configuration they run against.
#[derive(Debug, Clone)]
pub struct HandTracker {
    config: TrackingConfig,
    finger_thresholds: Thresholds,
    pinch_thresholds: Thresholds,
    /// Indexed by slot; created on first observation.
    slots: Vec<Option<HandPipeline>>,
}

impl HandTracker {
    pub fn new(config: TrackingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let finger_thresholds = config.fingers.thresholds()?;
        let pinch_thresholds = config.pinch.thresholds()?;
        Ok(Self {
            config,
            finger_thresholds,
            pinch_thresholds,
            slots: Vec::new(),
        })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Replace the whole config. Rejected configs leave the current one in place.
    pub fn update_config(&mut self, config: TrackingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.finger_thresholds = config.fingers.thresholds()?;
        self.pinch_thresholds = config.pinch.thresholds()?;
        if config.hands.max_hands < self.slots.len() {
            info!(max_hands = config.hands.max_hands, "dropping hand slots above new limit");
            self.slots.truncate(config.hands.max_hands);
        }
        self.config = config;
        Ok(())
    }

    /// Apply one `section.key = value` change.
    pub fn apply_setting(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.config.clone();
        next.apply_setting(section, key, value)?;
        self.update_config(next)
    }

    /// Live filter parameters change for every slot; smoothed state is kept.
    pub fn update_filter_parameters(&mut self, filter: FilterConfig) -> Result<(), ConfigError> {
        let mut next = self.config.clone();
        next.filter = filter;
        self.update_config(next)
    }

    /// The caller decided a slot now holds a different hand.
    pub fn reset_slot(&mut self, slot: usize) {
        if let Some(Some(pipeline)) = self.slots.get_mut(slot) {
            pipeline.reset();
            info!(slot, "hand slot reset");
        }
    }

    pub fn reset_all(&mut self) {
        for pipeline in self.slots.iter_mut().flatten() {
            pipeline.reset();
        }
    }

    pub fn pipeline(&self, slot: usize) -> Option<&HandPipeline> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn pipeline_mut(&mut self, slot: usize) -> Option<&mut HandPipeline> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Process one frame. Every live slot gets a report, including slots
    /// whose hand was not seen this frame.
    pub fn process(&mut self, frame: &Frame) -> FrameReport {
        let max_hands = self.config.hands.max_hands;
        let mut observed: Vec<Option<&[Landmark]>> = vec![None; max_hands];

        for hand in &frame.hands {
            if hand.slot >= max_hands {
                warn!(slot = hand.slot, max_hands, "hand slot out of range, ignored");
                continue;
            }
            if observed[hand.slot].is_some() {
                warn!(slot = hand.slot, "duplicate hand slot in frame, ignored");
                continue;
            }
            observed[hand.slot] = Some(hand.landmarks.as_slice());
            if self.slots.len() <= hand.slot {
                self.slots.resize_with(hand.slot + 1, || None);
            }
            if self.slots[hand.slot].is_none() {
                debug!(slot = hand.slot, "new hand slot");
                self.slots[hand.slot] = Some(HandPipeline::new(hand.slot));
            }
        }

        let mut hands = Vec::new();
        for (slot, pipeline) in self.slots.iter_mut().enumerate() {
            if let Some(pipeline) = pipeline {
                hands.push(pipeline.process(
                    observed[slot],
                    frame.timestamp_ms,
                    &self.config,
                    &self.finger_thresholds,
                    &self.pinch_thresholds,
                ));
            }
        }

        FrameReport {
            timestamp_ms: frame.timestamp_ms,
            hands,
        }
    }
}
