//! Core data types for the motion metrics engine.
//!
//! This module defines the values that flow between the pipeline stages: raw
//! samples from the tracking collaborator, the landmarks of a pose estimate,
//! and the discrete events and timeline points the engine emits.
//!
//! Design principle: if a concept crosses a module boundary it gets a type.
//! Samples keep plain arrays so they serialize without ceremony; geometry
//! inside the engine uses `nalgebra` vectors.
//!
//! All quantities are `f64`. Timestamps are monotonic seconds from an
//! arbitrary origin chosen by the producer; positions are meters.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Three-dimensional vector used for all in-engine geometry.
pub type Vec3 = Vector3<f64>;

/// Body landmarks consumed by the joint-angle strategy.
///
/// Only the upper-body subset the supported exercises need is modelled.
/// Producers with richer skeletons simply omit the extra landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Landmark {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
}

/// Which side of the body a camera exercise tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodySide {
    Left,
    #[default]
    Right,
}

impl BodySide {
    pub fn shoulder(&self) -> Landmark {
        match self {
            BodySide::Left => Landmark::LeftShoulder,
            BodySide::Right => Landmark::RightShoulder,
        }
    }

    pub fn elbow(&self) -> Landmark {
        match self {
            BodySide::Left => Landmark::LeftElbow,
            BodySide::Right => Landmark::RightElbow,
        }
    }

    pub fn wrist(&self) -> Landmark {
        match self {
            BodySide::Left => Landmark::LeftWrist,
            BodySide::Right => Landmark::RightWrist,
        }
    }

    pub fn hip(&self) -> Landmark {
        match self {
            BodySide::Left => Landmark::LeftHip,
            BodySide::Right => Landmark::RightHip,
        }
    }
}

/// A single 2D landmark from a pose estimate.
///
/// Coordinates are in the producer's image frame (normalized or pixels, the
/// joint-angle math is scale invariant). Confidence is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub landmark: Landmark,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Keypoint {
    pub fn new(landmark: Landmark, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            landmark,
            x,
            y,
            confidence,
        }
    }

    /// True when the landmark's confidence exceeds `threshold`.
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence > threshold
    }
}

/// The landmarks of one pose estimate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeypointSet {
    pub keypoints: Vec<Keypoint>,
}

impl KeypointSet {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    /// Looks up a landmark. The first occurrence wins if a producer repeats one.
    pub fn get(&self, landmark: Landmark) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.landmark == landmark)
    }

    /// Returns the landmark's position only if it exceeds the confidence threshold.
    pub fn confident_point(&self, landmark: Landmark, threshold: f64) -> Option<(f64, f64)> {
        self.get(landmark)
            .filter(|k| k.is_confident(threshold))
            .map(|k| (k.x, k.y))
    }

    fn is_finite(&self) -> bool {
        self.keypoints
            .iter()
            .all(|k| k.x.is_finite() && k.y.is_finite() && k.confidence.is_finite())
    }
}

/// The measurement carried by a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplePayload {
    /// World-tracking pose: tracked point position plus optional orientation
    /// quaternion `[x, y, z, w]`. Orientation is carried for producers that
    /// have it but the metrics only use position.
    Position {
        position: [f64; 3],
        #[serde(default)]
        orientation: Option<[f64; 4]>,
    },
    /// Pose-estimation landmarks.
    Keypoints(KeypointSet),
}

/// A single timestamped sample from the tracking collaborator.
///
/// This is the minimal input contract. Samples are validated by
/// [`crate::ingest::SampleGate`] before any stage sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic timestamp in seconds.
    pub timestamp: f64,
    #[serde(flatten)]
    pub payload: SamplePayload,
    /// Overall tracking confidence in [0, 1].
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

impl Sample {
    /// Creates a world-tracking sample with full confidence.
    pub fn position(timestamp: f64, position: [f64; 3]) -> Self {
        Self {
            timestamp,
            payload: SamplePayload::Position {
                position,
                orientation: None,
            },
            confidence: 1.0,
        }
    }

    /// Creates a pose-estimation sample with full confidence.
    pub fn keypoints(timestamp: f64, keypoints: Vec<Keypoint>) -> Self {
        Self {
            timestamp,
            payload: SamplePayload::Keypoints(KeypointSet::new(keypoints)),
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Position as a vector, if this is a world-tracking sample.
    pub fn position_vec(&self) -> Option<Vec3> {
        match &self.payload {
            SamplePayload::Position { position, .. } => {
                Some(Vec3::new(position[0], position[1], position[2]))
            }
            SamplePayload::Keypoints(_) => None,
        }
    }

    pub fn keypoint_set(&self) -> Option<&KeypointSet> {
        match &self.payload {
            SamplePayload::Keypoints(set) => Some(set),
            SamplePayload::Position { .. } => None,
        }
    }

    /// True when the timestamp, confidence and every coordinate are finite.
    pub fn is_finite(&self) -> bool {
        if !self.timestamp.is_finite() || !self.confidence.is_finite() {
            return false;
        }
        match &self.payload {
            SamplePayload::Position {
                position,
                orientation,
            } => {
                position.iter().all(|c| c.is_finite())
                    && orientation
                        .map(|q| q.iter().all(|c| c.is_finite()))
                        .unwrap_or(true)
            }
            SamplePayload::Keypoints(set) => set.is_finite(),
        }
    }
}

/// Tracking-quality signal from the tracking collaborator.
///
/// Only `Normal` lets samples into the histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingQuality {
    #[default]
    Normal,
    /// Tracking is running but limited (fast motion, poor features).
    Degraded,
    /// No tracking.
    Unavailable,
}

/// Direction tag attached to a repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepDirection {
    Forward,
    Backward,
    Clockwise,
    Counterclockwise,
    /// The detector has no notion of direction (threshold crossing).
    Na,
}

/// One validated repetition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepEvent {
    /// Zero-based index within the session.
    pub index: u32,
    /// ROM credited to this rep, in degrees.
    pub rom_at_completion: f64,
    /// Timestamp of the sample that completed the rep.
    pub timestamp: f64,
    pub direction: RepDirection,
}

/// One point of the smoothness timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothnessPoint {
    pub timestamp: f64,
    pub value: f64,
}

impl SmoothnessPoint {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite() && self.value.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_sample_is_finite() {
        let sample = Sample::position(0.5, [0.1, 0.2, 0.3]);
        assert!(sample.is_finite());
        assert_eq!(sample.position_vec(), Some(Vec3::new(0.1, 0.2, 0.3)));
        assert!(sample.keypoint_set().is_none());
    }

    #[test]
    fn test_non_finite_coordinates_detected() {
        assert!(!Sample::position(0.0, [f64::NAN, 0.0, 0.0]).is_finite());
        assert!(!Sample::position(0.0, [0.0, f64::INFINITY, 0.0]).is_finite());
        assert!(!Sample::position(f64::NAN, [0.0, 0.0, 0.0]).is_finite());

        let kp = Sample::keypoints(
            1.0,
            vec![Keypoint::new(Landmark::LeftElbow, f64::NEG_INFINITY, 0.0, 0.9)],
        );
        assert!(!kp.is_finite());
    }

    #[test]
    fn test_keypoint_lookup_respects_confidence() {
        let set = KeypointSet::new(vec![
            Keypoint::new(Landmark::RightShoulder, 0.5, 0.2, 0.9),
            Keypoint::new(Landmark::RightElbow, 0.55, 0.4, 0.3),
        ]);
        assert_eq!(set.confident_point(Landmark::RightShoulder, 0.5), Some((0.5, 0.2)));
        assert_eq!(set.confident_point(Landmark::RightElbow, 0.5), None);
        assert_eq!(set.confident_point(Landmark::RightWrist, 0.5), None);
    }

    #[test]
    fn test_confidence_at_threshold_is_not_confident() {
        let at = Keypoint::new(Landmark::RightWrist, 0.5, 0.5, 0.5);
        assert!(!at.is_confident(0.5), "threshold must be exceeded");
        assert!(at.is_confident(0.499));
        let set = KeypointSet::new(vec![at]);
        assert_eq!(set.confident_point(Landmark::RightWrist, 0.5), None);
    }

    #[test]
    fn test_sample_json_shape() {
        let json = r#"{"timestamp":1.25,"kind":"position","position":[0.0,1.0,2.0]}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.timestamp, 1.25);
        assert_eq!(sample.confidence, 1.0);
        assert_eq!(sample.position_vec(), Some(Vec3::new(0.0, 1.0, 2.0)));

        let json = r#"{"timestamp":2.0,"kind":"keypoints","keypoints":[
            {"landmark":"left_wrist","x":0.1,"y":0.2,"confidence":0.8}]}"#;
        let sample: Sample = serde_json::from_str(json).unwrap();
        let set = sample.keypoint_set().unwrap();
        assert_eq!(set.get(Landmark::LeftWrist).map(|k| k.confidence), Some(0.8));
    }

    #[test]
    fn test_body_side_landmarks() {
        assert_eq!(BodySide::Left.elbow(), Landmark::LeftElbow);
        assert_eq!(BodySide::Right.hip(), Landmark::RightHip);
        assert_eq!(BodySide::default(), BodySide::Right);
    }
}
