//! Complete per-session motion metrics pipeline.
//!
//! `MotionSession` wires every stage for one session and is driven one sample
//! at a time. It is synchronous and owns all of its state, which makes it
//! directly testable; `SessionCoordinator` runs it on a background worker.
//!
//! # Data flow
//!
//! 1. **Ingestion gate**: drop non-finite, non-monotonic and degraded-quality
//!    samples
//! 2. **Position history**: bounded record of the tracked point
//! 3. **Plane detection**: periodic, cached refits (world tracking only)
//! 4. **ROM**: directional angle (3D) or joint angle (2D)
//! 5. **Rep detection**: pendulum, circular or threshold state machine
//! 6. **Smoothness**: rolling timeline plus per-rep SPARC
//!
//! On each rep the rep-indexed histories are appended. The snapshot is
//! assembled from those histories only, never from per-frame values.

use tracing::{debug, info};

use crate::config::{EngineConfig, ExerciseConfig};
use crate::error::SampleRejection;
use crate::export::{SessionSnapshot, SnapshotBuilder};
use crate::history::BoundedHistory;
use crate::ingest::{IngestStats, SampleGate};
use crate::plane::{MovementPlane, PlaneDetector};
use crate::rep_detection::{
    CircularDetector, PendulumDetector, RepDetector, RepInput, ThresholdDetector,
};
use crate::rom::{DirectionalRom, JointAngleRom, JointAngleSpec, RomStrategy};
use crate::smoothness::SmoothnessAnalyzer;
use crate::types::{BodySide, RepEvent, Sample, SmoothnessPoint, TrackingQuality, Vec3};

/// Result of one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutcome {
    /// Current ROM after this sample (deg).
    pub rom: f64,
    pub rep: Option<RepEvent>,
    pub smoothness: Option<SmoothnessPoint>,
}

/// Synchronous per-session context.
pub struct MotionSession {
    config: EngineConfig,

    // Stages
    gate: SampleGate,
    plane: PlaneDetector,
    rom: Box<dyn RomStrategy>,
    detector: Box<dyn RepDetector>,
    smoothness: SmoothnessAnalyzer,

    // Histories
    positions: BoundedHistory<(f64, Vec3)>,
    reps: BoundedHistory<RepEvent>,
    rom_peaks: BoundedHistory<f64>,
    rep_sparc: BoundedHistory<f64>,

    /// Peak ROM since the previous rep.
    interval_peak: f64,
    /// Side whose wrist feeds smoothness for camera input.
    tracked_side: Option<BodySide>,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
}

impl MotionSession {
    /// Creates a session. The config is assumed validated.
    pub fn new(config: EngineConfig) -> Self {
        let history = &config.history;
        let tracked_side = match &config.exercise {
            ExerciseConfig::JointThreshold(c) => Some(c.side),
            _ => None,
        };

        Self {
            gate: SampleGate::new(),
            plane: PlaneDetector::new(config.plane.clone()),
            rom: build_rom(&config),
            detector: build_detector(&config),
            smoothness: SmoothnessAnalyzer::new(
                config.smoothness.clone(),
                history.smoothness_timeline,
                history.positions,
            ),
            positions: BoundedHistory::new(history.positions),
            reps: BoundedHistory::new(history.reps),
            rom_peaks: BoundedHistory::new(history.reps),
            rep_sparc: BoundedHistory::new(history.reps),
            interval_peak: 0.0,
            tracked_side,
            first_timestamp: None,
            last_timestamp: None,
            config,
        }
    }

    /// Processes a single sample through the entire pipeline.
    ///
    /// Rejected samples leave every stage untouched.
    pub fn process_sample(&mut self, sample: &Sample) -> Result<SampleOutcome, SampleRejection> {
        self.gate.admit(sample)?;
        let timestamp = sample.timestamp;
        self.first_timestamp.get_or_insert(timestamp);
        self.last_timestamp = Some(timestamp);

        // Stages 2-3: history and plane (world tracking)
        let world_position = sample.position_vec();
        if let Some(position) = world_position {
            self.positions.push((timestamp, position));
            if self.plane.push(timestamp, position) {
                debug!(timestamp, refits = self.plane.refits(), "movement plane refit");
            }
        }

        // Stage 4: ROM
        let plane = *self.plane.plane();
        let rom = self.rom.update(sample, &plane);
        self.interval_peak = self.interval_peak.max(rom);

        // Stage 5: reps
        let input = RepInput {
            timestamp,
            rom,
            position: world_position,
            plane: &plane,
        };
        let rep = self.detector.on_sample(&input);

        // Stage 6: smoothness
        let smoothness = self
            .tracked_point(sample)
            .and_then(|p| self.smoothness.on_position(timestamp, p));

        if let Some(event) = rep {
            self.record_rep(event, rom);
        }

        Ok(SampleOutcome {
            rom,
            rep,
            smoothness,
        })
    }

    fn tracked_point(&self, sample: &Sample) -> Option<Vec3> {
        if let Some(position) = sample.position_vec() {
            return Some(position);
        }
        let side = self.tracked_side?;
        let (x, y) = sample
            .keypoint_set()?
            .confident_point(side.wrist(), self.config.rom.joint_confidence_threshold)?;
        Some(Vec3::new(x, y, 0.0))
    }

    fn record_rep(&mut self, event: RepEvent, rom: f64) {
        let sparc = self.smoothness.mark_rep().or_else(|| self.smoothness.latest());
        self.reps.push(event);
        self.rom_peaks.push(self.interval_peak);
        // NaN keeps the history aligned with reps; export drops it.
        self.rep_sparc.push(sparc.unwrap_or(f64::NAN));
        self.interval_peak = rom;
        info!(
            index = event.index,
            rom = event.rom_at_completion,
            timestamp = event.timestamp,
            direction = ?event.direction,
            "rep completed"
        );
    }

    pub fn set_quality(&mut self, quality: TrackingQuality) {
        self.gate.set_quality(quality);
    }

    /// Counts a sample that arrived after stop was requested.
    pub fn reject_after_stop(&mut self) {
        self.gate.reject(SampleRejection::SessionStopped);
    }

    /// Assembles the export snapshot from the current histories.
    pub fn snapshot(&self) -> SessionSnapshot {
        let duration = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        SnapshotBuilder::new(self.config.exercise.name())
            .reps(self.reps.snapshot(), self.rom_peaks.snapshot())
            .rep_sparc(self.rep_sparc.snapshot())
            .timeline(self.smoothness.timeline().snapshot())
            .session_sparc(self.smoothness.session_score())
            .max_rom(self.rom.max_rom())
            .rep_count(self.detector.rep_count())
            .duration(duration)
            .ingest(self.gate.stats())
            .build()
    }

    /// Clears all baselines, histories and detector state.
    pub fn reset(&mut self) {
        self.gate.reset();
        self.plane.reset();
        self.rom.reset();
        self.detector.reset();
        self.smoothness.reset();
        self.positions.clear();
        self.reps.clear();
        self.rom_peaks.clear();
        self.rep_sparc.clear();
        self.interval_peak = 0.0;
        self.first_timestamp = None;
        self.last_timestamp = None;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn current_rom(&self) -> f64 {
        self.rom.current_rom()
    }

    pub fn max_rom(&self) -> f64 {
        self.rom.max_rom()
    }

    pub fn rep_count(&self) -> u32 {
        self.detector.rep_count()
    }

    pub fn latest_rep(&self) -> Option<RepEvent> {
        self.reps.latest().copied()
    }

    /// Most recent smoothness timeline value.
    pub fn smoothness(&self) -> Option<f64> {
        self.smoothness.latest()
    }

    pub fn plane(&self) -> &MovementPlane {
        self.plane.plane()
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.gate.stats()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn positions(&self) -> &BoundedHistory<(f64, Vec3)> {
        &self.positions
    }

    pub fn rep_history(&self) -> &BoundedHistory<RepEvent> {
        &self.reps
    }
}

fn build_rom(config: &EngineConfig) -> Box<dyn RomStrategy> {
    match &config.exercise {
        ExerciseConfig::Pendulum(_) | ExerciseConfig::Circular(_) => {
            Box::new(DirectionalRom::new(config.rom.clone()))
        }
        ExerciseConfig::JointThreshold(c) => Box::new(JointAngleRom::new(
            JointAngleSpec::for_joint(c.joint, c.side),
            config.rom.joint_confidence_threshold,
        )),
    }
}

fn build_detector(config: &EngineConfig) -> Box<dyn RepDetector> {
    let biometrics = &config.biometrics;
    match &config.exercise {
        ExerciseConfig::Pendulum(c) => {
            Box::new(PendulumDetector::new(c.clone(), biometrics.arm_length))
        }
        ExerciseConfig::Circular(c) => {
            Box::new(CircularDetector::new(c.clone(), biometrics.forearm_and_grip()))
        }
        ExerciseConfig::JointThreshold(c) => {
            Box::new(ThresholdDetector::new(c.threshold_deg, c.cooldown_seconds))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Keypoint, Landmark};

    #[test]
    fn test_session_creation() {
        let session = MotionSession::new(EngineConfig::default());
        assert_eq!(session.rep_count(), 0);
        assert_eq!(session.current_rom(), 0.0);
        assert!(session.plane().is_identity());
        assert!(session.latest_rep().is_none());
    }

    #[test]
    fn test_rejected_sample_leaves_state_untouched() {
        let mut session = MotionSession::new(EngineConfig::default());
        session.process_sample(&Sample::position(1.0, [0.0; 3])).unwrap();
        let result = session.process_sample(&Sample::position(0.5, [0.3, 0.0, 0.0]));
        assert!(matches!(result, Err(SampleRejection::NonMonotonic { .. })));
        assert_eq!(session.positions().len(), 1);
        assert_eq!(session.last_timestamp(), Some(1.0));
    }

    #[test]
    fn test_degraded_quality_gates_history() {
        let mut session = MotionSession::new(EngineConfig::default());
        session.set_quality(TrackingQuality::Degraded);
        for i in 0..10 {
            let _ = session.process_sample(&Sample::position(i as f64, [i as f64, 0.0, 0.0]));
        }
        assert!(session.positions().is_empty());
        assert_eq!(session.ingest_stats().degraded_quality, 10);
    }

    #[test]
    fn test_empty_session_snapshot() {
        let session = MotionSession::new(EngineConfig::for_exercise(ExerciseConfig::circular()));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.exercise, "circular");
        assert_eq!(snapshot.rep_count, 0);
        assert_eq!(snapshot.session_duration, 0.0);
        assert!(snapshot.rom_history.is_empty());
    }

    #[test]
    fn test_camera_session_tracks_wrist_for_smoothness() {
        let config = EngineConfig::for_exercise(ExerciseConfig::elbow_extension());
        let mut session = MotionSession::new(config);
        let mut points = 0;
        for i in 0..40 {
            let a = (i as f64 * 3.0).to_radians();
            let sample = Sample::keypoints(
                i as f64 / 30.0,
                vec![
                    Keypoint::new(Landmark::RightShoulder, 0.5, 0.2, 0.9),
                    Keypoint::new(Landmark::RightElbow, 0.5, 0.5, 0.9),
                    Keypoint::new(Landmark::RightWrist, 0.5 + 0.3 * a.sin(), 0.5 + 0.3 * a.cos(), 0.9),
                ],
            );
            let outcome = session.process_sample(&sample).unwrap();
            if outcome.smoothness.is_some() {
                points += 1;
            }
        }
        assert!(points > 0, "wrist motion should produce timeline points");
        assert!(session.positions().is_empty(), "camera input has no world positions");
        assert_eq!(session.rep_count(), 1, "single bend past 15° is one rep");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = MotionSession::new(EngineConfig::default());
        for i in 0..100 {
            let t = i as f64 / 60.0;
            session
                .process_sample(&Sample::position(t, [0.3 * t.sin(), 0.3 * t.cos(), 0.0]))
                .unwrap();
        }
        session.reset();
        assert!(session.positions().is_empty());
        assert_eq!(session.max_rom(), 0.0);
        assert_eq!(session.ingest_stats(), IngestStats::default());
        assert!(session.process_sample(&Sample::position(0.0, [0.0; 3])).is_ok());
    }
}
