//! Range-of-Motion calculation.
//!
//! Two interchangeable strategies behind the `RomStrategy` trait:
//!
//! - **`DirectionalRom`** (world-tracking input): the angle between the
//!   current displacement from a fixed baseline origin and a fixed baseline
//!   direction, measured after projection onto the movement plane. The origin
//!   is the mean rest position over the settle window, and the jitter seen
//!   there sets a noise floor for everything after. ROM
//!   measures change of direction, not reach: a pure extension along the
//!   baseline direction leaves the angle where it is.
//! - **`JointAngleRom`** (pose-keypoint input): the angle between two limb
//!   segments at a joint, using only confident landmarks.
//!
//! Both keep `max_rom` monotonic for the session and hold the last value when
//! a sample cannot produce a trustworthy angle.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plane::MovementPlane;
use crate::types::{BodySide, Landmark, Sample, Vec3};

/// Parameters for both ROM strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RomConfig {
    /// Time after the first sample before the baseline origin is fixed (s).
    pub settle_seconds: f64,
    /// Post-settle displacements averaged into the baseline direction.
    pub baseline_displacements: usize,
    /// Displacements shorter than this (m) hold the previous angle.
    pub min_displacement: f64,
    /// Displacements shorter than this (m) are not used for the baseline direction.
    pub baseline_min_displacement: f64,
    /// Multiple of the rest jitter (RMS over the settle window) treated as noise.
    pub noise_floor_factor: f64,
    /// Baseline displacements must stay within this angle (deg) of their running
    /// mean. A disagreeing one restarts the collection.
    pub baseline_max_spread_deg: f64,
    /// Exponential smoothing factor applied to the raw angle (0, 1].
    pub smoothing_alpha: f64,
    /// Maximum ROM change rate (deg/s).
    pub max_rate_deg_per_s: f64,
    /// Radial speed (m/s) at or above which a step counts as reach.
    pub radial_gate_min_speed: f64,
    /// Angular speed (deg/s) below which such a step is suppressed.
    pub radial_gate_max_angular_speed: f64,
    /// Landmark confidence the joint-angle strategy requires landmarks to exceed.
    pub joint_confidence_threshold: f64,
}

impl Default for RomConfig {
    fn default() -> Self {
        Self {
            settle_seconds: 0.5,               // Let the tracker settle
            baseline_displacements: 5,
            min_displacement: 0.01,            // 1 cm
            baseline_min_displacement: 0.03,   // 3 cm
            noise_floor_factor: 3.0,
            baseline_max_spread_deg: 30.0,
            smoothing_alpha: 0.35,
            max_rate_deg_per_s: 120.0,         // Faster than any rehab movement
            radial_gate_min_speed: 0.25,       // Deliberate reach
            radial_gate_max_angular_speed: 15.0,
            joint_confidence_threshold: 0.5,
        }
    }
}

/// ROM values shared by both strategies.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RomState {
    /// Degrees in [0, 180].
    pub current_rom: f64,
    /// Session maximum. Never decreases until `reset`.
    pub max_rom: f64,
    /// Fixed once per session (directional strategy only).
    pub baseline_origin: Option<Vec3>,
    /// Unit vector, fixed once per session (directional strategy only).
    pub baseline_direction: Option<Vec3>,
    pub last_update: Option<f64>,
}

impl RomState {
    fn set_current(&mut self, rom: f64, timestamp: f64) {
        self.current_rom = rom.clamp(0.0, 180.0);
        self.max_rom = self.max_rom.max(self.current_rom);
        self.last_update = Some(timestamp);
    }
}

/// Shared contract for ROM strategies: `update(sample) -> current ROM`.
pub trait RomStrategy: Send {
    /// Consumes a validated sample and returns the current ROM in degrees.
    /// Samples of the wrong kind, or that cannot yield an angle, leave the
    /// value unchanged.
    fn update(&mut self, sample: &Sample, plane: &MovementPlane) -> f64;

    fn state(&self) -> &RomState;

    fn reset(&mut self);

    fn current_rom(&self) -> f64 {
        self.state().current_rom
    }

    fn max_rom(&self) -> f64 {
        self.state().max_rom
    }
}

// ============================================================================
// DIRECTIONAL STRATEGY (3D)
// ============================================================================

/// Running position statistics over the settle window (Welford).
#[derive(Debug, Clone, Copy, Default)]
struct SettleStats {
    mean: Vec3,
    /// Sum of squared distances from the running mean.
    m2: f64,
    count: usize,
}

impl SettleStats {
    fn push(&mut self, position: &Vec3) {
        self.count += 1;
        let delta = position - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta.dot(&(position - self.mean));
    }

    /// RMS distance of the samples from their mean.
    fn jitter(&self) -> f64 {
        (self.m2.max(0.0) / self.count.max(1) as f64).sqrt()
    }
}

/// Directional-angle ROM over plane-projected world positions.
#[derive(Debug, Clone)]
pub struct DirectionalRom {
    config: RomConfig,
    state: RomState,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
    settle: SettleStats,
    /// Rest jitter scaled by `noise_floor_factor` (m). Zero until the origin is fixed.
    noise_floor: f64,
    baseline_accum: Vec<Vec3>,
    /// (radius, raw angle) of the previous accepted step.
    previous: Option<(f64, f64)>,
    suppressed: u64,
}

impl DirectionalRom {
    pub fn new(config: RomConfig) -> Self {
        Self {
            baseline_accum: Vec::with_capacity(config.baseline_displacements.max(1)),
            config,
            state: RomState::default(),
            first_timestamp: None,
            last_timestamp: None,
            settle: SettleStats::default(),
            noise_floor: 0.0,
            previous: None,
            suppressed: 0,
        }
    }

    /// True once both baseline origin and direction are fixed.
    pub fn has_baseline(&self) -> bool {
        self.state.baseline_origin.is_some() && self.state.baseline_direction.is_some()
    }

    /// Updates suppressed by the radial gate.
    pub fn radial_suppressions(&self) -> u64 {
        self.suppressed
    }

    /// Displacement (m) below which motion is indistinguishable from rest jitter.
    pub fn noise_floor(&self) -> f64 {
        self.noise_floor
    }

    fn hold_radius(&self) -> f64 {
        self.config.min_displacement.max(self.noise_floor)
    }

    fn establish_direction(&mut self, displacement: &Vec3, timestamp: f64) {
        let radius = displacement.norm();
        if radius < self.config.baseline_min_displacement.max(self.hold_radius()) {
            return;
        }
        let unit = displacement / radius;
        let running = self.baseline_accum.iter().fold(Vec3::zeros(), |acc, d| acc + d);
        if running.norm() > 1e-9 {
            let spread = unit.dot(&running.normalize()).clamp(-1.0, 1.0).acos().to_degrees();
            if spread > self.config.baseline_max_spread_deg {
                debug!(spread, timestamp, "baseline displacements disagree, restarting");
                self.baseline_accum.clear();
            }
        }
        self.baseline_accum.push(unit);
        if self.baseline_accum.len() < self.config.baseline_displacements.max(1) {
            return;
        }
        let sum = self.baseline_accum.iter().fold(Vec3::zeros(), |acc, d| acc + d);
        let norm = sum.norm();
        self.baseline_accum.clear();
        if norm < 1e-9 {
            // Displacements cancelled out; collect a fresh set.
            return;
        }
        let direction = sum / norm;
        debug!(direction = ?direction.as_slice(), timestamp, "baseline direction fixed");
        self.state.baseline_direction = Some(direction);
    }
}

impl RomStrategy for DirectionalRom {
    fn update(&mut self, sample: &Sample, plane: &MovementPlane) -> f64 {
        let current = self.state.current_rom;
        let Some(position) = sample.position_vec() else {
            return current;
        };
        let timestamp = sample.timestamp;
        let first = *self.first_timestamp.get_or_insert(timestamp);

        let Some(origin) = self.state.baseline_origin else {
            self.settle.push(&position);
            if timestamp - first >= self.config.settle_seconds {
                let origin = self.settle.mean;
                let jitter = self.settle.jitter();
                self.noise_floor = self.config.noise_floor_factor * jitter;
                debug!(
                    origin = ?origin.as_slice(),
                    jitter,
                    samples = self.settle.count,
                    timestamp,
                    "baseline origin fixed"
                );
                self.state.baseline_origin = Some(origin);
                self.last_timestamp = Some(timestamp);
            }
            return current;
        };

        let dt = self
            .last_timestamp
            .map(|last| timestamp - last)
            .unwrap_or(0.0);
        self.last_timestamp = Some(timestamp);

        let displacement = position - origin;
        let Some(baseline) = self.state.baseline_direction else {
            self.establish_direction(&displacement, timestamp);
            return current;
        };

        let v = plane.project_vector(&displacement);
        let radius = v.norm();
        if radius < self.hold_radius() {
            return current;
        }

        // A baseline nearly normal to the plane has no usable projection.
        let projected_baseline = plane.project_vector(&baseline);
        let reference = if projected_baseline.norm() > 0.5 {
            projected_baseline.normalize()
        } else {
            baseline
        };
        let raw = (v / radius).dot(&reference).clamp(-1.0, 1.0).acos().to_degrees();

        if let Some((prev_radius, prev_raw)) = self.previous {
            if dt > 0.0 {
                let radial_speed = (radius - prev_radius).abs() / dt;
                let angular_speed = (raw - prev_raw).abs() / dt;
                if radial_speed >= self.config.radial_gate_min_speed
                    && angular_speed < self.config.radial_gate_max_angular_speed
                {
                    self.previous = Some((radius, raw));
                    self.suppressed += 1;
                    return current;
                }
            }
        }
        self.previous = Some((radius, raw));

        let smoothed = current + self.config.smoothing_alpha * (raw - current);
        let limit = self.config.max_rate_deg_per_s * dt.max(0.0);
        let next = current + (smoothed - current).clamp(-limit, limit);
        self.state.set_current(next, timestamp);
        self.state.current_rom
    }

    fn state(&self) -> &RomState {
        &self.state
    }

    fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

// ============================================================================
// JOINT-ANGLE STRATEGY (2D)
// ============================================================================

/// Joint measured by the camera strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    /// Upper arm vs forearm. 0° with the arm straight.
    Elbow,
    /// Torso (shoulder→hip) vs upper arm. 0° with the arm at the side.
    Shoulder,
}

/// Two limb segments whose angle is the joint angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointAngleSpec {
    pub first: (Landmark, Landmark),
    pub second: (Landmark, Landmark),
}

impl JointAngleSpec {
    pub fn for_joint(joint: JointKind, side: BodySide) -> Self {
        match joint {
            JointKind::Elbow => Self {
                first: (side.shoulder(), side.elbow()),
                second: (side.elbow(), side.wrist()),
            },
            JointKind::Shoulder => Self {
                first: (side.shoulder(), side.hip()),
                second: (side.shoulder(), side.elbow()),
            },
        }
    }
}

/// Angle in degrees between segments `a0→a1` and `b0→b1`.
///
/// Returns `None` when either segment is degenerate.
pub fn segment_angle(
    a0: (f64, f64),
    a1: (f64, f64),
    b0: (f64, f64),
    b1: (f64, f64),
) -> Option<f64> {
    let v1 = (a1.0 - a0.0, a1.1 - a0.1);
    let v2 = (b1.0 - b0.0, b1.1 - b0.1);

    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if mag1 < 1e-6 || mag2 < 1e-6 {
        return None;
    }

    let cos_angle = ((v1.0 * v2.0 + v1.1 * v2.1) / (mag1 * mag2)).clamp(-1.0, 1.0);
    Some(cos_angle.acos().to_degrees())
}

/// Joint-angle ROM from 2D landmarks.
#[derive(Debug, Clone)]
pub struct JointAngleRom {
    spec: JointAngleSpec,
    confidence_threshold: f64,
    state: RomState,
    held: u64,
}

impl JointAngleRom {
    pub fn new(spec: JointAngleSpec, confidence_threshold: f64) -> Self {
        Self {
            spec,
            confidence_threshold,
            state: RomState::default(),
            held: 0,
        }
    }

    pub fn spec(&self) -> JointAngleSpec {
        self.spec
    }

    /// Samples that held the previous angle for missing or weak landmarks.
    pub fn held_samples(&self) -> u64 {
        self.held
    }
}

impl RomStrategy for JointAngleRom {
    fn update(&mut self, sample: &Sample, _plane: &MovementPlane) -> f64 {
        let Some(set) = sample.keypoint_set() else {
            return self.state.current_rom;
        };
        let threshold = self.confidence_threshold;
        let point = |landmark| set.confident_point(landmark, threshold);

        let angle = match (
            point(self.spec.first.0),
            point(self.spec.first.1),
            point(self.spec.second.0),
            point(self.spec.second.1),
        ) {
            (Some(a0), Some(a1), Some(b0), Some(b1)) => segment_angle(a0, a1, b0, b1),
            _ => None,
        };

        match angle {
            Some(angle) => self.state.set_current(angle, sample.timestamp),
            None => self.held += 1,
        }
        self.state.current_rom
    }

    fn state(&self) -> &RomState {
        &self.state
    }

    fn reset(&mut self) {
        self.state = RomState::default();
        self.held = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keypoint;

    const HZ: f64 = 60.0;

    fn feed(rom: &mut DirectionalRom, t: &mut f64, p: [f64; 3]) -> f64 {
        *t += 1.0 / HZ;
        rom.update(&Sample::position(*t, p), &MovementPlane::identity())
    }

    /// Rest at the origin through settle, then small steps along +x.
    fn with_baseline() -> (DirectionalRom, f64) {
        let mut rom = DirectionalRom::new(RomConfig::default());
        let mut t = 0.0;
        for _ in 0..36 {
            feed(&mut rom, &mut t, [0.0, 0.0, 0.0]);
        }
        for k in 1..=6 {
            feed(&mut rom, &mut t, [0.02 * k as f64, 0.0, 0.0]);
        }
        assert!(rom.has_baseline());
        (rom, t)
    }

    /// Deterministic pseudo-random stream in [-1, 1).
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            2.0 * ((self.0 >> 11) as f64 / (1u64 << 53) as f64) - 1.0
        }

        fn jitter(&mut self, p: [f64; 3], amplitude: f64) -> [f64; 3] {
            [
                p[0] + amplitude * self.next(),
                p[1] + amplitude * self.next(),
                p[2] + amplitude * self.next(),
            ]
        }
    }

    #[test]
    fn test_no_rom_before_settle() {
        let mut rom = DirectionalRom::new(RomConfig::default());
        let mut t = 0.0;
        for i in 0..20 {
            let value = feed(&mut rom, &mut t, [0.0, 0.01 * i as f64, 0.3]);
            assert_eq!(value, 0.0);
        }
        assert!(rom.state().baseline_origin.is_none());
    }

    #[test]
    fn test_baseline_direction_is_initial_motion() {
        let (rom, _) = with_baseline();
        let direction = rom.state().baseline_direction.unwrap();
        assert!((direction - Vec3::x()).norm() < 1e-9);
        assert_eq!(rom.state().baseline_origin, Some(Vec3::zeros()));
    }

    #[test]
    fn test_origin_is_mean_rest_position() {
        let mut rom = DirectionalRom::new(RomConfig::default());
        let mut t = 0.0;
        let rest = [0.1, -0.5, 0.2];
        for i in 0..36 {
            let dx = if i % 2 == 0 { 0.004 } else { -0.004 };
            feed(&mut rom, &mut t, [rest[0] + dx, rest[1], rest[2]]);
        }
        let origin = rom.state().baseline_origin.expect("origin after settle");
        assert!(
            (origin - Vec3::from(rest)).norm() < 1e-3,
            "origin {:?} should sit at the rest mean, not the last sample",
            origin
        );
        assert!((rom.noise_floor() - 0.012).abs() < 1e-3, "floor {}", rom.noise_floor());
    }

    #[test]
    fn test_rest_jitter_does_not_pick_baseline() {
        let mut rom = DirectionalRom::new(RomConfig::default());
        let mut rng = Lcg(3);
        let mut t = 0.0;
        let rest = [0.1, -0.5, 0.2];
        for _ in 0..100 {
            feed(&mut rom, &mut t, rng.jitter(rest, 0.005));
        }
        let floor = rom.noise_floor();
        assert!(floor > 0.008 && floor < 0.025, "5 mm jitter floor {}", floor);
        assert!(rom.state().baseline_direction.is_none(), "jitter is not motion");
        assert_eq!(rom.max_rom(), 0.0);

        // A deliberate move along +y through the same jitter.
        for k in 1..=10 {
            let p = [rest[0], rest[1] + 0.01 * k as f64, rest[2]];
            feed(&mut rom, &mut t, rng.jitter(p, 0.005));
        }
        let direction = rom.state().baseline_direction.expect("baseline from real motion");
        let error = direction.dot(&Vec3::y()).clamp(-1.0, 1.0).acos().to_degrees();
        assert!(error < 15.0, "baseline {:?} is {}° off the motion", direction, error);
    }

    #[test]
    fn test_disagreeing_displacements_restart_baseline() {
        let mut rom = DirectionalRom::new(RomConfig::default());
        let mut t = 0.0;
        for _ in 0..36 {
            feed(&mut rom, &mut t, [0.0; 3]);
        }
        // A stray step along +x, then a steady motion along +y.
        feed(&mut rom, &mut t, [0.04, 0.0, 0.0]);
        for k in 4..=8 {
            feed(&mut rom, &mut t, [0.0, 0.01 * k as f64, 0.0]);
        }
        let direction = rom.state().baseline_direction.unwrap();
        assert!((direction - Vec3::y()).norm() < 1e-9, "got {:?}", direction);
    }

    #[test]
    fn test_quarter_turn_reaches_ninety() {
        let (mut rom, mut t) = with_baseline();
        // Reach out to 0.3 m, then sweep an arc from +x to +y.
        for k in 7..=15 {
            feed(&mut rom, &mut t, [0.02 * k as f64, 0.0, 0.0]);
        }
        for k in 1..=90 {
            let a = (k as f64).to_radians();
            feed(&mut rom, &mut t, [0.3 * a.cos(), 0.3 * a.sin(), 0.0]);
        }
        for _ in 0..60 {
            feed(&mut rom, &mut t, [0.0, 0.3, 0.0]);
        }
        let current = rom.current_rom();
        assert!((current - 90.0).abs() < 1.0, "expected ~90°, got {}", current);
        assert!(rom.max_rom() >= current - 1e-9);
    }

    #[test]
    fn test_radial_reach_does_not_inflate_rom() {
        let (mut rom, mut t) = with_baseline();
        let start = rom.current_rom();
        // Out to 0.6 m and back along the baseline with sub-millimetre wobble.
        for k in 1..=60 {
            let x = 0.1 + 0.5 * k as f64 / 60.0;
            let wobble = 0.0003 * (k as f64 * 1.7).sin();
            feed(&mut rom, &mut t, [x, wobble, -wobble]);
        }
        for k in 1..=60 {
            let x = 0.6 - 0.58 * k as f64 / 60.0;
            let wobble = 0.0003 * (k as f64 * 2.3).sin();
            feed(&mut rom, &mut t, [x, wobble, wobble]);
        }
        assert!(rom.max_rom() - start < 2.0, "reach inflated ROM to {}", rom.max_rom());
        assert!(rom.current_rom() < 2.0);
    }

    #[test]
    fn test_fast_reach_is_gated() {
        let (mut rom, mut t) = with_baseline();
        // 0.05 m per sample at 60 Hz = 3 m/s straight along baseline.
        for k in 1..=10 {
            feed(&mut rom, &mut t, [0.1 + 0.05 * k as f64, 0.0, 0.0]);
        }
        assert!(rom.radial_suppressions() > 0);
        assert!(rom.current_rom() < 1e-6);
    }

    #[test]
    fn test_rate_cap_limits_jump() {
        let (mut rom, mut t) = with_baseline();
        feed(&mut rom, &mut t, [0.2, 0.0, 0.0]);
        let before = rom.current_rom();
        let after = feed(&mut rom, &mut t, [0.0, 0.2, 0.0]);
        let cap = RomConfig::default().max_rate_deg_per_s / HZ;
        assert!(after - before <= cap + 1e-9, "jumped {} > cap {}", after - before, cap);
        assert!(after > before);
    }

    #[test]
    fn test_near_origin_holds_previous_angle() {
        let (mut rom, mut t) = with_baseline();
        for k in 1..=60 {
            let a = (k as f64 * 1.5).to_radians();
            feed(&mut rom, &mut t, [0.3 * a.cos(), 0.3 * a.sin(), 0.0]);
        }
        let held = rom.current_rom();
        assert!(held > 30.0);
        let value = feed(&mut rom, &mut t, [0.001, -0.002, 0.0]);
        assert_eq!(value, held);
    }

    #[test]
    fn test_max_rom_is_monotonic() {
        let (mut rom, mut t) = with_baseline();
        let mut last_max = 0.0;
        for k in 0..240 {
            let a = (60.0 * ((k as f64) / 40.0).sin().abs()).to_radians();
            feed(&mut rom, &mut t, [0.3 * a.cos(), 0.3 * a.sin(), 0.0]);
            assert!(rom.max_rom() >= last_max);
            last_max = rom.max_rom();
        }
        assert!(rom.max_rom() > 50.0);
        assert!(rom.current_rom() < rom.max_rom());
    }

    #[test]
    fn test_keypoint_samples_ignored_by_directional() {
        let (mut rom, mut t) = with_baseline();
        t += 0.1;
        let value = rom.update(&Sample::keypoints(t, vec![]), &MovementPlane::identity());
        assert_eq!(value, rom.current_rom());
    }

    #[test]
    fn test_reset_clears_baseline_and_max() {
        let (mut rom, mut t) = with_baseline();
        for k in 1..=30 {
            let a = (k as f64 * 2.0).to_radians();
            feed(&mut rom, &mut t, [0.3 * a.cos(), 0.3 * a.sin(), 0.0]);
        }
        assert!(rom.max_rom() > 0.0);
        rom.reset();
        assert!(!rom.has_baseline());
        assert_eq!(rom.max_rom(), 0.0);
    }

    #[test]
    fn test_segment_angle_straight_and_bent() {
        let straight = segment_angle((0.0, 0.0), (0.5, 0.0), (0.5, 0.0), (1.0, 0.0)).unwrap();
        assert!(straight.abs() < 1e-9);
        let bent = segment_angle((0.0, 0.0), (0.5, 0.0), (0.5, 0.0), (0.5, 0.5)).unwrap();
        assert!((bent - 90.0).abs() < 1e-9);
        assert!(segment_angle((0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (1.0, 0.0)).is_none());
    }

    fn arm(t: f64, elbow_deg: f64, wrist_confidence: f64) -> Sample {
        let a = elbow_deg.to_radians();
        Sample::keypoints(
            t,
            vec![
                Keypoint::new(Landmark::RightShoulder, 0.5, 0.2, 0.9),
                Keypoint::new(Landmark::RightElbow, 0.5, 0.5, 0.9),
                Keypoint::new(
                    Landmark::RightWrist,
                    0.5 + 0.3 * a.sin(),
                    0.5 + 0.3 * a.cos(),
                    wrist_confidence,
                ),
                Keypoint::new(Landmark::RightHip, 0.5, 0.9, 0.9),
            ],
        )
    }

    #[test]
    fn test_elbow_joint_angle() {
        let spec = JointAngleSpec::for_joint(JointKind::Elbow, BodySide::Right);
        let mut rom = JointAngleRom::new(spec, 0.5);
        let plane = MovementPlane::identity();
        assert!(rom.update(&arm(0.0, 0.0, 0.9), &plane).abs() < 1e-6);
        let bent = rom.update(&arm(0.1, 60.0, 0.9), &plane);
        assert!((bent - 60.0).abs() < 1e-6, "got {}", bent);
        assert!((rom.max_rom() - 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_low_confidence_holds_last_angle() {
        let spec = JointAngleSpec::for_joint(JointKind::Elbow, BodySide::Right);
        let mut rom = JointAngleRom::new(spec, 0.5);
        let plane = MovementPlane::identity();
        rom.update(&arm(0.0, 40.0, 0.9), &plane);
        let held = rom.update(&arm(0.1, 90.0, 0.2), &plane);
        assert!((held - 40.0).abs() < 1e-6);
        assert_eq!(rom.held_samples(), 1);

        let missing = Sample::keypoints(0.2, vec![Keypoint::new(Landmark::RightShoulder, 0.0, 0.0, 1.0)]);
        assert!((rom.update(&missing, &plane) - 40.0).abs() < 1e-6);
        assert_eq!(rom.held_samples(), 2);
    }

    #[test]
    fn test_shoulder_joint_angle() {
        let spec = JointAngleSpec::for_joint(JointKind::Shoulder, BodySide::Left);
        let mut rom = JointAngleRom::new(spec, 0.5);
        let sample = Sample::keypoints(
            0.0,
            vec![
                Keypoint::new(Landmark::LeftShoulder, 0.4, 0.3, 0.9),
                Keypoint::new(Landmark::LeftHip, 0.4, 0.8, 0.9),
                Keypoint::new(Landmark::LeftElbow, 0.1, 0.3, 0.9),
            ],
        );
        let angle = rom.update(&sample, &MovementPlane::identity());
        assert!((angle - 90.0).abs() < 1e-6, "arm straight out should be 90°, got {}", angle);
    }
}
