//! Repetition detection.
//!
//! Three detectors share the `RepDetector` contract:
//!
//! - **Pendulum**: swing peaks. A peak is the sample farthest from where the
//!   current leg of the swing started, confirmed once the next samples move
//!   back toward the start point. A peak counts as a rep when the swing was
//!   long enough (distance and ROM excursion) and the cooldown has elapsed.
//!   Every valid leg is a rep, so one out-and-back swing yields two.
//! - **Circular**: accumulated rotation of the plane-projected position about
//!   a least-squares circle fitted to the recent positions. A rep fires once
//!   the accumulated angle reaches the completion fraction of a full turn.
//! - **Threshold**: rising-edge crossing of a ROM threshold, for camera
//!   exercises where the joint angle itself is the signal.
//!
//! All detectors apply a timestamp-based cooldown, so emitted rep timestamps
//! are strictly increasing.

use std::collections::VecDeque;

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::BoundedHistory;
use crate::plane::MovementPlane;
use crate::types::{RepDirection, RepEvent, Vec3};

/// Per-sample input to a detector.
#[derive(Debug, Clone, Copy)]
pub struct RepInput<'a> {
    pub timestamp: f64,
    /// Current ROM in degrees.
    pub rom: f64,
    /// Tracked point position for world-tracking input.
    pub position: Option<Vec3>,
    pub plane: &'a MovementPlane,
}

/// Shared contract: `on_sample(sample, rom) -> Option<RepEvent>`.
pub trait RepDetector: Send {
    fn on_sample(&mut self, input: &RepInput<'_>) -> Option<RepEvent>;

    /// Reps emitted since construction or the last reset.
    fn rep_count(&self) -> u32;

    fn reset(&mut self);
}

/// Minimum spacing between consecutive reps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cooldown {
    seconds: f64,
    last_fire: Option<f64>,
}

impl Cooldown {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: seconds.max(0.0),
            last_fire: None,
        }
    }

    /// True if a rep may fire at `timestamp`. The first rep is always allowed.
    pub fn ready(&self, timestamp: f64) -> bool {
        match self.last_fire {
            Some(last) => timestamp > last && timestamp - last >= self.seconds,
            None => true,
        }
    }

    pub fn fire(&mut self, timestamp: f64) {
        self.last_fire = Some(timestamp);
    }

    pub fn last_fire(&self) -> Option<f64> {
        self.last_fire
    }

    pub fn reset(&mut self) {
        self.last_fire = None;
    }
}

fn rep_event(index: u32, rom: f64, timestamp: f64, direction: RepDirection) -> RepEvent {
    RepEvent {
        index,
        rom_at_completion: rom,
        timestamp,
        direction,
    }
}

// ============================================================================
// PENDULUM
// ============================================================================

/// Configuration for pendulum swing detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendulumConfig {
    /// Minimum swing distance (m). Raised to 30% of arm length when larger.
    pub min_swing_distance: f64,
    /// Minimum ROM change across a swing leg (deg).
    pub min_rom_deg: f64,
    /// Distance (m) a new leg must travel before peak search resumes.
    pub hysteresis: f64,
    pub cooldown_seconds: f64,
    /// Samples in the peak confirmation window (odd).
    pub peak_window: usize,
}

impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            min_swing_distance: 0.20, // 20 cm
            min_rom_deg: 30.0,
            hysteresis: 0.01,
            cooldown_seconds: 0.3,
            peak_window: 5, // ~80 ms at 60 Hz
        }
    }
}

impl PendulumConfig {
    /// Minimum swing distance scaled to the user's arm.
    pub fn effective_min_distance(&self, arm_length: f64) -> f64 {
        self.min_swing_distance.max(arm_length * 0.30)
    }
}

/// Pendulum detector phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingPhase {
    /// No sample seen yet.
    Idle,
    /// Tracking a leg, searching for its peak.
    Accumulating,
    /// A rep just fired; waiting for the next leg to leave the peak.
    Fired,
}

#[derive(Debug, Clone, Copy)]
struct SwingSample {
    distance: f64,
    position: Vec3,
    rom: f64,
    timestamp: f64,
}

/// Peak-based swing detector.
#[derive(Debug, Clone)]
pub struct PendulumDetector {
    config: PendulumConfig,
    min_distance: f64,
    phase: SwingPhase,
    leg_start: Option<(Vec3, f64)>,
    window: VecDeque<SwingSample>,
    /// Leg vector of the first rep; later legs are tagged relative to it.
    reference_leg: Option<Vec3>,
    cooldown: Cooldown,
    reps: u32,
    rejected_peaks: u64,
}

impl PendulumDetector {
    pub fn new(config: PendulumConfig, arm_length: f64) -> Self {
        Self {
            min_distance: config.effective_min_distance(arm_length),
            window: VecDeque::with_capacity(config.peak_window.max(3)),
            cooldown: Cooldown::new(config.cooldown_seconds),
            config,
            phase: SwingPhase::Idle,
            leg_start: None,
            reference_leg: None,
            reps: 0,
            rejected_peaks: 0,
        }
    }

    pub fn phase(&self) -> SwingPhase {
        self.phase
    }

    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }

    /// Local maxima that failed distance, ROM or cooldown checks.
    pub fn rejected_peaks(&self) -> u64 {
        self.rejected_peaks
    }

    fn window_len(&self) -> usize {
        self.config.peak_window.max(3) | 1
    }

    /// The window's middle sample, if it is a local maximum.
    fn peak_candidate(&self) -> Option<SwingSample> {
        if self.window.len() < self.window_len() {
            return None;
        }
        let middle = self.window[self.window.len() / 2];
        let is_peak = self.window.iter().all(|s| middle.distance >= s.distance);
        is_peak.then_some(middle)
    }

    fn validate(&mut self, peak: &SwingSample, start_rom: f64) -> bool {
        let excursion = (peak.rom - start_rom).abs();
        // Flat stretches are ties everywhere; only count real excursions as rejections.
        if peak.distance < self.config.hysteresis {
            return false;
        }
        let valid = peak.distance >= self.min_distance
            && excursion >= self.config.min_rom_deg
            && self.cooldown.ready(peak.timestamp);
        if !valid {
            self.rejected_peaks += 1;
        }
        valid
    }
}

impl RepDetector for PendulumDetector {
    fn on_sample(&mut self, input: &RepInput<'_>) -> Option<RepEvent> {
        let position = input.plane.project_point(&input.position?);
        let Some((start, start_rom)) = self.leg_start else {
            self.leg_start = Some((position, input.rom));
            self.phase = SwingPhase::Accumulating;
            return None;
        };

        let distance = (position - start).norm();
        if self.phase == SwingPhase::Fired {
            if distance < self.config.hysteresis {
                return None;
            }
            self.phase = SwingPhase::Accumulating;
        }

        self.window.push_back(SwingSample {
            distance,
            position,
            rom: input.rom,
            timestamp: input.timestamp,
        });
        while self.window.len() > self.window_len() {
            self.window.pop_front();
        }

        let peak = self.peak_candidate()?;
        if !self.validate(&peak, start_rom) {
            return None;
        }

        let leg = peak.position - start;
        let reference = *self.reference_leg.get_or_insert(leg);
        let direction = if leg.dot(&reference) >= 0.0 {
            RepDirection::Forward
        } else {
            RepDirection::Backward
        };
        let excursion = (peak.rom - start_rom).abs();

        let event = rep_event(self.reps, excursion, peak.timestamp, direction);
        self.reps += 1;
        self.cooldown.fire(peak.timestamp);
        self.leg_start = Some((peak.position, peak.rom));
        self.window.clear();
        self.phase = SwingPhase::Fired;
        debug!(
            index = event.index,
            distance = peak.distance,
            excursion,
            ?direction,
            "pendulum rep"
        );
        Some(event)
    }

    fn rep_count(&self) -> u32 {
        self.reps
    }

    fn reset(&mut self) {
        self.phase = SwingPhase::Idle;
        self.leg_start = None;
        self.window.clear();
        self.reference_leg = None;
        self.cooldown.reset();
        self.reps = 0;
        self.rejected_peaks = 0;
    }
}

// ============================================================================
// CIRCULAR
// ============================================================================

/// Configuration for circular rotation detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircularConfig {
    /// Fraction of a full turn that completes a rep.
    pub completion_fraction: f64,
    /// Per-sample angle changes above this (deg) are tracking jumps.
    pub max_angle_jump_deg: f64,
    /// Minimum radius (m). Raised to 25% of forearm plus grip when larger.
    pub min_radius: f64,
    pub cooldown_seconds: f64,
    /// Recent positions the rotation circle is fitted to.
    pub center_window: usize,
    pub min_center_samples: usize,
    /// Minimum minor-to-major spread of the fitted points. Shorter arcs give
    /// an unreliable center.
    pub min_fit_aspect: f64,
}

impl Default for CircularConfig {
    fn default() -> Self {
        Self {
            completion_fraction: 0.70,
            max_angle_jump_deg: 45.0,
            min_radius: 0.08, // 8 cm
            cooldown_seconds: 0.5,
            center_window: 300, // 5 s at 60 Hz
            min_center_samples: 8,
            min_fit_aspect: 0.002, // ~20° of arc
        }
    }
}

impl CircularConfig {
    /// Minimum radius scaled to the user's forearm plus grip length.
    pub fn effective_min_radius(&self, forearm_and_grip: f64) -> f64 {
        self.min_radius.max(forearm_and_grip * 0.25)
    }
}

/// Rotation-accumulation detector.
#[derive(Debug, Clone)]
pub struct CircularDetector {
    config: CircularConfig,
    min_radius: f64,
    recent: BoundedHistory<Vec3>,
    fit: Option<CircleFit>,
    /// Previous offset from the rotation center.
    last_offset: Option<Vec3>,
    /// Signed accumulated rotation (rad). Positive is counterclockwise about
    /// the plane normal.
    accumulated: f64,
    cooldown: Cooldown,
    reps: u32,
    jumps: u64,
}

impl CircularDetector {
    pub fn new(config: CircularConfig, forearm_and_grip: f64) -> Self {
        Self {
            min_radius: config.effective_min_radius(forearm_and_grip),
            recent: BoundedHistory::new(config.center_window),
            cooldown: Cooldown::new(config.cooldown_seconds),
            config,
            fit: None,
            last_offset: None,
            accumulated: 0.0,
            reps: 0,
            jumps: 0,
        }
    }

    /// Accumulated rotation toward the next rep, in degrees.
    pub fn accumulated_degrees(&self) -> f64 {
        self.accumulated.to_degrees()
    }

    /// Angle changes discarded as tracking jumps.
    pub fn rejected_jumps(&self) -> u64 {
        self.jumps
    }

    pub fn min_radius(&self) -> f64 {
        self.min_radius
    }

    /// Circle fitted at the last sample, if the recent arc supported one.
    pub fn last_fit(&self) -> Option<CircleFit> {
        self.fit
    }

    fn fit_recent(&self, plane: &MovementPlane) -> Option<CircleFit> {
        let points: Vec<(f64, f64)> = self.recent.iter().map(|p| plane.in_plane_coords(p)).collect();
        fit_circle(&points).filter(|fit| fit.aspect >= self.config.min_fit_aspect)
    }
}

/// Least-squares circle in plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleFit {
    pub center: (f64, f64),
    pub radius: f64,
    /// Minor over major spread of the points: near 0 for a short arc, 1 for a full turn.
    pub aspect: f64,
}

/// Algebraic circle fit: minimizes the residual of `|p - c|² - r²` over the
/// points, solved as a 2x2 linear system about their mean.
///
/// Returns `None` for fewer than three points or points with no spread.
pub fn fit_circle(points: &[(f64, f64)]) -> Option<CircleFit> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let mean = points
        .iter()
        .fold(Vector2::zeros(), |acc, &(u, v)| acc + Vector2::new(u, v))
        / n;

    let mut scatter = Matrix2::zeros();
    let mut moments = Vector2::zeros();
    let mut mean_square = 0.0;
    for &(u, v) in points {
        let d = Vector2::new(u, v) - mean;
        let square = d.norm_squared();
        scatter += d * d.transpose();
        moments += d * square;
        mean_square += square;
    }
    scatter /= n;
    moments /= n;
    mean_square /= n;

    let eigenvalues = scatter.symmetric_eigenvalues();
    let major = eigenvalues[0].max(eigenvalues[1]);
    let minor = eigenvalues[0].min(eigenvalues[1]).max(0.0);
    if !major.is_finite() || major <= f64::EPSILON {
        return None;
    }

    let half = scatter.try_inverse()? * moments / 2.0;
    let radius = (mean_square + half.norm_squared()).sqrt();
    let center = mean + half;
    radius.is_finite().then_some(CircleFit {
        center: (center.x, center.y),
        radius,
        aspect: minor / major,
    })
}

/// Signed angle from `from` to `to` about `normal`, in (-π, π].
///
/// Independent of the plane's in-plane basis, which may rotate between refits.
fn signed_angle(from: &Vec3, to: &Vec3, normal: &Vec3) -> f64 {
    normal.dot(&from.cross(to)).atan2(from.dot(to))
}

impl RepDetector for CircularDetector {
    fn on_sample(&mut self, input: &RepInput<'_>) -> Option<RepEvent> {
        let position = input.position?;
        self.recent.push(position);
        self.fit = if self.recent.len() < self.config.min_center_samples.max(3) {
            None
        } else {
            self.fit_recent(input.plane)
        };
        let Some(fit) = self.fit.filter(|fit| fit.radius >= self.min_radius) else {
            self.last_offset = None;
            return None;
        };

        let plane = input.plane;
        let (u, v) = plane.in_plane_coords(&position);
        let offset = plane.basis_u * (u - fit.center.0) + plane.basis_v * (v - fit.center.1);

        if let Some(last) = self.last_offset {
            let delta = signed_angle(&last, &offset, &input.plane.normal);
            if delta.abs().to_degrees() <= self.config.max_angle_jump_deg {
                self.accumulated += delta;
            } else {
                self.jumps += 1;
            }
        }
        self.last_offset = Some(offset);

        let target = std::f64::consts::TAU * self.config.completion_fraction;
        if self.accumulated.abs() < target || !self.cooldown.ready(input.timestamp) {
            return None;
        }

        let direction = if self.accumulated > 0.0 {
            RepDirection::Counterclockwise
        } else {
            RepDirection::Clockwise
        };
        let event = rep_event(self.reps, input.rom, input.timestamp, direction);
        self.reps += 1;
        self.accumulated = 0.0;
        self.cooldown.fire(input.timestamp);
        debug!(index = event.index, ?direction, radius = fit.radius, "circular rep");
        Some(event)
    }

    fn rep_count(&self) -> u32 {
        self.reps
    }

    fn reset(&mut self) {
        self.recent.clear();
        self.fit = None;
        self.last_offset = None;
        self.accumulated = 0.0;
        self.cooldown.reset();
        self.reps = 0;
        self.jumps = 0;
    }
}

// ============================================================================
// THRESHOLD
// ============================================================================

/// Rising-edge ROM threshold detector.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    threshold_deg: f64,
    above: bool,
    cooldown: Cooldown,
    reps: u32,
}

impl ThresholdDetector {
    pub fn new(threshold_deg: f64, cooldown_seconds: f64) -> Self {
        Self {
            threshold_deg,
            above: false,
            cooldown: Cooldown::new(cooldown_seconds),
            reps: 0,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_deg
    }
}

impl RepDetector for ThresholdDetector {
    fn on_sample(&mut self, input: &RepInput<'_>) -> Option<RepEvent> {
        let was_above = self.above;
        self.above = input.rom >= self.threshold_deg;
        if !self.above || was_above || !self.cooldown.ready(input.timestamp) {
            return None;
        }
        let event = rep_event(self.reps, input.rom, input.timestamp, RepDirection::Na);
        self.reps += 1;
        self.cooldown.fire(input.timestamp);
        Some(event)
    }

    fn rep_count(&self) -> u32 {
        self.reps
    }

    fn reset(&mut self) {
        self.above = false;
        self.cooldown.reset();
        self.reps = 0;
    }
}
