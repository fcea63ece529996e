//! Engine configuration.
//!
//! `EngineConfig` is accepted once at `start(config)`. Every section and
//! field has a documented default, so a TOML file only needs the options it
//! changes:
//!
//! ```toml
//! [exercise]
//! shape = "circular"
//! completion_fraction = 0.75
//!
//! [biometrics]
//! arm_length = 0.68
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::plane::PlaneConfig;
use crate::rep_detection::{CircularConfig, PendulumConfig};
use crate::rom::{JointKind, RomConfig};
use crate::smoothness::SmoothnessConfig;
use crate::types::BodySide;

/// Complete configuration for one session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub exercise: ExerciseConfig,
    pub biometrics: Biometrics,
    pub history: HistoryConfig,
    pub plane: PlaneConfig,
    pub rom: RomConfig,
    pub smoothness: SmoothnessConfig,
}

/// Supported exercise shapes. Selected once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ExerciseConfig {
    /// World-tracking swing (pendulum, forward/back raises).
    Pendulum(PendulumConfig),
    /// World-tracking rotation (arm circles).
    Circular(CircularConfig),
    /// Camera joint angle crossing a threshold.
    JointThreshold(JointThresholdConfig),
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        ExerciseConfig::Pendulum(PendulumConfig::default())
    }
}

impl ExerciseConfig {
    pub fn pendulum() -> Self {
        ExerciseConfig::Pendulum(PendulumConfig::default())
    }

    pub fn circular() -> Self {
        ExerciseConfig::Circular(CircularConfig::default())
    }

    /// Elbow extension from a camera feed.
    pub fn elbow_extension() -> Self {
        ExerciseConfig::JointThreshold(JointThresholdConfig {
            joint: JointKind::Elbow,
            side: BodySide::Right,
            threshold_deg: 15.0,
            cooldown_seconds: 0.35,
        })
    }

    /// Lateral shoulder raise from a camera feed.
    pub fn shoulder_raise() -> Self {
        ExerciseConfig::JointThreshold(JointThresholdConfig {
            joint: JointKind::Shoulder,
            side: BodySide::Right,
            threshold_deg: 12.0,
            cooldown_seconds: 0.4,
        })
    }

    /// Stable name used in exports.
    pub fn name(&self) -> &'static str {
        match self {
            ExerciseConfig::Pendulum(_) => "pendulum",
            ExerciseConfig::Circular(_) => "circular",
            ExerciseConfig::JointThreshold(c) => match c.joint {
                JointKind::Elbow => "elbow_threshold",
                JointKind::Shoulder => "shoulder_threshold",
            },
        }
    }

    /// True for exercises driven by pose keypoints rather than world tracking.
    pub fn uses_keypoints(&self) -> bool {
        matches!(self, ExerciseConfig::JointThreshold(_))
    }
}

/// Camera threshold exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointThresholdConfig {
    pub joint: JointKind,
    pub side: BodySide,
    /// ROM (deg) whose rising crossing counts a rep.
    pub threshold_deg: f64,
    pub cooldown_seconds: f64,
}

impl Default for JointThresholdConfig {
    fn default() -> Self {
        Self {
            joint: JointKind::Elbow,
            side: BodySide::Right,
            threshold_deg: 15.0,
            cooldown_seconds: 0.35,
        }
    }
}

/// User body measurements (m).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Biometrics {
    pub arm_length: f64,
    pub forearm_length: f64,
    /// Hand/grip offset beyond the wrist.
    pub grip_offset: f64,
}

impl Default for Biometrics {
    fn default() -> Self {
        Self {
            arm_length: 0.60,
            forearm_length: 0.27,
            grip_offset: 0.05,
        }
    }
}

impl Biometrics {
    pub fn forearm_and_grip(&self) -> f64 {
        self.forearm_length + self.grip_offset
    }
}

/// Capacities of the bounded histories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Positions and speed samples.
    pub positions: usize,
    /// Per-rep values (ROM, timestamps, SPARC).
    pub reps: usize,
    pub smoothness_timeline: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            positions: 3600,           // 60 Hz for 60 s
            reps: 1024,
            smoothness_timeline: 4096,
        }
    }
}

impl EngineConfig {
    /// Default configuration for an exercise shape.
    pub fn for_exercise(exercise: ExerciseConfig) -> Self {
        Self {
            exercise,
            ..Self::default()
        }
    }

    pub fn with_biometrics(mut self, biometrics: Biometrics) -> Self {
        self.biometrics = biometrics;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let h = &self.history;
        positive_count("history.positions", h.positions)?;
        positive_count("history.reps", h.reps)?;
        positive_count("history.smoothness_timeline", h.smoothness_timeline)?;

        let b = &self.biometrics;
        positive("biometrics.arm_length", b.arm_length)?;
        positive("biometrics.forearm_length", b.forearm_length)?;
        non_negative("biometrics.grip_offset", b.grip_offset)?;

        let p = &self.plane;
        positive_count("plane.window", p.window)?;
        positive_count("plane.refit_interval", p.refit_interval)?;
        if p.min_samples < 3 || p.min_samples > p.window {
            return Err(invalid("plane.min_samples must be in [3, plane.window]"));
        }
        fraction("plane.isotropy_ratio", p.isotropy_ratio)?;
        positive("plane.min_variance", p.min_variance)?;
        positive("plane.drift_tolerance", p.drift_tolerance)?;

        let r = &self.rom;
        non_negative("rom.settle_seconds", r.settle_seconds)?;
        positive_count("rom.baseline_displacements", r.baseline_displacements)?;
        positive("rom.min_displacement", r.min_displacement)?;
        non_negative("rom.baseline_min_displacement", r.baseline_min_displacement)?;
        non_negative("rom.noise_floor_factor", r.noise_floor_factor)?;
        positive("rom.baseline_max_spread_deg", r.baseline_max_spread_deg)?;
        fraction("rom.smoothing_alpha", r.smoothing_alpha)?;
        positive("rom.max_rate_deg_per_s", r.max_rate_deg_per_s)?;
        non_negative("rom.radial_gate_min_speed", r.radial_gate_min_speed)?;
        non_negative("rom.radial_gate_max_angular_speed", r.radial_gate_max_angular_speed)?;
        non_negative("rom.joint_confidence_threshold", r.joint_confidence_threshold)?;

        let s = &self.smoothness;
        if s.window < 2 {
            return Err(invalid("smoothness.window must be at least 2"));
        }
        positive_count("smoothness.tick_interval", s.tick_interval)?;
        positive("smoothness.sparc.resample_hz", s.sparc.resample_hz)?;
        positive("smoothness.sparc.max_frequency", s.sparc.max_frequency)?;
        fraction("smoothness.sparc.amplitude_threshold", s.sparc.amplitude_threshold)?;
        if !s.sparc.floor.is_finite() || s.sparc.floor >= s.sparc.ceiling {
            return Err(invalid("smoothness.sparc.floor must be below ceiling"));
        }

        match &self.exercise {
            ExerciseConfig::Pendulum(c) => {
                positive("exercise.min_swing_distance", c.min_swing_distance)?;
                non_negative("exercise.min_rom_deg", c.min_rom_deg)?;
                non_negative("exercise.hysteresis", c.hysteresis)?;
                non_negative("exercise.cooldown_seconds", c.cooldown_seconds)?;
                if c.peak_window < 3 {
                    return Err(invalid("exercise.peak_window must be at least 3"));
                }
            }
            ExerciseConfig::Circular(c) => {
                fraction("exercise.completion_fraction", c.completion_fraction)?;
                positive("exercise.max_angle_jump_deg", c.max_angle_jump_deg)?;
                positive("exercise.min_radius", c.min_radius)?;
                non_negative("exercise.cooldown_seconds", c.cooldown_seconds)?;
                positive_count("exercise.center_window", c.center_window)?;
                positive_count("exercise.min_center_samples", c.min_center_samples)?;
                fraction("exercise.min_fit_aspect", c.min_fit_aspect)?;
            }
            ExerciseConfig::JointThreshold(c) => {
                if c.threshold_deg.is_nan() || c.threshold_deg <= 0.0 || c.threshold_deg >= 180.0 {
                    return Err(invalid("exercise.threshold_deg must be in (0, 180)"));
                }
                non_negative("exercise.cooldown_seconds", c.cooldown_seconds)?;
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig(message.into())
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive and finite, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be non-negative and finite, got {value}")))
    }
}

fn fraction(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be in (0, 1], got {value}")))
    }
}

fn positive_count(name: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exercise.name(), "pendulum");
        assert_eq!(config.history.positions, 3600);
        assert_eq!(config.plane.window, 60);
        for exercise in [
            ExerciseConfig::pendulum(),
            ExerciseConfig::circular(),
            ExerciseConfig::elbow_extension(),
            ExerciseConfig::shoulder_raise(),
        ] {
            assert!(EngineConfig::for_exercise(exercise).validate().is_ok());
        }
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = EngineConfig::from_toml_str(
            r#"
            [exercise]
            shape = "circular"
            completion_fraction = 0.8

            [biometrics]
            arm_length = 0.7

            [rom]
            smoothing_alpha = 0.5
            "#,
        )
        .unwrap();
        match &config.exercise {
            ExerciseConfig::Circular(c) => {
                assert_eq!(c.completion_fraction, 0.8);
                assert_eq!(c.cooldown_seconds, 0.5, "unspecified field keeps default");
            }
            other => panic!("expected circular, got {:?}", other),
        }
        assert_eq!(config.biometrics.arm_length, 0.7);
        assert_eq!(config.biometrics.forearm_length, 0.27);
        assert_eq!(config.rom.smoothing_alpha, 0.5);
        assert_eq!(config.rom.settle_seconds, 0.5);
    }

    #[test]
    fn test_joint_threshold_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [exercise]
            shape = "joint_threshold"
            joint = "shoulder"
            side = "left"
            threshold_deg = 20.0
            "#,
        )
        .unwrap();
        assert!(config.exercise.uses_keypoints());
        assert_eq!(config.exercise.name(), "shoulder_threshold");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig::default();
        config.history.reps = 0;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let mut config = EngineConfig::for_exercise(ExerciseConfig::circular());
        if let ExerciseConfig::Circular(c) = &mut config.exercise {
            c.completion_fraction = 1.5;
        }
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.biometrics.arm_length = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.rom.smoothing_alpha = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.rom.noise_floor_factor = -1.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::for_exercise(ExerciseConfig::circular());
        if let ExerciseConfig::Circular(c) = &mut config.exercise {
            c.min_fit_aspect = 0.0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_shape_is_parse_error() {
        let result = EngineConfig::from_toml_str("[exercise]\nshape = \"zigzag\"\n");
        assert!(matches!(result, Err(EngineError::ConfigParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[exercise]\nshape = \"pendulum\"\nmin_rom_deg = 40.0").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        match config.exercise {
            ExerciseConfig::Pendulum(c) => assert_eq!(c.min_rom_deg, 40.0),
            other => panic!("expected pendulum, got {:?}", other),
        }
        assert!(matches!(
            EngineConfig::load("/nonexistent/motion.toml"),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn test_biometrics_forearm_and_grip() {
        let b = Biometrics::default();
        assert!((b.forearm_and_grip() - 0.32).abs() < 1e-12);
    }
}
