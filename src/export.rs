//! Session export.
//!
//! `SessionSnapshot` is the immutable end-of-session record the game/UI
//! layer persists. It is assembled once by `SnapshotBuilder` from the
//! session's bounded histories, and is self-contained: every array a
//! downstream consumer reads is present, finite and, where possible,
//! non-empty.
//!
//! Field names follow the persisted layout (`romHistory`, `maxROM`, ...).
//!
//! Assembly rules:
//! - `romHistory` and `romPerRep` hold one value per rep, never per-frame
//!   samples.
//! - `sparcHistory` falls back from per-rep scores to the session score, then
//!   to timeline values.
//! - `sparcDataPoints` falls back from the timeline to per-rep points stamped
//!   at the rep timestamps.
//! - Non-finite values are dropped, not zero-filled.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::ingest::IngestStats;
use crate::types::{RepEvent, SmoothnessPoint};

/// Complete session data for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Exercise shape name.
    pub exercise: String,
    /// Peak ROM reached within each rep (deg).
    pub rom_history: Vec<f64>,
    /// ROM credited at each rep's completion (deg).
    pub rom_per_rep: Vec<f64>,
    /// Per-rep smoothness scores (0-100).
    pub sparc_history: Vec<f64>,
    /// Smoothness timeline.
    pub sparc_data_points: Vec<SmoothnessPoint>,
    #[serde(rename = "maxROM")]
    pub max_rom: f64,
    /// All reps in the session, including those evicted from the histories.
    pub rep_count: u32,
    pub rep_timestamps: Vec<f64>,
    /// Seconds between the first and last accepted sample.
    pub session_duration: f64,
    /// SPARC score over the whole session, if computable.
    #[serde(default)]
    pub session_sparc: Option<f64>,
    #[serde(default)]
    pub ingest: IngestStats,
}

impl SessionSnapshot {
    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Single-line JSON for streaming/logging.
    pub fn to_compact_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Snapshot with no data, for a stop without any accepted sample.
    pub fn empty(exercise: &str) -> Self {
        SnapshotBuilder::new(exercise).build()
    }

    /// Mean of the per-rep ROM values.
    pub fn average_rom(&self) -> Option<f64> {
        if self.rom_per_rep.is_empty() {
            return None;
        }
        Some(self.rom_per_rep.iter().sum::<f64>() / self.rom_per_rep.len() as f64)
    }
}

// ============================================================================
// SNAPSHOT BUILDER
// ============================================================================

/// Collects session histories and assembles a `SessionSnapshot`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    exercise: String,
    reps: Vec<RepEvent>,
    rom_peaks: Vec<f64>,
    rep_sparc: Vec<f64>,
    timeline: Vec<SmoothnessPoint>,
    session_sparc: Option<f64>,
    max_rom: f64,
    rep_count: u32,
    duration: f64,
    ingest: IngestStats,
}

impl SnapshotBuilder {
    pub fn new(exercise: &str) -> Self {
        Self {
            exercise: exercise.to_string(),
            ..Self::default()
        }
    }

    /// Rep events with the peak ROM of each rep interval, oldest first.
    pub fn reps(mut self, reps: Vec<RepEvent>, rom_peaks: Vec<f64>) -> Self {
        self.reps = reps;
        self.rom_peaks = rom_peaks;
        self
    }

    pub fn rep_sparc(mut self, scores: Vec<f64>) -> Self {
        self.rep_sparc = scores;
        self
    }

    pub fn timeline(mut self, points: Vec<SmoothnessPoint>) -> Self {
        self.timeline = points;
        self
    }

    pub fn session_sparc(mut self, score: Option<f64>) -> Self {
        self.session_sparc = score;
        self
    }

    pub fn max_rom(mut self, max_rom: f64) -> Self {
        self.max_rom = max_rom;
        self
    }

    pub fn rep_count(mut self, count: u32) -> Self {
        self.rep_count = count;
        self
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn ingest(mut self, stats: IngestStats) -> Self {
        self.ingest = stats;
        self
    }

    pub fn build(self) -> SessionSnapshot {
        let rom_per_rep = finite(self.reps.iter().map(|r| r.rom_at_completion));
        let rep_timestamps = finite(self.reps.iter().map(|r| r.timestamp));
        // Peak within the interval is at least the credited value.
        let rom_history = finite(
            self.reps
                .iter()
                .zip(self.rom_peaks.iter().copied().chain(std::iter::repeat(f64::NAN)))
                .map(|(rep, peak)| {
                    if peak.is_finite() {
                        peak.max(rep.rom_at_completion)
                    } else {
                        rep.rom_at_completion
                    }
                }),
        );

        let timeline: Vec<SmoothnessPoint> =
            self.timeline.into_iter().filter(|p| p.is_finite()).collect();
        let session_sparc = self.session_sparc.filter(|s| s.is_finite());

        let mut sparc_history = finite(self.rep_sparc.iter().copied());
        if sparc_history.is_empty() {
            if let Some(score) = session_sparc {
                sparc_history.push(score);
            } else {
                sparc_history = timeline.iter().map(|p| p.value).collect();
            }
            if !sparc_history.is_empty() && self.rep_count > 0 {
                warn!(values = sparc_history.len(), "per-rep smoothness missing, using fallback");
            }
        }

        let sparc_data_points = if timeline.is_empty() {
            self.reps
                .iter()
                .zip(self.rep_sparc.iter())
                .map(|(rep, score)| SmoothnessPoint::new(rep.timestamp, *score))
                .filter(|p| p.is_finite())
                .collect()
        } else {
            timeline
        };

        SessionSnapshot {
            exercise: self.exercise,
            rom_history,
            rom_per_rep,
            sparc_history,
            sparc_data_points,
            max_rom: if self.max_rom.is_finite() { self.max_rom } else { 0.0 },
            rep_count: self.rep_count,
            rep_timestamps,
            session_duration: if self.duration.is_finite() {
                self.duration.max(0.0)
            } else {
                0.0
            },
            session_sparc,
            ingest: self.ingest,
        }
    }
}

fn finite(values: impl Iterator<Item = f64>) -> Vec<f64> {
    values.filter(|v| v.is_finite()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepDirection;

    fn rep(index: u32, rom: f64, timestamp: f64) -> RepEvent {
        RepEvent {
            index,
            rom_at_completion: rom,
            timestamp,
            direction: RepDirection::Forward,
        }
    }

    #[test]
    fn test_builder_assembles_per_rep_arrays() {
        let snapshot = SnapshotBuilder::new("pendulum")
            .reps(vec![rep(0, 40.0, 1.0), rep(1, 42.0, 2.0)], vec![45.0, 41.0])
            .rep_sparc(vec![80.0, 85.0])
            .max_rom(45.0)
            .rep_count(2)
            .duration(3.0)
            .build();
        assert_eq!(snapshot.rom_history, vec![45.0, 42.0]);
        assert_eq!(snapshot.rom_per_rep, vec![40.0, 42.0]);
        assert_eq!(snapshot.rep_timestamps, vec![1.0, 2.0]);
        assert_eq!(snapshot.sparc_history, vec![80.0, 85.0]);
        // No timeline: per-rep points stand in.
        assert_eq!(snapshot.sparc_data_points.len(), 2);
        assert_eq!(snapshot.average_rom(), Some(41.0));
    }

    #[test]
    fn test_non_finite_values_are_dropped() {
        let snapshot = SnapshotBuilder::new("circular")
            .reps(vec![rep(0, f64::NAN, 1.0), rep(1, 30.0, 2.0)], vec![])
            .rep_sparc(vec![f64::INFINITY, 70.0])
            .timeline(vec![
                SmoothnessPoint::new(0.5, 90.0),
                SmoothnessPoint::new(1.0, f64::NAN),
            ])
            .max_rom(f64::NAN)
            .rep_count(2)
            .build();
        assert_eq!(snapshot.rom_per_rep, vec![30.0]);
        assert_eq!(snapshot.rom_history, vec![30.0]);
        assert_eq!(snapshot.sparc_history, vec![70.0]);
        assert_eq!(snapshot.sparc_data_points, vec![SmoothnessPoint::new(0.5, 90.0)]);
        assert_eq!(snapshot.max_rom, 0.0);
    }

    #[test]
    fn test_sparc_history_fallbacks() {
        let with_session = SnapshotBuilder::new("pendulum").session_sparc(Some(77.0)).build();
        assert_eq!(with_session.sparc_history, vec![77.0]);

        let timeline_only = SnapshotBuilder::new("pendulum")
            .timeline(vec![SmoothnessPoint::new(0.1, 60.0), SmoothnessPoint::new(0.2, 65.0)])
            .build();
        assert_eq!(timeline_only.sparc_history, vec![60.0, 65.0]);
        assert_eq!(timeline_only.sparc_data_points.len(), 2);

        let empty = SessionSnapshot::empty("pendulum");
        assert!(empty.sparc_history.is_empty());
        assert_eq!(empty.rep_count, 0);
        assert_eq!(empty.average_rom(), None);
    }

    #[test]
    fn test_json_field_names() {
        let snapshot = SnapshotBuilder::new("pendulum")
            .reps(vec![rep(0, 40.0, 1.0)], vec![44.0])
            .max_rom(44.0)
            .rep_count(1)
            .build();
        let json = snapshot.to_compact_json().unwrap();
        for field in [
            "\"romHistory\"",
            "\"romPerRep\"",
            "\"sparcHistory\"",
            "\"sparcDataPoints\"",
            "\"maxROM\"",
            "\"repCount\"",
            "\"repTimestamps\"",
            "\"sessionDuration\"",
        ] {
            assert!(json.contains(field), "missing {} in {}", field, json);
        }
        let parsed = SessionSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_parse_minimal_layout() {
        let json = r#"{
            "exercise": "pendulum",
            "romHistory": [50.0], "romPerRep": [48.0], "sparcHistory": [81.5],
            "sparcDataPoints": [{"timestamp": 1.0, "value": 81.5}],
            "maxROM": 50.0, "repCount": 1, "repTimestamps": [1.0],
            "sessionDuration": 2.0
        }"#;
        let snapshot = SessionSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.rep_count, 1);
        assert_eq!(snapshot.session_sparc, None);
        assert_eq!(snapshot.ingest, IngestStats::default());
        assert!(SessionSnapshot::from_json("{").is_err());
    }
}
