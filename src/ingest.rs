//! Ingestion gate: sample validation and tracking-quality gating.
//!
//! Every sample passes through here before it reaches a history or a fit.
//! A sample is rejected when:
//! - any coordinate, the timestamp, or the confidence is NaN/infinite,
//! - tracking quality is not `Normal`,
//! - its timestamp does not advance past the last accepted sample.
//!
//! Rejection is not an error condition for the session. The gate counts the
//! reason, logs it (rate-limited, the feed runs at sensor rate) and the caller
//! drops the sample.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SampleRejection;
use crate::types::{Sample, TrackingQuality};

/// Log the first rejection of each kind, then every Nth.
const LOG_EVERY: u64 = 100;

/// Per-session ingestion counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestStats {
    pub accepted: u64,
    pub non_finite: u64,
    pub non_monotonic: u64,
    pub degraded_quality: u64,
    /// Samples submitted after `stop()` was requested.
    pub after_stop: u64,
}

impl IngestStats {
    pub fn rejected(&self) -> u64 {
        self.non_finite + self.non_monotonic + self.degraded_quality + self.after_stop
    }

    fn record(&mut self, rejection: &SampleRejection) -> u64 {
        let counter = match rejection {
            SampleRejection::NonFinite => &mut self.non_finite,
            SampleRejection::NonMonotonic { .. } => &mut self.non_monotonic,
            SampleRejection::TrackingQuality(_) => &mut self.degraded_quality,
            SampleRejection::SessionStopped => &mut self.after_stop,
        };
        *counter += 1;
        *counter
    }
}

/// Stateful validator owned by the session worker.
#[derive(Debug, Clone, Default)]
pub struct SampleGate {
    quality: TrackingQuality,
    last_timestamp: Option<f64>,
    stats: IngestStats,
}

impl SampleGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quality(&mut self, quality: TrackingQuality) {
        if quality != self.quality {
            debug!(?quality, previous = ?self.quality, "tracking quality changed");
        }
        self.quality = quality;
    }

    pub fn quality(&self) -> TrackingQuality {
        self.quality
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Validates a sample. On success the sample's timestamp becomes the
    /// new monotonic floor.
    pub fn admit(&mut self, sample: &Sample) -> Result<(), SampleRejection> {
        let verdict = self.evaluate(sample);
        match &verdict {
            Ok(()) => {
                self.last_timestamp = Some(sample.timestamp);
                self.stats.accepted += 1;
            }
            Err(rejection) => self.reject(*rejection),
        }
        verdict
    }

    /// Counts a rejection decided outside the gate (e.g. a stopping session).
    pub fn reject(&mut self, rejection: SampleRejection) {
        let count = self.stats.record(&rejection);
        if count == 1 || count % LOG_EVERY == 0 {
            debug!(%rejection, count, "sample dropped");
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn evaluate(&self, sample: &Sample) -> Result<(), SampleRejection> {
        if !sample.is_finite() {
            return Err(SampleRejection::NonFinite);
        }
        if self.quality != TrackingQuality::Normal {
            return Err(SampleRejection::TrackingQuality(self.quality));
        }
        if let Some(previous) = self.last_timestamp {
            if sample.timestamp <= previous {
                return Err(SampleRejection::NonMonotonic {
                    previous,
                    current: sample.timestamp,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_increasing_timestamps() {
        let mut gate = SampleGate::new();
        for i in 0..10 {
            let sample = Sample::position(i as f64 * 0.02, [0.0, 0.0, 0.0]);
            assert!(gate.admit(&sample).is_ok());
        }
        assert_eq!(gate.stats().accepted, 10);
        assert_eq!(gate.stats().rejected(), 0);
    }

    #[test]
    fn test_rejects_non_monotonic_and_repeated_timestamps() {
        let mut gate = SampleGate::new();
        assert!(gate.admit(&Sample::position(1.0, [0.0; 3])).is_ok());

        let repeated = gate.admit(&Sample::position(1.0, [0.0; 3]));
        assert_eq!(
            repeated,
            Err(SampleRejection::NonMonotonic {
                previous: 1.0,
                current: 1.0
            })
        );
        assert!(gate.admit(&Sample::position(0.5, [0.0; 3])).is_err());
        assert!(gate.admit(&Sample::position(1.1, [0.0; 3])).is_ok());
        assert_eq!(gate.stats().non_monotonic, 2);
        assert_eq!(gate.last_timestamp(), Some(1.1));
    }

    #[test]
    fn test_rejects_non_finite_without_moving_floor() {
        let mut gate = SampleGate::new();
        assert!(gate.admit(&Sample::position(1.0, [0.0; 3])).is_ok());
        assert_eq!(
            gate.admit(&Sample::position(2.0, [f64::NAN, 0.0, 0.0])),
            Err(SampleRejection::NonFinite)
        );
        assert_eq!(gate.last_timestamp(), Some(1.0));
        assert_eq!(gate.stats().non_finite, 1);
    }

    #[test]
    fn test_degraded_quality_drops_samples() {
        let mut gate = SampleGate::new();
        gate.set_quality(TrackingQuality::Degraded);
        assert_eq!(
            gate.admit(&Sample::position(1.0, [0.0; 3])),
            Err(SampleRejection::TrackingQuality(TrackingQuality::Degraded))
        );
        gate.set_quality(TrackingQuality::Unavailable);
        assert!(gate.admit(&Sample::position(1.1, [0.0; 3])).is_err());
        gate.set_quality(TrackingQuality::Normal);
        assert!(gate.admit(&Sample::position(1.2, [0.0; 3])).is_ok());
        assert_eq!(gate.stats().degraded_quality, 2);
        assert_eq!(gate.stats().accepted, 1);
    }

    #[test]
    fn test_reset_clears_floor_and_counters() {
        let mut gate = SampleGate::new();
        gate.admit(&Sample::position(5.0, [0.0; 3])).unwrap();
        gate.reject(SampleRejection::SessionStopped);
        gate.reset();
        assert_eq!(gate.last_timestamp(), None);
        assert_eq!(gate.stats(), IngestStats::default());
        assert!(gate.admit(&Sample::position(0.0, [0.0; 3])).is_ok());
    }
}
