//! Movement smoothness.
//!
//! Two measures over the speed profile of the tracked point:
//!
//! 1. **Timeline** (live): every `tick_interval` samples the mean absolute
//!    speed derivative (a jerk-like measure) over the last `window` speed
//!    samples is normalized against the session's observed jerk range and
//!    inverted, giving a 0-100 value where higher is smoother.
//! 2. **SPARC** (per rep and per session): spectral arc length of the speed
//!    profile. The profile is resampled to a uniform rate, zero-padded and
//!    transformed; the arc length of the normalized magnitude spectrum up to
//!    an adaptive cutoff is mapped onto 0-100.
//!
//! Speeds come from consecutive positions divided by elapsed time, so
//! irregular sampling is handled. Samples with non-positive elapsed time or
//! non-finite speed are skipped, and a window with fewer than two speeds
//! produces no timeline point.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::history::BoundedHistory;
use crate::types::{SmoothnessPoint, Vec3};

/// Spectral arc length parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparcConfig {
    /// Uniform resampling rate (Hz).
    pub resample_hz: f64,
    /// Upper bound of the analysed band (Hz).
    pub max_frequency: f64,
    /// Normalized magnitude below which the band is cut off.
    pub amplitude_threshold: f64,
    /// Extra doublings of the FFT length beyond the signal length.
    pub padding_level: u32,
    /// Minimum resampled points for a result.
    pub min_samples: usize,
    /// Arc length mapped to a score of 0.
    pub floor: f64,
    /// Arc length mapped to a score of 100.
    pub ceiling: f64,
}

impl Default for SparcConfig {
    fn default() -> Self {
        Self {
            resample_hz: 60.0,
            max_frequency: 10.0,     // Voluntary movement band
            amplitude_threshold: 0.05,
            padding_level: 4,
            min_samples: 8,
            floor: -6.0,             // Very jerky
            ceiling: -1.5,           // Single minimum-jerk reach is ~-1.4
        }
    }
}

impl SparcConfig {
    /// Maps an arc length onto 0-100.
    pub fn score(&self, arc_length: f64) -> f64 {
        let span = self.ceiling - self.floor;
        if span <= 0.0 {
            return 0.0;
        }
        ((arc_length - self.floor) / span * 100.0).clamp(0.0, 100.0)
    }
}

/// Parameters for the smoothness analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothnessConfig {
    /// Speed samples in the rolling jerk window.
    pub window: usize,
    /// Speed samples between timeline evaluations.
    pub tick_interval: usize,
    pub sparc: SparcConfig,
}

impl Default for SmoothnessConfig {
    fn default() -> Self {
        Self {
            window: 10,
            tick_interval: 5,
            sparc: SparcConfig::default(),
        }
    }
}

/// One speed sample (m/s, or image units/s for camera input).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub timestamp: f64,
    pub speed: f64,
}

/// Spectral arc length of a speed profile.
///
/// Returns `None` when the profile is too short or carries no energy. The
/// result is negative; values closer to zero are smoother.
pub fn spectral_arc_length(samples: &[SpeedSample], config: &SparcConfig) -> Option<f64> {
    let resampled = resample(samples, config.resample_hz)?;
    let n = resampled.len();
    if n < config.min_samples.max(2) {
        return None;
    }

    let nfft = n.next_power_of_two() << config.padding_level.min(8);
    let mut buffer: Vec<Complex<f64>> = resampled.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(nfft, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nfft);
    fft.process(&mut buffer);

    let resolution = config.resample_hz / nfft as f64;
    let max_bin = ((config.max_frequency / resolution).floor() as usize).min(nfft / 2);
    let magnitudes: Vec<f64> = buffer[..=max_bin].iter().map(|c| c.norm()).collect();
    let peak = magnitudes.iter().copied().fold(0.0_f64, f64::max);
    if !peak.is_finite() || peak < 1e-12 {
        return None;
    }
    let normalized: Vec<f64> = magnitudes.iter().map(|m| m / peak).collect();

    // Adaptive cutoff: last bin still above the amplitude threshold.
    let cutoff = normalized
        .iter()
        .rposition(|&m| m >= config.amplitude_threshold)
        .unwrap_or(0);
    if cutoff == 0 {
        return Some(0.0);
    }

    let df = 1.0 / cutoff as f64;
    let arc = normalized[..=cutoff]
        .windows(2)
        .map(|pair| (df * df + (pair[1] - pair[0]).powi(2)).sqrt())
        .sum::<f64>();
    Some(-arc)
}

/// Linear interpolation onto a uniform grid starting at the first sample.
fn resample(samples: &[SpeedSample], rate_hz: f64) -> Option<Vec<f64>> {
    let first = samples.first()?;
    let last = samples.last()?;
    let duration = last.timestamp - first.timestamp;
    if rate_hz.is_nan() || rate_hz <= 0.0 || !duration.is_finite() || duration <= 0.0 {
        return None;
    }

    let count = (duration * rate_hz).floor() as usize + 1;
    let mut out = Vec::with_capacity(count);
    let mut j = 0;
    for i in 0..count {
        let t = first.timestamp + i as f64 / rate_hz;
        while j + 2 < samples.len() && samples[j + 1].timestamp < t {
            j += 1;
        }
        let a = samples[j];
        let b = samples[(j + 1).min(samples.len() - 1)];
        let span = b.timestamp - a.timestamp;
        let f = if span > 0.0 {
            ((t - a.timestamp) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(a.speed + (b.speed - a.speed) * f);
    }
    Some(out)
}

/// Rolling smoothness analyzer fed from the position stream.
#[derive(Debug, Clone)]
pub struct SmoothnessAnalyzer {
    config: SmoothnessConfig,
    last_position: Option<(f64, Vec3)>,
    window: BoundedHistory<SpeedSample>,
    since_tick: usize,
    /// Observed (min, max) local jerk for the session.
    jerk_range: Option<(f64, f64)>,
    latest: Option<f64>,
    timeline: BoundedHistory<SmoothnessPoint>,
    session_speeds: BoundedHistory<SpeedSample>,
    rep_speeds: BoundedHistory<SpeedSample>,
}

impl SmoothnessAnalyzer {
    pub fn new(config: SmoothnessConfig, timeline_capacity: usize, speed_capacity: usize) -> Self {
        Self {
            window: BoundedHistory::new(config.window.max(2)),
            config,
            last_position: None,
            since_tick: 0,
            jerk_range: None,
            latest: None,
            timeline: BoundedHistory::new(timeline_capacity),
            session_speeds: BoundedHistory::new(speed_capacity),
            rep_speeds: BoundedHistory::new(speed_capacity),
        }
    }

    /// Feeds a position. Returns a timeline point on evaluation ticks.
    pub fn on_position(&mut self, timestamp: f64, position: Vec3) -> Option<SmoothnessPoint> {
        let previous = self.last_position.replace((timestamp, position));
        let (last_t, last_p) = previous?;
        let dt = timestamp - last_t;
        if dt <= 0.0 {
            return None;
        }
        let speed = (position - last_p).norm() / dt;
        if !speed.is_finite() {
            return None;
        }

        let sample = SpeedSample { timestamp, speed };
        self.window.push(sample);
        self.session_speeds.push(sample);
        self.rep_speeds.push(sample);
        self.since_tick += 1;

        if self.since_tick < self.config.tick_interval.max(1) {
            return None;
        }
        self.since_tick = 0;
        self.evaluate(timestamp)
    }

    fn evaluate(&mut self, timestamp: f64) -> Option<SmoothnessPoint> {
        let jerk = local_jerk(self.window.iter().copied())?;
        let (min, max) = match self.jerk_range {
            Some((min, max)) => (min.min(jerk), max.max(jerk)),
            None => (jerk, jerk),
        };
        self.jerk_range = Some((min, max));

        let range = max - min;
        let value = if range > 1e-9 {
            100.0 * (1.0 - (jerk - min) / range)
        } else {
            100.0
        };
        let point = SmoothnessPoint::new(timestamp, value.clamp(0.0, 100.0));
        if !point.is_finite() {
            return None;
        }
        self.latest = Some(point.value);
        self.timeline.push(point);
        Some(point)
    }

    /// Closes the current rep segment and returns its SPARC score.
    pub fn mark_rep(&mut self) -> Option<f64> {
        let samples = self.rep_speeds.snapshot();
        self.rep_speeds.clear();
        // Keep the boundary sample so the next segment starts where this ended.
        if let Some(last) = samples.last() {
            self.rep_speeds.push(*last);
        }
        let arc = spectral_arc_length(&samples, &self.config.sparc);
        if arc.is_none() {
            debug!(samples = samples.len(), "rep segment too short for SPARC");
        }
        arc.map(|a| self.config.sparc.score(a))
    }

    /// SPARC score over the recorded session speed profile.
    pub fn session_score(&self) -> Option<f64> {
        let samples = self.session_speeds.snapshot();
        match spectral_arc_length(&samples, &self.config.sparc) {
            Some(arc) => Some(self.config.sparc.score(arc)),
            None => {
                if !samples.is_empty() {
                    warn!(samples = samples.len(), "session SPARC unavailable");
                }
                None
            }
        }
    }

    /// Most recent timeline value.
    pub fn latest(&self) -> Option<f64> {
        self.latest
    }

    pub fn timeline(&self) -> &BoundedHistory<SmoothnessPoint> {
        &self.timeline
    }

    pub fn speed_samples(&self) -> usize {
        self.session_speeds.len()
    }

    pub fn reset(&mut self) {
        self.last_position = None;
        self.window.clear();
        self.since_tick = 0;
        self.jerk_range = None;
        self.latest = None;
        self.timeline.clear();
        self.session_speeds.clear();
        self.rep_speeds.clear();
    }
}

/// Mean absolute speed derivative over consecutive samples.
fn local_jerk(samples: impl Iterator<Item = SpeedSample>) -> Option<f64> {
    let mut previous: Option<SpeedSample> = None;
    let mut sum = 0.0;
    let mut count = 0usize;
    for sample in samples {
        if let Some(prev) = previous {
            let dt = sample.timestamp - prev.timestamp;
            if dt > 0.0 {
                sum += ((sample.speed - prev.speed) / dt).abs();
                count += 1;
            }
        }
        previous = Some(sample);
    }
    (count > 0).then(|| sum / count as f64)
}
