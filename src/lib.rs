//! Motion Metrics Engine Library
//!
//! Turns a live stream of tracking samples into three derived signals for
//! rehabilitation exercises:
//!
//! - a **Range-of-Motion** angle (current and session maximum),
//! - discrete **repetition** events,
//! - a 0-100 **smoothness** score with a timestamped timeline.
//!
//! Input is either 3D world-tracking positions or 2D pose keypoints with
//! per-landmark confidence.
//!
//! # Design Philosophy
//!
//! - **Direction, not reach**: ROM measures change of direction in the
//!   movement plane. Extending straight out and back does not inflate it.
//! - **Degrade, never halt**: bad samples are dropped and counted, failed
//!   fits keep the last good plane, and a stalled detector simply emits no
//!   event.
//! - **Bounded by construction**: every recorded stream is a fixed-capacity
//!   FIFO history.
//! - **Single writer**: one worker owns all session state; consumers read
//!   whole-value snapshots.
//!
//! # Example
//!
//! ```no_run
//! use motion_metrics::{EngineConfig, ExerciseConfig, Sample, SessionCoordinator};
//!
//! let mut coordinator = SessionCoordinator::new();
//! coordinator.start(EngineConfig::for_exercise(ExerciseConfig::pendulum()))?;
//! coordinator.submit(Sample::position(0.0, [0.0, -0.6, 0.0]))?;
//! let snapshot = coordinator.stop()?;
//! println!("{}", snapshot.to_json()?);
//! # Ok::<(), motion_metrics::EngineError>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod ingest;
pub mod pipeline;
pub mod plane;
pub mod rep_detection;
pub mod rom;
pub mod session;
pub mod smoothness;
pub mod types;


// Re-export commonly used types
pub use config::{Biometrics, EngineConfig, ExerciseConfig, HistoryConfig, JointThresholdConfig};
pub use error::{EngineError, Result, SampleRejection};
pub use export::{SessionSnapshot, SnapshotBuilder};
pub use history::BoundedHistory;
pub use ingest::{IngestStats, SampleGate};
pub use pipeline::{MotionSession, SampleOutcome};
pub use plane::{MovementPlane, PlaneConfig, PlaneDetector};
pub use rep_detection::{
    fit_circle, CircleFit, CircularConfig, CircularDetector, Cooldown, PendulumConfig,
    PendulumDetector, RepDetector, RepInput, ThresholdDetector,
};
pub use rom::{DirectionalRom, JointAngleRom, JointKind, RomConfig, RomState, RomStrategy};
pub use session::{LiveMetrics, SessionCoordinator};
pub use smoothness::{SmoothnessAnalyzer, SmoothnessConfig, SparcConfig};
pub use types::{
    BodySide, Keypoint, KeypointSet, Landmark, RepDirection, RepEvent, Sample, SamplePayload,
    SmoothnessPoint, TrackingQuality, Vec3,
};
