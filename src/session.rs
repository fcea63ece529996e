//! Session coordinator.
//!
//! Runs a `MotionSession` on a dedicated worker thread. The producer pushes
//! samples through an mpsc channel and never blocks on processing; the
//! consumer reads `LiveMetrics` or receives `RepEvent`s.
//!
//! Concurrency rules:
//! - The worker is the only writer of session state.
//! - `LiveMetrics` is replaced as a whole value under an `RwLock` after every
//!   command, so a reader never observes a half-updated set of fields.
//! - `stop()` is queued behind every sample already submitted, so the
//!   snapshot reflects all of them.
//! - The snapshot is cached: repeated `stop()` calls return the same value.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::export::SessionSnapshot;
use crate::ingest::IngestStats;
use crate::pipeline::MotionSession;
use crate::types::{RepEvent, Sample, TrackingQuality};

/// Values readable while the worker is live.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetrics {
    pub current_rom: f64,
    #[serde(rename = "maxROM")]
    pub max_rom: f64,
    pub rep_count: u32,
    pub latest_rep: Option<RepEvent>,
    /// Latest smoothness timeline value.
    pub smoothness: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub ingest: IngestStats,
}

impl LiveMetrics {
    fn from_session(session: &MotionSession) -> Self {
        Self {
            current_rom: session.current_rom(),
            max_rom: session.max_rom(),
            rep_count: session.rep_count(),
            latest_rep: session.latest_rep(),
            smoothness: session.smoothness(),
            last_timestamp: session.last_timestamp(),
            ingest: session.ingest_stats(),
        }
    }
}

enum Command {
    Sample(Box<Sample>),
    Quality(TrackingQuality),
    Stop(Sender<SessionSnapshot>),
}

struct Worker {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
    exercise: &'static str,
}

/// Owns the session lifecycle: `start`, `stop`, `reset`.
pub struct SessionCoordinator {
    live: Arc<RwLock<LiveMetrics>>,
    worker: Option<Worker>,
    rep_events: Option<Receiver<RepEvent>>,
    last_snapshot: Option<Arc<SessionSnapshot>>,
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self {
            live: Arc::new(RwLock::new(LiveMetrics::default())),
            worker: None,
            rep_events: None,
            last_snapshot: None,
        }
    }

    /// Starts a fresh session. Nothing carries over from a previous one.
    pub fn start(&mut self, config: EngineConfig) -> Result<()> {
        if self.worker.is_some() {
            return Err(EngineError::SessionAlreadyRunning);
        }
        config.validate()?;

        self.publish(LiveMetrics::default());
        self.last_snapshot = None;

        let (commands, inbox) = mpsc::channel();
        let (rep_tx, rep_rx) = mpsc::channel();
        let live = Arc::clone(&self.live);
        let exercise = config.exercise.name();

        let handle = thread::Builder::new()
            .name("motion-session".into())
            .spawn(move || run_worker(config, inbox, live, rep_tx))?;

        info!(exercise, "session started");
        self.worker = Some(Worker {
            commands,
            handle,
            exercise,
        });
        self.rep_events = Some(rep_rx);
        Ok(())
    }

    /// Queues a sample. Never blocks on processing.
    pub fn submit(&self, sample: Sample) -> Result<()> {
        let Some(worker) = &self.worker else {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            live.ingest.after_stop += 1;
            return Err(EngineError::SessionNotRunning);
        };
        worker
            .commands
            .send(Command::Sample(Box::new(sample)))
            .map_err(|_| EngineError::WorkerDisconnected)
    }

    /// Forwards the tracking-quality signal. Takes effect in sample order.
    pub fn set_quality(&self, quality: TrackingQuality) -> Result<()> {
        let worker = self.worker.as_ref().ok_or(EngineError::SessionNotRunning)?;
        worker
            .commands
            .send(Command::Quality(quality))
            .map_err(|_| EngineError::WorkerDisconnected)
    }

    /// Current live values. Consistent as a whole.
    pub fn live(&self) -> LiveMetrics {
        *self.live.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared handle for readers on other threads.
    pub fn live_handle(&self) -> Arc<RwLock<LiveMetrics>> {
        Arc::clone(&self.live)
    }

    /// Rep event stream for the current session. Available once per start.
    pub fn take_rep_events(&mut self) -> Option<Receiver<RepEvent>> {
        self.rep_events.take()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stops the session after draining queued samples.
    ///
    /// Calling again returns the cached snapshot.
    pub fn stop(&mut self) -> Result<Arc<SessionSnapshot>> {
        let Some(worker) = self.worker.take() else {
            return self
                .last_snapshot
                .clone()
                .ok_or(EngineError::SessionNotRunning);
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        let sent = worker.commands.send(Command::Stop(reply_tx)).is_ok();
        let reply = if sent { reply_rx.recv().ok() } else { None };
        let joined = worker.handle.join();

        let snapshot = match (reply, joined) {
            (Some(snapshot), Ok(())) => snapshot,
            (_, Err(_)) => {
                warn!(exercise = worker.exercise, "session worker panicked");
                return Err(EngineError::WorkerPanicked);
            }
            (None, Ok(())) => {
                warn!(exercise = worker.exercise, "session worker exited without snapshot");
                return Err(EngineError::WorkerDisconnected);
            }
        };

        info!(
            exercise = worker.exercise,
            reps = snapshot.rep_count,
            max_rom = snapshot.max_rom,
            timeline = snapshot.sparc_data_points.len(),
            "session stopped"
        );
        let snapshot = Arc::new(snapshot);
        self.last_snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn last_snapshot(&self) -> Option<Arc<SessionSnapshot>> {
        self.last_snapshot.clone()
    }

    /// Discards any running session, its snapshot and live values.
    pub fn reset(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.commands);
            if worker.handle.join().is_err() {
                warn!("session worker panicked during reset");
            }
        }
        self.rep_events = None;
        self.last_snapshot = None;
        self.publish(LiveMetrics::default());
        debug!("session coordinator reset");
    }

    fn publish(&self, metrics: LiveMetrics) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = metrics;
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.commands);
            let _ = worker.handle.join();
        }
    }
}

fn run_worker(
    config: EngineConfig,
    inbox: Receiver<Command>,
    live: Arc<RwLock<LiveMetrics>>,
    rep_events: Sender<RepEvent>,
) {
    let mut session = MotionSession::new(config);
    let publish = |session: &MotionSession| {
        *live.write().unwrap_or_else(PoisonError::into_inner) = LiveMetrics::from_session(session);
    };

    while let Ok(command) = inbox.recv() {
        match command {
            Command::Sample(sample) => {
                if let Ok(outcome) = session.process_sample(&sample) {
                    if let Some(rep) = outcome.rep {
                        // The consumer may not listen; reps are still recorded.
                        let _ = rep_events.send(rep);
                    }
                }
                publish(&session);
            }
            Command::Quality(quality) => {
                session.set_quality(quality);
                publish(&session);
            }
            Command::Stop(reply) => {
                publish(&session);
                if reply.send(session.snapshot()).is_err() {
                    debug!("stop requester went away");
                }
                return;
            }
        }
    }
    debug!("command channel closed, worker exiting");
}
