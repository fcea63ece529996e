//! Motion Metrics replay tool
//!
//! Feeds a recorded JSON-lines capture through a session and prints the
//! final snapshot. Each line is either a sample or a tracking-quality change:
//!
//! ```text
//! {"timestamp":0.016,"kind":"position","position":[0.0,-0.6,0.0]}
//! {"quality":"degraded"}
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::{info, warn};

use motion_metrics::{EngineConfig, ExerciseConfig, Sample, SessionCoordinator, TrackingQuality};

#[derive(Parser)]
#[command(author, version, about = "Replay recorded tracking samples through the motion metrics engine", long_about = None)]
struct Args {
    /// JSON-lines capture. Reads stdin when omitted.
    input: Option<PathBuf>,

    /// TOML engine configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exercise preset. Replaces the config file's exercise section.
    #[arg(short, long, value_enum)]
    exercise: Option<Preset>,

    /// Print rep events to stderr as they are detected.
    #[arg(long)]
    reps: bool,

    /// Single-line JSON output.
    #[arg(long)]
    compact: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Pendulum,
    Circular,
    ElbowExtension,
    ShoulderRaise,
}

impl Preset {
    fn exercise(self) -> ExerciseConfig {
        match self {
            Preset::Pendulum => ExerciseConfig::pendulum(),
            Preset::Circular => ExerciseConfig::circular(),
            Preset::ElbowExtension => ExerciseConfig::elbow_extension(),
            Preset::ShoulderRaise => ExerciseConfig::shoulder_raise(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Quality { quality: TrackingQuality },
    Sample(Sample),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(preset) = args.exercise {
        config.exercise = preset.exercise();
    }

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut coordinator = SessionCoordinator::new();
    coordinator.start(config).context("starting session")?;

    let printer = if args.reps {
        coordinator.take_rep_events().map(|events| {
            thread::spawn(move || {
                for rep in events {
                    eprintln!(
                        "rep {:>3}  t={:>8.3}s  rom={:>6.1}°  {:?}",
                        rep.index, rep.timestamp, rep.rom_at_completion, rep.direction
                    );
                }
            })
        })
    } else {
        None
    };

    let mut submitted = 0u64;
    let mut malformed = 0u64;
    for (number, line) in reader.lines().enumerate() {
        let line = line.context("reading input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<ReplayLine>(trimmed) {
            Ok(ReplayLine::Sample(sample)) => {
                coordinator.submit(sample)?;
                submitted += 1;
            }
            Ok(ReplayLine::Quality { quality }) => coordinator.set_quality(quality)?,
            Err(err) => {
                malformed += 1;
                warn!(line = number + 1, %err, "skipping malformed line");
            }
        }
    }

    let snapshot = coordinator.stop().context("stopping session")?;
    if let Some(handle) = printer {
        let _ = handle.join();
    }
    info!(submitted, malformed, reps = snapshot.rep_count, "replay finished");

    let json = if args.compact {
        snapshot.to_compact_json()?
    } else {
        snapshot.to_json()?
    };
    println!("{json}");
    Ok(())
}
