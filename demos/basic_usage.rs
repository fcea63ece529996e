/// Basic usage example: feed pendulum swings, watch reps and ROM, export
use motion_metrics::{
    EngineConfig, ExerciseConfig, MotionSession, Sample, SessionCoordinator, SessionSnapshot,
};

const HZ: f64 = 60.0;
const ARM: f64 = 0.6;

fn main() {
    println!("=== Motion Metrics Engine: Basic Example ===\n");

    // Pendulum exercise with default biometrics (60 cm arm)
    let config = EngineConfig::for_exercise(ExerciseConfig::pendulum());

    // Simulated hand positions: settle at rest, then three eased swings
    let samples = pendulum_swings(3, 80.0);
    println!("Processing {} samples...\n", samples.len());

    // Synchronous pipeline: outcome per sample
    let mut session = MotionSession::new(config.clone());
    for sample in &samples {
        match session.process_sample(sample) {
            Ok(outcome) => {
                if let Some(rep) = outcome.rep {
                    println!(
                        "  rep {} at {:.2}s: {:.1}° ({:?})",
                        rep.index, rep.timestamp, rep.rom_at_completion, rep.direction
                    );
                }
            }
            Err(rejection) => println!("  dropped sample: {}", rejection),
        }
    }
    println!("\nCurrent ROM: {:.1}°", session.current_rom());
    println!("Max ROM:     {:.1}°", session.max_rom());
    println!("Smoothness:  {:?}", session.smoothness());

    // Same trace through the background worker
    let mut coordinator = SessionCoordinator::new();
    if let Err(e) = coordinator.start(config) {
        eprintln!("failed to start session: {}", e);
        return;
    }
    for sample in samples {
        if let Err(e) = coordinator.submit(sample) {
            eprintln!("submit failed: {}", e);
        }
    }
    match coordinator.stop() {
        Ok(snapshot) => print_snapshot(&snapshot),
        Err(e) => eprintln!("failed to stop session: {}", e),
    }
}

fn pendulum_swings(count: usize, amplitude_deg: f64) -> Vec<Sample> {
    let mut angles = vec![0.0; 36];
    for _ in 0..count {
        angles.extend((1..=120).map(|k| {
            let phase = std::f64::consts::TAU * k as f64 / 120.0;
            amplitude_deg * (1.0 - phase.cos()) / 2.0
        }));
        angles.extend([0.0; 6]);
    }
    angles
        .into_iter()
        .enumerate()
        .map(|(i, phi): (usize, f64)| {
            let r = phi.to_radians();
            Sample::position(i as f64 / HZ, [ARM * r.sin(), -ARM * r.cos(), 0.0])
        })
        .collect()
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("\n=== Summary ===");
    println!("Reps:        {}", snapshot.rep_count);
    println!("ROM per rep: {:?}", snapshot.rom_per_rep);
    println!("Average ROM: {:?}", snapshot.average_rom());
    println!("Smoothness:  {:?}", snapshot.sparc_history);
    println!("Duration:    {:.1}s", snapshot.session_duration);
    match snapshot.to_json() {
        Ok(json) => println!("\nExport:\n{}", json),
        Err(e) => eprintln!("export failed: {}", e),
    }
}
