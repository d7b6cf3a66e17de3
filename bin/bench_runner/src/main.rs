mod scenario;

use std::collections::HashMap;
use std::env;
use std::process;

use criterion::{black_box, Criterion};
use rig_core::config::{load_config, RigConfig};
use rig_core::ranging::distance_from_pulse;
use rig_core::{ActuatorState, CycleRecord, PanTiltController, TargetPoint};

use scenario::run_replay;

const DEFAULT_CYCLES: usize = 1_000;

struct Options {
    config_path: Option<String>,
    cycles: usize,
    csv_path: Option<String>,
    use_criterion: bool,
}

fn usage() -> ! {
    eprintln!("Usage: bench_runner [config_file] [--cycles N] [--csv out.csv] [--criterion]");
    eprintln!("Example: bench_runner --cycles 5000 --csv replay.csv");
    eprintln!("Example: bench_runner configs/rig.toml --criterion");
    process::exit(1);
}

fn parse_options() -> Options {
    let mut options = Options {
        config_path: None,
        cycles: DEFAULT_CYCLES,
        csv_path: None,
        use_criterion: false,
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cycles" => {
                options.cycles = match args.next().and_then(|n| n.parse().ok()) {
                    Some(n) => n,
                    None => usage(),
                }
            }
            "--csv" => options.csv_path = Some(args.next().unwrap_or_else(|| usage())),
            "--criterion" => options.use_criterion = true,
            "-h" | "--help" => usage(),
            _ if options.config_path.is_none() && !arg.starts_with('-') => {
                options.config_path = Some(arg)
            }
            _ => usage(),
        }
    }
    options
}

fn analyze_results_detailed(records: &[CycleRecord], virtual_elapsed_us: u64) {
    if records.is_empty() {
        println!("No results to analyze");
        return;
    }

    let total = records.len();
    let found = records.iter().filter(|r| r.target_found).count();
    let alerts = records.iter().filter(|r| r.led_on).count();

    println!("\n=== Replay Analysis ===");
    println!("Total cycles: {}", total);
    println!(
        "Target found: {} ({:.1}%)",
        found,
        found as f64 / total as f64 * 100.0
    );
    println!("Virtual run time: {:.2} s", virtual_elapsed_us as f64 / 1_000_000.0);

    let pan_min = records.iter().map(|r| r.pan_command).fold(f64::INFINITY, f64::min);
    let pan_max = records.iter().map(|r| r.pan_command).fold(f64::NEG_INFINITY, f64::max);
    let tilt_min = records.iter().map(|r| r.tilt_command).fold(f64::INFINITY, f64::min);
    let tilt_max = records.iter().map(|r| r.tilt_command).fold(f64::NEG_INFINITY, f64::max);
    println!("Pan command (us): min={:.1}, max={:.1}", pan_min, pan_max);
    println!("Tilt command (us): min={:.1}, max={:.1}", tilt_min, tilt_max);

    let distances: Vec<f64> = records.iter().filter_map(|r| r.distance_cm).collect();
    if !distances.is_empty() {
        let avg = distances.iter().sum::<f64>() / distances.len() as f64;
        let min = distances.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = distances.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        println!(
            "Distance (cm): avg={:.1}, min={:.1}, max={:.1} over {} valid readings",
            avg,
            min,
            max,
            distances.len()
        );
    }

    let faults = records
        .iter()
        .filter_map(|r| r.range_fault)
        .fold(HashMap::new(), |mut acc, label| {
            *acc.entry(label).or_insert(0usize) += 1;
            acc
        });
    if !faults.is_empty() {
        println!("Range faults:");
        for (label, count) in faults {
            println!("  {}: {}", label, count);
        }
    }
    println!(
        "Alerts raised: {} ({:.1}%)",
        alerts,
        alerts as f64 / total as f64 * 100.0
    );

    let cycle_ms: Vec<f64> = records.iter().map(|r| r.cycle_time_us as f64 / 1000.0).collect();
    let avg = cycle_ms.iter().sum::<f64>() / cycle_ms.len() as f64;
    let max = cycle_ms.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    println!("Cycle work time (ms, excl. cadence): avg={:.2}, max={:.2}", avg, max);
}

fn benchmark_replay(c: &mut Criterion, config: &RigConfig) {
    c.bench_function("control_loop_replay_200", |b| {
        b.iter(|| {
            let outcome = run_replay(black_box(config), 200).expect("replay failed");
            black_box(outcome.summary);
        });
    });
}

fn benchmark_controller(c: &mut Criterion, config: &RigConfig) {
    let controller = PanTiltController::new(&config.tracking, &config.camera);
    c.bench_function("pan_tilt_compute", |b| {
        b.iter(|| {
            let mut state = ActuatorState::centered(config.tracking.initial_cmd);
            for x in (0..640).step_by(16) {
                state = controller
                    .compute(state, black_box(TargetPoint::Found { x, y: 480 - x / 2 }))
                    .state;
            }
            black_box(state);
        });
    });

    c.bench_function("distance_from_pulse", |b| {
        b.iter(|| {
            for us in (0..30_000).step_by(250) {
                black_box(distance_from_pulse(black_box(us), &config.ranging));
            }
        });
    });
}

fn main() {
    let options = parse_options();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();

    let config = match &options.config_path {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Failed to load config {}: {}", path, e);
            process::exit(1);
        }),
        None => RigConfig::default(),
    };

    println!("========================================");
    println!("Ras-Eye Control Loop Replay");
    println!("========================================");
    println!("Config: {}", options.config_path.as_deref().unwrap_or("<defaults>"));
    println!(
        "Gains: pan {} / tilt {}, dead zone {} px",
        config.tracking.kp_pan, config.tracking.kp_tilt, config.tracking.dead_zone_px
    );
    println!(
        "Settle {} ms, cadence {} ms, alert below {} cm",
        config.timing.settle_ms, config.timing.cadence_ms, config.alert.threshold_cm
    );
    if options.use_criterion {
        println!("Using Criterion for statistical analysis");
    } else {
        println!("Cycles: {}", options.cycles);
    }
    println!("========================================\n");

    if options.use_criterion {
        let mut criterion = Criterion::default()
            .sample_size(20)
            .measurement_time(std::time::Duration::from_secs(10));

        benchmark_replay(&mut criterion, &config);
        benchmark_controller(&mut criterion, &config);
        criterion.final_summary();

        println!("\n========================================");
        println!("Criterion statistical analysis complete!");
        println!("Check the target/criterion directory for detailed HTML reports.");
        println!("========================================");
        return;
    }

    let start = std::time::Instant::now();
    let outcome = match run_replay(&config, options.cycles) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Replay failed: {}", e);
            process::exit(1);
        }
    };
    println!(
        "Replayed {} cycles in {:.3} s wall time ({:?})",
        outcome.summary.cycles,
        start.elapsed().as_secs_f64(),
        outcome.summary.exit
    );

    analyze_results_detailed(&outcome.recorder.get_results(), outcome.virtual_elapsed_us);
    println!("Diagnostics: {:?}", outcome.diagnostics);

    if let Some(path) = &options.csv_path {
        if let Err(e) = outcome.recorder.save_to_csv(path) {
            eprintln!("Failed to save CSV: {}", e);
            process::exit(1);
        }
        println!("Results saved to {}", path);
    }
}
