mod menu;

use std::env;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use log::{error, info, warn};

use pi_hardware::{PiClock, PiRig};
use rig_core::config::{load_config, RigConfig};
use rig_core::{LoopExit, LoopSummary, RangeMonitor, SharedDiagnostics, UltrasonicRanger};

const CONFIG_ENV: &str = "RAS_EYE_CONFIG";

struct Args {
    mode: Option<String>,
    config_path: Option<String>,
}

/// Shutdown flag raised by Ctrl-C while a mode is running. Ctrl-C at the menu
/// exits the process.
struct Shutdown {
    requested: AtomicBool,
    running: AtomicBool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let config = resolve_config(args.config_path.as_deref())?;

    info!("===========================================");
    info!("Ras-Eye face tracking rig");
    info!("===========================================");

    let shutdown = Arc::new(Shutdown {
        requested: AtomicBool::new(false),
        running: AtomicBool::new(false),
    });
    install_ctrl_c_handler(Arc::clone(&shutdown))?;

    let launch = |mode: Mode| match mode {
        Mode::Track => run_mode(&shutdown, || run_tracking(&config, &shutdown.requested)),
        Mode::Range => run_mode(&shutdown, || run_range_test(&config, &shutdown.requested)),
        Mode::Config => {
            print_config(&config);
            Ok(())
        }
    };

    match args.mode.as_deref() {
        Some(name) => match Mode::from_arg(name) {
            Some(mode) => launch(mode),
            None => bail!("unknown mode '{}', expected track, range or config", name),
        },
        None => {
            let mut input = io::stdin().lock();
            run_menu(&mut input, launch)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Track,
    Range,
    Config,
}

impl Mode {
    fn from_arg(name: &str) -> Option<Self> {
        match name {
            "track" => Some(Mode::Track),
            "range" => Some(Mode::Range),
            "config" => Some(Mode::Config),
            _ => None,
        }
    }
}

/// Interactive mode selection. A mode that fails ends the menu with its
/// error; a mode stopped by Ctrl-C returns here.
fn run_menu<R, F>(input: &mut R, mut launch: F) -> anyhow::Result<()>
where
    R: BufRead,
    F: FnMut(Mode) -> anyhow::Result<()>,
{
    loop {
        menu::show_menu();

        let mode = match menu::get_user_choice(input)? {
            Some(1) => Mode::Track,
            Some(2) => Mode::Range,
            Some(3) => Mode::Config,
            Some(4) => {
                println!("Goodbye!");
                return Ok(());
            }
            _ => {
                println!("Invalid choice. Please select 1-4.");
                continue;
            }
        };

        launch(mode)?;
        menu::wait_for_enter(input)?;
    }
}

fn run_mode<F>(shutdown: &Shutdown, mode: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    shutdown.requested.store(false, Ordering::SeqCst);
    shutdown.running.store(true, Ordering::SeqCst);
    let result = mode();
    shutdown.running.store(false, Ordering::SeqCst);
    result
}

fn install_ctrl_c_handler(shutdown: Arc<Shutdown>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Ctrl-C handler stopped: {}", e);
                        return;
                    }
                    if !shutdown.running.load(Ordering::SeqCst) {
                        std::process::exit(130);
                    }
                    info!("Ctrl-C received, stopping after this cycle");
                    shutdown.requested.store(true, Ordering::SeqCst);
                }
            })
        })
        .context("failed to spawn Ctrl-C thread")?;
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args {
        mode: None,
        config_path: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config_path = Some(path);
            }
            _ if arg.starts_with('-') => bail!(
                "unknown option '{}'\nUsage: ras-eye [track|range|config] [--config <file>]",
                arg
            ),
            _ if parsed.mode.is_none() => parsed.mode = Some(arg),
            _ => bail!("unexpected argument '{}'", arg),
        }
    }
    Ok(parsed)
}

fn resolve_config(cli_path: Option<&str>) -> anyhow::Result<RigConfig> {
    let path = cli_path
        .map(str::to_owned)
        .or_else(|| env::var(CONFIG_ENV).ok());

    match path {
        Some(path) => {
            let config =
                load_config(&path).with_context(|| format!("failed to load config {}", path))?;
            info!("Configuration loaded from {}", path);
            Ok(config)
        }
        None => {
            let config = RigConfig::default();
            config.validate()?;
            info!("No configuration file given, using built-in defaults");
            Ok(config)
        }
    }
}

fn print_config(config: &RigConfig) {
    let (cx, cy) = config.camera.center();
    println!(
        "Camera: {}x{} (centre {}, {}), device {}",
        config.camera.width, config.camera.height, cx, cy, config.camera.device_index
    );
    println!("Cascade: {}", config.camera.cascade_path.display());
    println!(
        "Pins: pan {}, tilt {}, trig {}, echo {}, led {}",
        config.pins.pan_servo,
        config.pins.tilt_servo,
        config.pins.trigger,
        config.pins.echo,
        config.pins.led
    );
    println!(
        "Tracking: kp_pan {}, kp_tilt {}, dead zone {} px, command range {}-{} us",
        config.tracking.kp_pan,
        config.tracking.kp_tilt,
        config.tracking.dead_zone_px,
        config.tracking.min_cmd,
        config.tracking.max_cmd
    );
    println!(
        "Ranging: timeout {} us, max range {} cm, alert below {} cm",
        config.ranging.echo_timeout_us, config.ranging.max_range_cm, config.alert.threshold_cm
    );
    println!(
        "Timing: settle {} ms, cadence {} ms",
        config.timing.settle_ms, config.timing.cadence_ms
    );
}

#[cfg(feature = "camera")]
fn run_tracking(config: &RigConfig, shutdown: &AtomicBool) -> anyhow::Result<()> {
    use pi_hardware::{CameraSource, CascadeLocator};
    use rig_core::{ControlLoop, CycleRecorder};

    let rig = PiRig::open(&config.pins, &config.tracking).context("GPIO initialisation failed")?;
    let locator = CascadeLocator::load(&config.camera).context("face detector unavailable")?;
    let camera = CameraSource::open(&config.camera).context("camera unavailable")?;

    let clock = PiClock::new();
    let PiRig {
        servos,
        trigger,
        echo,
        led,
    } = rig;
    let ranger = UltrasonicRanger::new(trigger, echo, clock, config.ranging.clone());
    let diagnostics = Arc::new(SharedDiagnostics::default());

    let mut control = ControlLoop::new(config, camera, locator, servos, ranger, led, clock)
        .with_diagnostics(Arc::clone(&diagnostics));
    let recorder = config.metrics.csv_path.as_ref().map(|_| CycleRecorder::new());
    if let Some(recorder) = &recorder {
        control = control.with_recorder(recorder.clone());
    }

    let summary = control.run(shutdown)?;
    info!("Control loop finished after {} cycles ({:?})", summary.cycles, summary.exit);
    info!("Diagnostics: {:?}", diagnostics.snapshot());

    if let (Some(recorder), Some(path)) = (&recorder, &config.metrics.csv_path) {
        recorder.save_to_csv(path)?;
    }
    tracking_outcome(summary)
}

/// Losing the camera ends the process; only a Ctrl-C stop counts as success.
#[cfg_attr(not(feature = "camera"), allow(dead_code))]
fn tracking_outcome(summary: LoopSummary) -> anyhow::Result<()> {
    match summary.exit {
        LoopExit::Shutdown => Ok(()),
        LoopExit::VideoEnded => bail!(
            "video source stopped producing frames after {} cycles",
            summary.cycles
        ),
    }
}

#[cfg(not(feature = "camera"))]
fn run_tracking(_config: &RigConfig, _shutdown: &AtomicBool) -> anyhow::Result<()> {
    bail!("face tracking needs the `camera` feature; rebuild with `--features camera`")
}

fn run_range_test(config: &RigConfig, shutdown: &AtomicBool) -> anyhow::Result<()> {
    let (trigger, echo, led) =
        PiRig::open_ranging(&config.pins).context("GPIO initialisation failed")?;
    let clock = PiClock::new();
    let ranger = UltrasonicRanger::new(trigger, echo, clock, config.ranging.clone());
    let diagnostics = Arc::new(SharedDiagnostics::default());

    let mut monitor = RangeMonitor::new(&config.range_test, ranger, led, clock)
        .with_diagnostics(Arc::clone(&diagnostics));
    let pings = monitor.run(shutdown)?;

    info!("Range test finished after {} pings", pings);
    info!("Diagnostics: {:?}", diagnostics.snapshot());
    Ok(())
}
