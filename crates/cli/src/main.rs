//! mouse-battery CLI: battery status and monitoring for wireless mice.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mouse_battery_core::comm::Pacing;
use mouse_battery_core::config::{self, MonitorConfig};
use mouse_battery_core::engine::{Command, Engine, Event, Outcome};
use mouse_battery_core::monitor::StatusReport;
use mouse_battery_core::transport::{HidApiBackend, HidBackend};
use mouse_battery_core::watcher::DeviceWatcher;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mouse-battery",
    version,
    about = "Battery monitor for Endgame Gear and VAXEE wireless mice"
)]
struct Cli {
    /// Config file (default: $MOUSE_BATTERY_CONFIG or ./config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected supported mice and dongles.
    ListDevices,
    /// Read the battery once.
    Status {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Poll continuously, reacting to device plug and unplug.
    Monitor {
        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
        /// Device scan interval in milliseconds.
        #[arg(long, default_value_t = 500)]
        scan_ms: u64,
        /// Stop after this many seconds.
        #[arg(long)]
        run_for_secs: Option<u64>,
    },
    /// Show the low-battery notice a real alert would produce.
    TestNotification,
    /// Print the effective configuration.
    ShowConfig,
}

fn init_logging(debug_mode: bool, log_file: Option<&Path>) -> Result<()> {
    let default_directive = if debug_mode { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn open_backend() -> Result<Rc<dyn HidBackend>> {
    let backend = HidApiBackend::new().context("initialise hidapi")?;
    Ok(Rc::new(backend))
}

fn print_report(report: &StatusReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    println!("{report}");
    if report.status.is_valid() && report.status.is_charging {
        println!("Charging");
    }
    if let Some(notice) = &report.low_battery {
        println!("{}: {}", notice.title, notice.message);
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    match outcome {
        Outcome::Status(report) if !json => print_report(report, false),
        Outcome::TestNotice(notice) if !json => {
            println!("{}: {}", notice.title, notice.message);
            Ok(())
        }
        _ => {
            println!("{}", serde_json::to_string(outcome)?);
            Ok(())
        }
    }
}

fn run_monitor(
    config: &MonitorConfig,
    json: bool,
    scan_interval: Duration,
    run_for: Option<Duration>,
) -> Result<()> {
    let backend = open_backend()?;
    let mut engine = Engine::with_backend(Rc::clone(&backend), Pacing::Hardware, config);
    let mut watcher = DeviceWatcher::new(backend);

    watcher.prime();
    let started = Instant::now();
    print_report(&engine.start(started), json)?;

    loop {
        let now = Instant::now();
        if run_for.is_some_and(|limit| now.duration_since(started) >= limit) {
            break;
        }

        for outcome in engine.run_due(now) {
            print_outcome(&outcome, json)?;
        }

        for signal in watcher.scan() {
            if let Some(outcome) = engine.handle(Event::Device(signal), Instant::now()) {
                print_outcome(&outcome, json)?;
            }
        }

        let now = Instant::now();
        let wait = engine
            .next_deadline()
            .map_or(scan_interval, |deadline| deadline.saturating_duration_since(now))
            .min(scan_interval);
        debug!(wait_ms = wait.as_millis() as u64, "Idle");
        std::thread::sleep(wait);
    }

    let last = engine.monitor().current();
    info!(
        percentage = last.status.percentage,
        source = ?last.source,
        "Monitor stopping"
    );
    engine.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = MonitorConfig::load(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    init_logging(config.debug_mode, cli.log_file.as_deref())?;
    info!(path = %config_path.display(), "Configuration ready");

    match cli.command {
        Commands::ListDevices => {
            let backend = open_backend()?;
            let devices = mouse_battery_core::device::discover_devices(backend.as_ref())?;
            if devices.is_empty() {
                println!("No supported mice found.");
                println!("Ensure the mouse or its dongle is connected and readable.");
            } else {
                for dev in &devices {
                    println!(
                        "{} [{}] (VID: 0x{:04X}, PID: 0x{:04X}, mode: {}, path: {})",
                        dev.name, dev.device_type, dev.vid, dev.pid, dev.mode, dev.path
                    );
                }
            }
        }
        Commands::Status { json } => {
            let mut engine = Engine::with_backend(open_backend()?, Pacing::Hardware, &config);
            let report = engine.start(Instant::now());
            engine.shutdown();
            print_report(&report, json)?;
        }
        Commands::Monitor {
            json,
            scan_ms,
            run_for_secs,
        } => {
            let scan_interval = Duration::from_millis(scan_ms.max(1));
            run_monitor(
                &config,
                json,
                scan_interval,
                run_for_secs.map(Duration::from_secs),
            )?;
        }
        Commands::TestNotification => {
            let mut engine = Engine::with_backend(open_backend()?, Pacing::Hardware, &config);
            let now = Instant::now();
            engine.start(now);
            let outcome = engine.handle(Event::Command(Command::TestNotification), now);
            engine.shutdown();
            if let Some(outcome) = outcome {
                print_outcome(&outcome, false)?;
            }
        }
        Commands::ShowConfig => {
            println!("# {}", config_path.display());
            println!("{}", config.to_json_pretty()?);
        }
    }

    Ok(())
}
