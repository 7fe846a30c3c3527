//! chassis-thermal governor daemon (chassis-thermald)
//!
//! Builds the thermal controller over the chassis register transport and runs
//! the step-wise governor on the zone poll interval until SIGINT/SIGTERM.

mod governor;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use ct_core::{load_settings, resolve_settings_path, SimulatedChassis, ThermalController};
use governor::{Governor, MAX_CONSECUTIVE_ERRORS};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter environment variable
const LOG_ENV: &str = "CHASSIS_THERMAL_LOG";

/// Global shutdown flag for clean termination
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

struct Options {
    config: Option<PathBuf>,
    once: bool,
}

fn print_help() {
    eprintln!("chassis-thermald {} - chassis thermal governor", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    chassis-thermald [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Settings file (default: auto-detected)");
    eprintln!("        --once          Run a single governor pass and print it as JSON");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}   Log level (trace, debug, info, warn, error)", LOG_ENV);
    eprintln!("    CHASSIS_THERMAL_CONFIG   Settings file path");
}

/// Returns `None` when the process should exit without running
fn parse_args() -> anyhow::Result<Option<Options>> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        config: None,
        once: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-v" | "--version" => {
                println!("chassis-thermald {}", VERSION);
                return Ok(None);
            }
            "--once" => options.once = true,
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).context("--config requires a path argument")?;
                options.config = Some(PathBuf::from(path));
            }
            arg => {
                print_help();
                anyhow::bail!("unknown argument: {}", arg);
            }
        }
        i += 1;
    }
    Ok(Some(options))
}

/// Journald when the journal socket exists, stdout otherwise
fn init_logging() -> bool {
    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    if std::path::Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .init();
    false
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let Some(options) = parse_args()? else {
        return Ok(());
    };

    let journald = init_logging();
    info!(version = VERSION, "chassis-thermald starting");
    info!("logging to {}", if journald { "systemd journal" } else { "stdout" });

    let path = resolve_settings_path(options.config.as_deref());
    let settings = load_settings(Some(&path))
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    info!(path = %path.display(), "settings loaded");

    let transport = Arc::new(SimulatedChassis::new(&settings.chassis));
    let controller = Arc::new(
        ThermalController::new(transport, &settings).context("failed to initialise thermal controller")?,
    );
    let mut governor = Governor::new(Arc::clone(&controller));

    if options.once {
        let report = governor.pass(Instant::now());
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let wake = Arc::new(Notify::new());
    let wake_handler = Arc::clone(&wake);
    if let Err(e) = ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::SeqCst);
        wake_handler.notify_one();
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    let period = Duration::from_millis(controller.poll_interval_ms());
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(poll_interval_ms = controller.poll_interval_ms(), "governor loop started");

    let mut consecutive_errors: u32 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = wake.notified() => {}
        }
        if SHUTDOWN.load(Ordering::SeqCst) {
            info!("SIGNAL: received SIGINT/SIGTERM - shutting down");
            break;
        }

        let report = governor.pass(Instant::now());
        if report.is_ok() {
            if consecutive_errors > 0 {
                debug!("governor recovered after {} failed passes", consecutive_errors);
                consecutive_errors = 0;
            }
            continue;
        }

        consecutive_errors += 1;
        if consecutive_errors == 1 || consecutive_errors % MAX_CONSECUTIVE_ERRORS == 0 {
            error!(count = consecutive_errors, errors = ?report.errors, "governor pass failed");
        }
        if consecutive_errors == MAX_CONSECUTIVE_ERRORS {
            warn!("Too many consecutive errors - applying fallback fan speed");
            governor.apply_fallback();
        }
    }

    info!("chassis-thermald stopped");
    Ok(())
}
