//! sqlpulsed - SQL-to-StatsD metrics daemon.
//!
//! Loads a YAML list of monitors, opens one database connection and
//! one DogStatsD client per monitor, and runs each monitor on its own
//! thread for the lifetime of the process.

use std::thread;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use sqlpulse_core::config;
use sqlpulse_core::monitor::Monitor;

/// SQL-to-StatsD metrics daemon.
#[derive(Parser)]
#[command(name = "sqlpulsed", about = "SQL -> StatsD metrics daemon", version)]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "/etc/sqlpulse.yml")]
    config: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("sqlpulsed={}", level).parse().unwrap())
        .add_directive(format!("sqlpulse_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("sqlpulsed {} starting", env!("CARGO_PKG_VERSION"));

    let config = match config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    info!(
        "Config: {} monitors, statsd at {}",
        config.monitors.len(),
        config.statsd.address
    );

    if config.monitors.is_empty() {
        warn!("No monitors configured, nothing to do");
        return;
    }

    if let Err(e) = ctrlc::set_handler(|| {
        info!("Received shutdown signal");
        std::process::exit(0);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    // Setup errors are fatal: a monitor that cannot open its
    // connection or its statsd socket aborts startup.
    let mut handles = Vec::new();
    for monitor_config in &config.monitors {
        let monitor = match Monitor::new(&config.statsd, monitor_config) {
            Ok(monitor) => monitor,
            Err(e) => {
                error!("Failed to start monitor '{}': {}", monitor_config.name, e);
                std::process::exit(1);
            }
        };

        info!("Launching monitor '{}'", monitor_config.name);
        let spawned = thread::Builder::new()
            .name(monitor_config.name.clone())
            .spawn(move || monitor.run());
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!(
                    "Failed to spawn thread for monitor '{}': {}",
                    monitor_config.name, e
                );
                std::process::exit(1);
            }
        }
    }

    // Monitors never return; block here until something kills the process.
    for handle in handles {
        let _ = handle.join();
    }
}
