//! doorwatch daemon - BLE presence registry and door-close reminder
//!
//! Tracks which beacon-carrying phones are near the door and sends one
//! reminder when the last of them leaves while the door is unlocked.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! doorwatchd start
//!
//! # Start the daemon (background/daemonized) with a config file
//! doorwatchd start -d --config /etc/doorwatch.toml
//!
//! # Same, via the environment
//! DOORWATCH_CONFIG=/etc/doorwatch.toml doorwatchd start
//!
//! # Enable debug logging
//! RUST_LOG=doorwatchd=debug doorwatchd start
//!
//! # Stop the daemon
//! doorwatchd stop
//!
//! # Check daemon status
//! doorwatchd status
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use doorwatchd::config::DaemonConfig;
use doorwatchd::daemon::Daemon;

/// doorwatch daemon - door-close reminders from BLE beacon presence
#[derive(Parser, Debug)]
#[command(name = "doorwatchd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Config file (defaults to $DOORWATCH_CONFIG, then built-in defaults)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("doorwatch")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("doorwatchd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("doorwatchd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    let Ok(pid) = i32::try_from(pid) else {
        bail!("Invalid PID {pid}");
    };
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        bail!("Failed to send SIGTERM to process {pid}");
    }
    Ok(())
}

fn check_privileges(config: &DaemonConfig) -> Result<()> {
    if config.require_root && unsafe { libc::geteuid() } != 0 {
        bail!(
            "doorwatchd must run as root to open Bluetooth sockets \
             (set require_root = false to skip this check)"
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
    });

    match command {
        Command::Start { daemon, config } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'doorwatchd stop' to stop it first.");
                process::exit(1);
            }

            // Fail on the terminal, not in the log file
            let config_path = DaemonConfig::resolve_path(config);
            let config = DaemonConfig::load(config_path.as_deref())
                .context("Failed to load configuration")?;
            check_privileges(&config)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;
            let result = run_daemon(config, config_path);
            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                let log_path = log_file_path();
                if log_path.exists() {
                    println!("Log: {}", log_path.display());
                }
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig, config_path: Option<PathBuf>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("doorwatchd=info".parse()?)
                .add_directive("doorwatch_core=info".parse()?)
                .add_directive("doorwatch_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        config = %config_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string()),
        "doorwatch daemon starting"
    );
    info!(
        psm = format_args!("{:#06x}", config.psm),
        max_devices = config.max_devices,
        heartbeat_timeout_secs = config.heartbeat_timeout_secs,
        min_token_length = config.min_token_length,
        "Configuration loaded"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let daemon = Daemon::new(config, cancel_token);
    run_bluetooth(daemon).await
}

#[cfg(feature = "bluetooth")]
async fn run_bluetooth(daemon: Daemon) -> Result<()> {
    use doorwatchd::server::ServerError;
    use doorwatchd::transport::{check_adapter, L2capTransport};

    let adapter = check_adapter()
        .await
        .map_err(|e| ServerError::HardwareInit(format!("Bluetooth unavailable: {e}")))?;
    info!(adapter = %adapter, "Bluetooth adapter ready");

    let psm = daemon.config().psm;
    let transport = L2capTransport::bind(psm)
        .await
        .map_err(|e| ServerError::HardwareInit(format!("cannot listen on PSM {psm:#06x}: {e}")))?;

    let report = daemon.run(transport).await?;
    info!(
        accepted = report.server.accepted,
        rejected = report.server.rejected,
        frames = report.server.frames,
        "doorwatch daemon stopped"
    );
    Ok(())
}

#[cfg(not(feature = "bluetooth"))]
async fn run_bluetooth(_daemon: Daemon) -> Result<()> {
    bail!("doorwatchd was built without the `bluetooth` feature; no link layer is available")
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }

    Ok(())
}
