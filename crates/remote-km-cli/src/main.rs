//! remote-km CLI: share one keyboard and mouse with a second machine over UDP.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use remote_km_daemon::{Backends, Config, Daemon, DaemonEvent, DaemonStatus, Mode};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "remote-km",
    about = "Control a second machine's keyboard and mouse over UDP",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture local input and send it to a receiver.
    Controller {
        /// IP address of the receiving machine.
        #[arg(short, long)]
        target: Option<String>,

        /// UDP port of the receiver.
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Listen for input and replay it on this machine.
    Receiver {
        /// UDP port to listen on.
        #[arg(short, long)]
        port: Option<u16>,

        /// Local address to bind.
        #[arg(short, long)]
        bind: Option<String>,

        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration.
    Config,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::Config => {
            print!("{}", Config::default().to_toml()?);
            return Ok(());
        }
        Commands::Controller {
            target,
            port,
            config,
        } => {
            let mut cfg = Config::load(config.as_deref())?;
            cfg.daemon.mode = Mode::Controller;
            if let Some(target) = target {
                cfg.controller.target = target;
            }
            if let Some(port) = port {
                cfg.daemon.port = port;
            }
            cfg
        }
        Commands::Receiver { port, bind, config } => {
            let mut cfg = Config::load(config.as_deref())?;
            cfg.daemon.mode = Mode::Receiver;
            if let Some(port) = port {
                cfg.daemon.port = port;
            }
            if let Some(bind) = bind {
                cfg.daemon.bind = bind;
            }
            cfg
        }
    };

    init_tracing(&config.daemon.log_level);
    tracing::info!(mode = %config.daemon.mode, port = config.daemon.port, "starting remote-km");

    let interception = remote_km_input::platform_interception(&config.screen())
        .context("no input interception available")?;
    let backends = Backends::new(interception, remote_km_input::platform_synthesis);

    let mut daemon = Daemon::new(config, backends);
    let events = daemon.event_sender();

    tokio::spawn(print_status(daemon.status_receiver()));
    let commands = events.clone();
    // Detached: a blocked stdin read must not hold up exit.
    std::thread::Builder::new()
        .name("remote-km-stdin".to_string())
        .spawn(move || read_commands(&commands))
        .context("failed to spawn command reader")?;

    let shutdown_tx = events;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
        }
    });

    daemon.run().await?;
    Ok(())
}

/// Print the status line whenever its rendering changes.
async fn print_status(mut rx: watch::Receiver<DaemonStatus>) {
    let mut last = String::new();
    loop {
        let line = rx.borrow_and_update().to_string();
        if line != last {
            println!("Status: {line}");
            last = line;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Interactive commands on stdin, one per line.
fn read_commands(events: &mpsc::Sender<DaemonEvent>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let mut words = line.split_whitespace();
        let event = match (words.next(), words.next()) {
            (Some("toggle"), None) => DaemonEvent::ToggleCapture,
            (Some("target"), Some(ip)) => DaemonEvent::SetTarget(ip.to_string()),
            (Some("mode"), Some("controller")) => DaemonEvent::SetMode(Mode::Controller),
            (Some("mode"), Some("receiver")) => DaemonEvent::SetMode(Mode::Receiver),
            (Some("quit" | "exit"), None) => DaemonEvent::Shutdown,
            (None, _) => continue,
            _ => {
                eprintln!("commands: toggle | target <ip> | mode <controller|receiver> | quit");
                continue;
            }
        };
        if events.blocking_send(event).is_err() {
            break;
        }
    }
}
