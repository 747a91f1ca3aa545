//! `aurald`: the aural audio server daemon.

use anyhow::Context;
use aural_core::pump::MessagePump;
use aural_server::plane::ControlPlane;
use aural_server::signals::{Signal, SignalBridge, SignalSink};
use aural_server::{ServerConfig, cli};
use clap::{Parser, Subcommand};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aurald", about = "Desktop audio routing server", version)]
struct Args {
    /// Path to the server configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tracing filter, e.g. `info` or `aural_bt=debug`.
    #[arg(long, default_value = "info")]
    log_filter: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a node id of the form `<dev>:<node>` or `<dev>:<node>:<value>`
    /// and print the packed 64-bit id.
    ParseNodeId {
        /// The id string to parse.
        input: String,
    },
}

/// Logs every signal; stands in until a bus transport attaches.
struct LogSink;

impl SignalSink for LogSink {
    fn emit(&mut self, signal: Signal) {
        debug!(?signal, "signal");
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_filter).context("bad log filter")?)
        .init();

    if let Some(Command::ParseNodeId { input }) = args.command {
        match cli::parse_node_id_with_value(&input) {
            Ok((id, value)) => println!("{} (value {value})", id.raw()),
            Err(_) => {
                let id = cli::parse_node_id(&input)?;
                println!("{}", id.raw());
            }
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    info!(sched = ?config.audio_thread_sched, "starting aurald");

    let pump = MessagePump::new().context("create main message pump")?;
    let mut plane = ControlPlane::new(&config).context("bring up control plane")?;

    // Alert fan-out to the (not yet attached) control surface.
    let sink = Rc::new(RefCell::new(LogSink));
    plane
        .observer
        .add(Rc::new(RefCell::new(SignalBridge::new(sink))));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("install signal handler")?;
    }

    info!("control thread entering event loop");
    while running.load(Ordering::SeqCst) {
        plane.run_iteration(&pump, Duration::from_millis(500));
    }

    info!("shutting down");
    Ok(())
}
