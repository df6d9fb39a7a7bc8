//! Camera head: tracks a face and drives the mobile base towards it.
//!
//! Mode change events are read from standard input, one per line
//! (`stop`, `display`, `track`).

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{info, warn};
use std::io::BufRead;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracking_head::{
    config::Config,
    display::LogDisplay,
    mode::OperatingMode,
    pipeline::{Pipeline, PipelineHandle, PipelineStats},
    receiver::CommandReceiver,
    source::SyntheticSource,
    transmission::{Link, MacAddress, MemoryMedium, UdpLink},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Local address for the command link
    #[arg(long)]
    bind: Option<IpAddr>,

    /// UDP port the camera listens on
    #[arg(short, long)]
    port: Option<u16>,

    /// Mode at startup (stop, display, track)
    #[arg(short, long)]
    mode: Option<OperatingMode>,

    /// Source framerate
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Run a simulated base in this process instead of using UDP
    #[arg(long)]
    demo: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Tracking head");

    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {config_path}");
        Config::from_file(config_path).with_context(|| format!("Failed to load {config_path}"))?
    } else {
        Config::default()
    };
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    if args.demo {
        let medium = MemoryMedium::new();
        let camera = medium.join(MacAddress([0x02, 0, 0, 0, 0, 0x01])).context("Camera link")?;
        let base = medium.join(MacAddress([0x02, 0, 0, 0, 0, 0x02])).context("Base link")?;
        spawn_simulated_base(&config, base)?;
        run(&config, Arc::new(camera))
    } else {
        let link = UdpLink::bind(
            config.transmission.bind_addr(),
            config.transmission.broadcast_to(config.receiver.port),
        )
        .context("Failed to bring up the command link")?;
        run(&config, Arc::new(link))
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(bind) = args.bind {
        config.transmission.bind = bind;
    }
    if let Some(port) = args.port {
        config.transmission.port = port;
    }
    if let Some(mode) = args.mode {
        config.pipeline.initial_mode = mode;
    }
    if let Some(fps) = args.fps {
        config.source.fps = fps;
    }
    if args.frames.is_some() {
        config.source.frames = args.frames;
    }
}

fn run<L: Link + 'static>(config: &Config, link: Arc<L>) -> Result<()> {
    let source = SyntheticSource::new(
        config.source.width,
        config.source.height,
        config.source.format,
        config.source.buffers,
    )?;
    let detector = config.detection.detector()?;
    let head = Pipeline::launch(config, source, detector, LogDisplay::default(), link)?;

    let events = spawn_stdin_reader()?;
    let stats = drive(head, &events)?;
    info!("Finished: {stats:?}");
    Ok(())
}

/// Apply mode events until the source finishes
///
/// Closing the event stream does not stop the head; it keeps running until
/// the source runs out.
fn drive<A>(head: PipelineHandle<A>, events: &Receiver<OperatingMode>) -> Result<PipelineStats>
where
    A: Copy + Eq + std::fmt::Display,
{
    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(mode) => {
                head.set_mode(mode);
                info!("Indicator {}", if head.indicator() { "on" } else { "off" });
            }
            Err(RecvTimeoutError::Timeout) => {
                if head.is_source_finished() {
                    return Ok(head.shutdown()?);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("No more mode events, running until the source finishes");
                return Ok(head.join()?);
            }
        }
    }
}

fn spawn_stdin_reader() -> Result<Receiver<OperatingMode>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new().name("input".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<OperatingMode>() {
                Ok(mode) => {
                    if tx.send(mode).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }
    })?;
    Ok(rx)
}

fn spawn_simulated_base<L: Link + 'static>(config: &Config, link: L) -> Result<()> {
    let mut receiver = CommandReceiver::new(link)
        .with_connection_timeout(config.receiver.connection_timeout())
        .with_handshake_retry(config.receiver.handshake_retry())
        .with_silence_timeout(config.receiver.silence_timeout());

    thread::Builder::new().name("base".to_string()).spawn(move || {
        if let Err(e) = receiver.connect() {
            warn!("base: {e}");
            return;
        }
        loop {
            match receiver.next_drive() {
                Ok(command) if command.is_hold() => {}
                Ok(command) => info!(
                    "base: turn {:.2} tilt {:.2} forward {:.2}",
                    command.horizontal_rotation, command.vertical_rotation, command.forward_displacement
                ),
                Err(e) => {
                    warn!("base: {e}");
                    break;
                }
            }
        }
    })?;
    Ok(())
}
