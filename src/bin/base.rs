//! Mobile base simulator: pairs with a camera head over UDP and logs the
//! drive commands it would execute.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::net::IpAddr;
use tracking_head::{config::Config, receiver::CommandReceiver, transmission::UdpLink};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Local address to bind
    #[arg(long)]
    bind: Option<IpAddr>,

    /// UDP port the base listens on
    #[arg(short, long)]
    port: Option<u16>,

    /// UDP port the camera listens on
    #[arg(long)]
    camera_port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("Failed to load {path}"))?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.receiver.bind = bind;
    }
    if let Some(port) = args.port {
        config.receiver.port = port;
    }
    if let Some(port) = args.camera_port {
        config.transmission.port = port;
    }
    config.validate().context("Invalid configuration")?;

    let link = UdpLink::bind(
        config.receiver.bind_addr(),
        config.transmission.broadcast_to(config.transmission.port),
    )
    .context("Failed to bring up the command link")?;

    let mut receiver = CommandReceiver::new(link)
        .with_connection_timeout(config.receiver.connection_timeout())
        .with_handshake_retry(config.receiver.handshake_retry())
        .with_silence_timeout(config.receiver.silence_timeout());

    let camera = receiver.connect().context("Handshake failed")?;
    info!("Driving for camera {camera}");

    let mut holding = false;
    loop {
        let holds = receiver.stats().holds;
        let command = receiver.next_drive()?;
        if receiver.stats().holds > holds {
            if !holding {
                info!("Target lost, holding position");
            }
            holding = true;
            continue;
        }
        holding = false;
        info!(
            "Drive: turn {:.2} deg/s, tilt {:.2} deg/s, forward {:.2}",
            command.horizontal_rotation, command.vertical_rotation, command.forward_displacement
        );
    }
}
