// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! livelink Provider
//!
//! Standalone provider publishing synthetic subjects, for:
//! - Checking consumer setups without a capture rig
//! - Soak-testing links across machines
//! - Demos
//!
//! # Usage
//!
//! ```bash
//! # Publish the default subjects on the default discovery port (7425)
//! livelink-provider
//!
//! # Named provider, 60 Hz, 24 fps timecode
//! livelink-provider --name StageRig --rate 60 --timecode-fps 24
//!
//! # No broadcast on this network: reach consumers explicitly
//! livelink-provider --no-broadcast --peer 10.0.0.12:7425
//! ```

use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod daemon;
mod source;

pub use config::ProviderConfig;
pub use daemon::ProviderDaemon;

/// livelink Provider - publish synthetic live subjects
#[derive(Parser, Debug)]
#[command(name = "livelink-provider")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Provider name consumers connect by
    #[arg(short, long, default_value = "livelink-provider")]
    name: String,

    /// Discovery port
    #[arg(short, long, default_value = "7425")]
    port: u16,

    /// Local interface to bind (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: Ipv4Addr,

    /// Extra unicast discovery targets (repeatable)
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Disable broadcast discovery
    #[arg(long, default_value = "false")]
    no_broadcast: bool,

    /// Frames per second per subject
    #[arg(short, long, default_value = "30")]
    rate: f64,

    /// Stamp frames with timecode at this many frames per second
    #[arg(long)]
    timecode_fps: Option<u32>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (RUST_LOG overrides --log-level)
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    // try_init also forwards the library's `log` records
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish()
        .try_init()?;

    // Load or create config
    let config = if let Some(config_path) = &args.config {
        info!("Loading config from {:?}", config_path);
        ProviderConfig::from_file(config_path)?
    } else {
        let mut config = ProviderConfig {
            provider_name: args.name.clone(),
            frame_rate_hz: args.rate,
            timecode_fps: args.timecode_fps,
            ..Default::default()
        };
        config.transport.bind_ip = args.bind;
        config.transport.discovery_port = args.port;
        config.transport.broadcast = !args.no_broadcast;
        config.transport.peers = args.peers.clone();
        config
    };
    config.validate()?;

    if let Some(path) = &args.dump_config {
        config.to_file(path)?;
        info!("Configuration written to {:?}", path);
        return Ok(());
    }

    info!("+----------------------------------------------------+");
    info!(
        "|       livelink Provider v{}                     |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Name:      {:38} |", config.provider_name);
    info!(
        "|  Discovery: {:38} |",
        format!("{}:{}", config.transport.bind_ip, config.transport.discovery_port)
    );
    info!(
        "|  Broadcast: {:38} |",
        if config.transport.broadcast {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!("|  Rate:      {:38} |", format!("{} Hz", config.frame_rate_hz));
    info!(
        "|  Timecode:  {:38} |",
        config
            .timecode_fps
            .map_or_else(|| "off".to_string(), |fps| format!("{} fps", fps))
    );
    info!("+----------------------------------------------------+");

    let daemon = ProviderDaemon::new(config)?;

    // Handle shutdown signals
    let daemon_handle = daemon.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping provider...");
        daemon_handle.shutdown();
    });

    daemon.run().await?;

    info!("Provider stopped");
    Ok(())
}
