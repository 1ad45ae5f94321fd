//! Tether agent — entry point.
//!
//! ```text
//! tether-agent                   Run in the foreground
//! tether-agent --config <path>   Load a custom config TOML
//! tether-agent --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tether_agent::config::AgentConfig;
use tether_agent::service::InitctlServiceControl;
use tether_core::{DeviceLink, LinkEvent, NullServiceControl, ServiceControl};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tether-agent", about = "Supervised link to a device daemon")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "tether-agent.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&AgentConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = AgentConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("tether-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("control socket: {}", config.link.control_socket);
    if !config.link.data_socket.is_empty() {
        info!("data socket: {}", config.link.data_socket);
    }
    if !config.restart.service.is_empty() {
        info!("supervised service: {}", config.restart.service);
    }

    let service_control: Arc<dyn ServiceControl> = if config.restart.service.is_empty() {
        Arc::new(NullServiceControl)
    } else {
        Arc::new(InitctlServiceControl::new(&config.restart.control_command))
    };

    let (handle, mut events) = DeviceLink::spawn(config.to_link_config(), service_control, None);

    // Log the event surface until ctrl-c.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received — shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                log_event(event);
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn log_event(event: LinkEvent) {
    match event {
        LinkEvent::Ready => info!("daemon ready"),
        LinkEvent::Offline => warn!("daemon offline"),
        LinkEvent::Restarting { reason } => warn!(reason = %reason, "daemon restarting"),
        LinkEvent::StateChange { state } => debug!(state = %state, "link state"),
        LinkEvent::Frame(frame) => debug!(
            tag = %frame.tag(),
            bytes = frame.payload.len(),
            duration_ms = frame.header.duration_ms,
            "frame"
        ),
        LinkEvent::Daemon(event) => info!(event = %event.name, "daemon event"),
    }
}
