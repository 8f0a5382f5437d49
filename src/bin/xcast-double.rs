//! xcast-double - stand-in device for the Xcast application-lifecycle protocol
//!
//! Connects to the Xcast service on a target box, registers for the lifecycle
//! events and answers them like a device would.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use xcast_double::device::registry::IdentityKey;
use xcast_double::device::{DeviceConfig, QueuePolicy};
use xcast_double::service::{self, ServiceConfig, console};

#[derive(Parser)]
#[command(name = "xcast-double")]
#[command(about = "Test double for devices driven by the Xcast lifecycle protocol", long_about = None)]
struct Cli {
    /// Host running the Xcast service
    #[arg(long, env = "CPE_HOST")]
    host: String,

    /// Service port
    #[arg(long, default_value = "9998")]
    port: u16,

    /// Service callsign used in the URL path
    #[arg(long, default_value = "org.rdk.Xcast")]
    callsign: String,

    /// JSON file with device settings (flags below override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Namespace for register calls and notifications
    #[arg(long)]
    namespace: Option<String>,

    /// Subscriber id the service prefixes events with
    #[arg(long)]
    subscriber_id: Option<String>,

    /// Answer every command immediately instead of simulating latency
    #[arg(long)]
    instant: bool,

    /// Ordering of timed transitions
    #[arg(long, value_enum)]
    queue_policy: Option<QueueArg>,

    /// How requests are mapped to applications
    #[arg(long, value_enum)]
    identity: Option<IdentityArg>,

    /// Read operator commands (launch/hide/stop <name>, dump) from stdin
    #[arg(long)]
    console: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum QueueArg {
    Serialized,
    Supersede,
}

#[derive(Clone, Copy, ValueEnum)]
enum IdentityArg {
    Name,
    NameAndId,
}

impl Cli {
    fn device_config(&self) -> Result<DeviceConfig> {
        let mut config = match &self.config {
            Some(path) => DeviceConfig::load(path)?,
            None => DeviceConfig::default(),
        };

        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(subscriber_id) = &self.subscriber_id {
            config.subscriber_id = subscriber_id.clone();
        }
        if self.instant {
            config.simulate_latency = false;
        }
        if let Some(policy) = self.queue_policy {
            config.queue_policy = match policy {
                QueueArg::Serialized => QueuePolicy::Serialized,
                QueueArg::Supersede => QueuePolicy::Supersede,
            };
        }
        if let Some(identity) = self.identity {
            config.identity = match identity {
                IdentityArg::Name => IdentityKey::Name,
                IdentityArg::NameAndId => IdentityKey::NameAndId,
            };
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = ServiceConfig {
        host: cli.host.clone(),
        port: cli.port,
        callsign: cli.callsign.clone(),
        device: cli.device_config()?,
    };

    let console = cli.console.then(console::spawn_stdin_reader);
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let device = service::run(config, console, shutdown).await?;
    tracing::info!(applications = device.registry().len(), "session ended");
    Ok(())
}
