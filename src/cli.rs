//! CLI Handling module

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::{
    SwitchHandError,
    config::AppConfig,
    dispatch::{Coordinator, OperationKind, OperationOutcome},
    mutate::{ConfiguredMode, MutationKind, MutationRequest},
    ssh::SshConnector,
    state::Snapshot,
};

/// SwitchHand - Cisco IOS switch interface and VLAN management tool
#[derive(Parser)]
#[command(name = "switchhand")]
#[command(about = "A CLI tool for viewing and changing switch interface state")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable debug logging (shows detailed SSH authentication and parsing information)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to devices configuration file
    #[arg(
        short = 'c',
        long = "config",
        default_value = "devices.json",
        global = true
    )]
    config_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Access,
    Trunk,
}

impl From<ModeArg> for ConfiguredMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Access => ConfiguredMode::Access,
            ModeArg::Trunk => ConfiguredMode::Trunk,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and display the current interface state of a device
    Show {
        /// Device hostname as configured in the devices file
        hostname: String,
    },
    /// Administratively enable interfaces (no shutdown)
    Up {
        /// Device hostname as configured in the devices file
        hostname: String,
        /// One or more interface names (e.g. Gi1/0/1)
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Administratively disable interfaces (shutdown)
    Down {
        /// Device hostname as configured in the devices file
        hostname: String,
        /// One or more interface names (e.g. Gi1/0/1)
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Assign the access VLAN on interfaces
    SetVlan {
        /// Device hostname as configured in the devices file
        hostname: String,
        /// VLAN ID to assign
        vlan: String,
        /// One or more interface names (e.g. Gi1/0/1)
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Set the switchport mode on interfaces
    SetMode {
        /// Device hostname as configured in the devices file
        hostname: String,
        /// Switchport mode to configure
        mode: ModeArg,
        /// One or more interface names (e.g. Gi1/0/1)
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Set the description on interfaces
    Describe {
        /// Device hostname as configured in the devices file
        hostname: String,
        /// Description text (empty text clears to the Null placeholder)
        description: String,
        /// One or more interface names (e.g. Gi1/0/1)
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
    /// Set the allowed VLAN list on trunk interfaces
    AllowedVlans {
        /// Device hostname as configured in the devices file
        hostname: String,
        /// Allowed VLAN list, passed verbatim (e.g. 1,10,20-29)
        vlans: String,
        /// One or more interface names (e.g. Gi1/0/1)
        #[arg(required = true)]
        interfaces: Vec<String>,
    },
}

impl Commands {
    fn hostname(&self) -> &str {
        match self {
            Commands::Show { hostname }
            | Commands::Up { hostname, .. }
            | Commands::Down { hostname, .. }
            | Commands::SetVlan { hostname, .. }
            | Commands::SetMode { hostname, .. }
            | Commands::Describe { hostname, .. }
            | Commands::AllowedVlans { hostname, .. } => hostname,
        }
    }

    fn mutation(&self) -> Option<Result<MutationRequest, SwitchHandError>> {
        let (interfaces, kind) = match self {
            Commands::Show { .. } => return None,
            Commands::Up { interfaces, .. } => (interfaces, MutationKind::BringUp),
            Commands::Down { interfaces, .. } => (interfaces, MutationKind::BringDown),
            Commands::SetVlan {
                vlan, interfaces, ..
            } => (interfaces, MutationKind::SetVlan(vlan.clone())),
            Commands::SetMode {
                mode, interfaces, ..
            } => (interfaces, MutationKind::SetMode((*mode).into())),
            Commands::Describe {
                description,
                interfaces,
                ..
            } => (interfaces, MutationKind::SetDescription(description.clone())),
            Commands::AllowedVlans {
                vlans, interfaces, ..
            } => (interfaces, MutationKind::SetAllowedVlans(vlans.clone())),
        };
        Some(MutationRequest::new(interfaces.iter(), kind))
    }
}

pub async fn main_func() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize tracing subscriber with CLI options
    let env_filter_str = if cli.debug { "debug" } else { "info" };

    let env_filter = EnvFilter::new(format!(
        "{env_filter_str},russh::client=info,russh::sshbuffer=info"
    ));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(cli.debug)
                .with_thread_ids(false)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    let config_path = &cli.config_path;

    // Load config file, only create if it doesn't exist
    let app_config = match AppConfig::load_from_file(config_path) {
        Ok(config) => {
            info!("Loaded configuration from {}", config_path.display());
            config
        }
        Err(e) => {
            if config_path.exists() {
                error!(
                    "Error loading existing config file '{}': {}",
                    config_path.display(),
                    e
                );
                error!("Please check the file for JSON syntax errors or permission issues.");
                return Err(format!("Config file exists but cannot be loaded: {}", e).into());
            } else {
                info!(
                    "Config file '{}' not found, creating default configuration",
                    config_path.display()
                );
                let config = AppConfig::default();
                config.save_to_file(config_path)?;
                info!(
                    "Created default config at '{}' - please edit it to add your devices",
                    config_path.display()
                );
                config
            }
        }
    };

    let hostname = cli.command.hostname();
    let device = app_config
        .get_device(hostname)
        .ok_or_else(|| SwitchHandError::NotFound(format!("Device '{}' not in config", hostname)))?
        .clone();

    let connector = SshConnector::new(
        device,
        Duration::from_secs(app_config.ssh_timeout_seconds),
        Duration::from_secs(app_config.command_timeout_seconds),
    );
    let (coordinator, snapshot_rx, mut outcomes_rx) = Coordinator::spawn(Arc::new(connector));

    match cli.command.mutation() {
        None => {
            info!("Fetching interface state from {}", hostname);
            let ids = coordinator.request_refresh();
            wait_for_fetches(&mut outcomes_rx, ids.len()).await;
            print_snapshot(hostname, &snapshot_rx.borrow().clone());
        }
        Some(request) => {
            let request = request?;
            info!(
                "Applying change to {} interface(s) on {}",
                request.targets().len(),
                hostname
            );
            let id = coordinator.request_mutation(request);
            wait_for_mutation(&mut outcomes_rx, id).await?;
            info!("Change applied, refreshing device state");
            wait_for_fetches(&mut outcomes_rx, 4).await;
            print_snapshot(hostname, &snapshot_rx.borrow().clone());
        }
    }

    Ok(())
}

/// Wait for `count` fetch outcomes. Failed fetches are reported but do not
/// abort: the previous data of that kind (possibly none) stands in.
async fn wait_for_fetches(outcomes_rx: &mut UnboundedReceiver<OperationOutcome>, count: usize) {
    let mut seen = 0;
    while seen < count {
        let Some(outcome) = outcomes_rx.recv().await else {
            warn!("Outcome channel closed before all fetches finished");
            return;
        };
        if let OperationKind::Fetch(kind) = outcome.kind {
            seen += 1;
            if let Err(err) = &outcome.result {
                warn!("Fetch '{}' failed: {}", kind.command(), err);
            }
        }
    }
}

async fn wait_for_mutation(
    outcomes_rx: &mut UnboundedReceiver<OperationOutcome>,
    id: Uuid,
) -> Result<(), SwitchHandError> {
    loop {
        let Some(outcome) = outcomes_rx.recv().await else {
            return Err(SwitchHandError::Generic(
                "Outcome channel closed before the change completed".to_string(),
            ));
        };
        if outcome.id != id {
            continue;
        }
        return match outcome.result {
            Ok(_) => Ok(()),
            Err(err) => Err(SwitchHandError::Generic(format!(
                "Configuration change failed: {}",
                err
            ))),
        };
    }
}

fn print_snapshot(hostname: &str, snapshot: &Snapshot) {
    if let Some(refreshed_at) = snapshot.refreshed_at {
        println!(
            "Interface state for {} (refreshed {})",
            hostname,
            refreshed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    } else {
        println!("Interface state for {} (no data fetched)", hostname);
    }

    if snapshot.interfaces.is_empty() {
        println!("  No interfaces reported");
        return;
    }

    let mut widths = [9usize, 6, 4, 4, 11];
    for row in snapshot.interfaces.iter() {
        widths[0] = widths[0].max(row.name.len());
        widths[1] = widths[1].max(row.link_status.len());
        widths[2] = widths[2].max(row.vlan.len());
        widths[3] = widths[3].max(row.mode.len());
        widths[4] = widths[4].max(row.description.len());
    }

    println!(
        "{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}  {:<w4$}",
        "Interface",
        "Status",
        "Vlan",
        "Mode",
        "Description",
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3],
        w4 = widths[4],
    );
    for row in snapshot.interfaces.iter() {
        println!(
            "{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}  {:<w4$}",
            row.name,
            row.link_status,
            row.vlan,
            row.mode,
            row.description,
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
            w4 = widths[4],
        );
    }
}
