//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the gateway (`serve`, the default)
//! - Inspecting paired devices (`devices list`)
//! - Disabling a device without the HTTP admin endpoint (`devices revoke`)

use chrono::DateTime;
use clap::{Parser, Subcommand};

use crate::trust::registry::{DeviceRegistry, DeviceRole};

#[derive(Parser, Debug)]
#[command(name = "dexhub")]
#[command(about = "Self-hosted trusted-node speech gateway")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Bind address override (e.g. 127.0.0.1:5000)
    #[arg(long, global = true)]
    pub bind: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway (default if no subcommand given)
    Serve,

    /// Inspect and manage paired devices
    #[command(subcommand)]
    Devices(DevicesCommand),
}

#[derive(Subcommand, Debug)]
pub enum DevicesCommand {
    /// List paired devices, oldest first
    List,

    /// Disable a device (the record is kept for audit)
    Revoke { device_id: String },
}

/// Run a `devices` subcommand against the local registry file.
pub async fn run_devices_command(
    command: DevicesCommand,
    registry: DeviceRegistry,
) -> anyhow::Result<()> {
    match command {
        DevicesCommand::List => {
            let devices = registry.list().await;
            if devices.is_empty() {
                println!("No paired devices.");
                return Ok(());
            }
            for (device_id, record) in devices {
                let role = match record.role {
                    DeviceRole::Admin => "admin",
                    DeviceRole::Client => "client",
                };
                let paired = DateTime::from_timestamp(record.created_at as i64, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| record.created_at.to_string());
                println!(
                    "{device_id}  role={role}  enabled={}  paired={paired}",
                    record.enabled
                );
            }
        }
        DevicesCommand::Revoke { device_id } => {
            if registry.disable(&device_id).await? {
                println!("Revoked {device_id}");
            } else {
                println!("Device not found: {device_id}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_parses_default_serve() {
        let cli = Cli::parse_from(["dexhub"]);
        assert!(cli.command.is_none());
        assert!(cli.bind.is_none());
    }

    #[test]
    fn test_cli_parses_devices_revoke() {
        let cli = Cli::parse_from(["dexhub", "devices", "revoke", "a1b2c3d4e5f6"]);
        match cli.command {
            Some(Command::Devices(DevicesCommand::Revoke { device_id })) => {
                assert_eq!(device_id, "a1b2c3d4e5f6");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_bind_override() {
        let cli = Cli::parse_from(["dexhub", "--bind", "127.0.0.1:8088", "serve"]);
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:8088"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
