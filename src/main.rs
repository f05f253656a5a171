// src/main.rs

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleetkeeper::models::ServerMode;
use fleetkeeper::ops::lifecycle::AddServerRequest;
use fleetkeeper::ops::results::{Issue, Outcome};
use fleetkeeper::{FleetConfig, FleetService, Result};

#[derive(Parser, Debug)]
#[command(name = "fleetkeeper", version, about = "Provision, harden and track self-hosted Coolify servers")]
struct Cli {
    /// Refuse destructive actions (also FLEETKEEPER_SAFE_MODE=1).
    #[arg(long, global = true, default_value_t = false)]
    safe_mode: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List servers in the local inventory.
    List,
    /// Register an existing server.
    Add {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        ip: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        size: Option<String>,
        #[arg(long, default_value = "coolify")]
        mode: ServerMode,
        /// Provider-side server id; omit for a manual server.
        #[arg(long)]
        server_id: Option<String>,
        /// Port sshd listens on, when it is not 22.
        #[arg(long)]
        ssh_port: Option<u32>,
        #[arg(long, default_value_t = false)]
        skip_verify: bool,
    },
    /// Remove a server from the inventory only.
    Remove { server: String },
    /// Delete a server on its provider, then locally.
    Destroy { server: String },
    /// Probe Coolify on one server or the whole fleet.
    Health { server: Option<String> },
    #[command(subcommand)]
    Secure(SecureCommand),
    #[command(subcommand)]
    Firewall(FirewallCommand),
    #[command(subcommand)]
    Domain(DomainCommand),
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Subcommand, Debug)]
enum SecureCommand {
    /// Harden sshd and install fail2ban.
    Setup {
        server: String,
        /// Move sshd to this port.
        #[arg(long)]
        port: Option<u32>,
    },
    Audit { server: String },
}

#[derive(Subcommand, Debug)]
enum FirewallCommand {
    Setup {
        server: String,
        /// Custom SSH port to keep open.
        #[arg(long)]
        ssh_port: Option<u32>,
    },
    Add {
        server: String,
        port: u32,
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },
    Remove {
        server: String,
        port: u32,
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },
    Status { server: String },
}

#[derive(Subcommand, Debug)]
enum DomainCommand {
    Set {
        server: String,
        domain: String,
        /// Store an http:// FQDN instead of https://.
        #[arg(long, default_value_t = false)]
        no_ssl: bool,
    },
    Remove { server: String },
    Check { server: String, domain: String },
    Info { server: String },
}

#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    Create {
        server: String,
        #[arg(long)]
        name: Option<String>,
    },
    List {
        #[arg(required_unless_present = "all")]
        server: Option<String>,
        #[arg(long, default_value_t = false, conflicts_with = "server")]
        all: bool,
    },
    Delete { server: String, snapshot_id: String },
    Cost { server: String },
}

fn init_tracing() {
    // Logs go to stderr; stdout carries the JSON outcome.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetkeeper=info"));
    let builder = tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter);

    if env::var("FLEETKEEPER_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit<T: Serialize + Outcome>(outcome: T) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(if outcome.succeeded() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run(service: &FleetService, command: Command) -> Result<ExitCode> {
    match command {
        Command::List => {
            let servers = service.list_servers().await?;
            println!("{}", serde_json::to_string_pretty(&servers)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Add {
            provider,
            ip,
            name,
            region,
            size,
            mode,
            server_id,
            ssh_port,
            skip_verify,
        } => {
            let request = AddServerRequest {
                provider,
                ip,
                name,
                region,
                size,
                mode,
                server_id,
                ssh_port,
                skip_verify,
            };
            emit(service.add_server(request).await?)
        }
        Command::Remove { server } => emit(service.remove_server(&server).await?),
        Command::Destroy { server } => emit(service.destroy_server(&server).await?),
        Command::Health { server } => emit(service.health(server.as_deref()).await?),

        Command::Secure(SecureCommand::Setup { server, port }) => emit(service.secure_setup(&server, port).await?),
        Command::Secure(SecureCommand::Audit { server }) => emit(service.secure_audit(&server).await?),

        Command::Firewall(FirewallCommand::Setup { server, ssh_port }) => {
            emit(service.firewall_setup(&server, ssh_port).await?)
        }
        Command::Firewall(FirewallCommand::Add { server, port, protocol }) => {
            emit(service.firewall_add(&server, port, &protocol).await?)
        }
        Command::Firewall(FirewallCommand::Remove { server, port, protocol }) => {
            emit(service.firewall_remove(&server, port, &protocol).await?)
        }
        Command::Firewall(FirewallCommand::Status { server }) => emit(service.firewall_status(&server).await?),

        Command::Domain(DomainCommand::Set { server, domain, no_ssl }) => {
            emit(service.domain_set(&server, &domain, !no_ssl).await?)
        }
        Command::Domain(DomainCommand::Remove { server }) => emit(service.domain_remove(&server).await?),
        Command::Domain(DomainCommand::Check { server, domain }) => {
            emit(service.domain_check(&server, &domain).await?)
        }
        Command::Domain(DomainCommand::Info { server }) => emit(service.domain_info(&server).await?),

        Command::Snapshot(SnapshotCommand::Create { server, name }) => {
            emit(service.create_snapshot(&server, name.as_deref()).await?)
        }
        Command::Snapshot(SnapshotCommand::List { server, all }) => match server {
            Some(server) if !all => emit(service.list_snapshots(&server).await?),
            _ => emit(service.list_all_snapshots().await?),
        },
        Command::Snapshot(SnapshotCommand::Delete { server, snapshot_id }) => {
            emit(service.delete_snapshot(&server, &snapshot_id).await?)
        }
        Command::Snapshot(SnapshotCommand::Cost { server }) => emit(service.snapshot_cost(&server).await?),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    // ==============================================================================
    // 1. Configuration & Dependency Injection
    // ==============================================================================

    let mut config = FleetConfig::load();
    config.safe_mode |= cli.safe_mode;
    if config.safe_mode {
        info!("🛡️ Safe mode is on: destructive actions are disabled");
    }
    let service = FleetService::new(config);

    // ==============================================================================
    // 2. Dispatch
    // ==============================================================================

    match run(&service, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            // Only local-state defects reach this point.
            error!("{}", e);
            let issue = Issue::from_error(&e);
            let body = serde_json::json!({
                "success": false,
                "error": issue.error,
                "kind": issue.kind,
                "hint": issue.hint,
            });
            if let Ok(body) = serde_json::to_string_pretty(&body) {
                println!("{}", body);
            }
            ExitCode::from(2)
        }
    }
}
