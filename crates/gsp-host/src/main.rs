use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gsp_crypto::pairing::Pin;
use gsp_host::commands::{self, SimulateArgs};
use gsp_host::config::HostConfig;

#[derive(Parser)]
#[command(name = "gsp-host")]
#[command(about = "GSP Host - GameStream client pairing service")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the host certificate
    Cert,

    /// Manage paired clients
    Clients {
        #[command(subcommand)]
        action: ClientsAction,
    },

    /// Pair a client against this host end to end
    Simulate {
        /// Client certificate (PEM)
        #[arg(long)]
        client_cert: PathBuf,
        /// Client private key (PEM)
        #[arg(long)]
        client_key: PathBuf,
        /// PIN the client enters
        #[arg(long)]
        pin: Pin,
        /// PIN the host user enters; defaults to --pin
        #[arg(long)]
        host_pin: Option<Pin>,
        #[arg(long, default_value = "gsp-simulator")]
        client_id: String,
    },
}

#[derive(Subcommand)]
enum ClientsAction {
    /// List paired clients
    List {
        #[arg(long)]
        json: bool,
    },
    /// Forget a paired client
    Remove { client_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => HostConfig::load_from_file(path)?,
        None => HostConfig::load_from_env()?,
    };

    // Initialize tracing
    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("gsp_host={level},gsp_core={level},gsp_crypto={level}"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(registry = %config.registry_path.display(), "Starting gsp-host");

    match args.command {
        Command::Cert => commands::show_cert(&config).await?,
        Command::Clients { action } => match action {
            ClientsAction::List { json } => {
                let clients = commands::list_clients(&config.registry_path).await?;
                commands::print_clients(&clients, json)?;
            }
            ClientsAction::Remove { client_id } => {
                if !commands::remove_client(&config.registry_path, &client_id).await? {
                    anyhow::bail!("client {client_id} is not paired");
                }
            }
        },
        Command::Simulate {
            client_cert,
            client_key,
            pin,
            host_pin,
            client_id,
        } => {
            let host_pin = host_pin.unwrap_or_else(|| pin.clone());
            let outcome = commands::simulate(
                &config,
                SimulateArgs {
                    client_id: &client_id,
                    client_cert: &client_cert,
                    client_key: &client_key,
                    client_pin: pin,
                    host_pin,
                },
            )
            .await?;
            println!("{outcome:?}");
            if !outcome.is_paired() {
                anyhow::bail!("pairing did not complete");
            }
        }
    }

    Ok(())
}
