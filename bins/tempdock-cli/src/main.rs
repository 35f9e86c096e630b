mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tempdock_common::types::PortSpec;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tempdock")]
#[command(about = "tempdock - Throwaway Docker containers for tests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a container and wait until it accepts connections
    Up {
        /// Name prefix for the container
        #[arg(short, long)]
        name: Option<String>,

        /// Image reference (e.g., redis:7, busybox)
        #[arg(short, long)]
        image: Option<String>,

        /// Port to publish as protocol:internal:range (e.g., tcp:80:40000-40010)
        #[arg(short, long = "port")]
        ports: Vec<PortSpec>,

        /// Environment variable as KEY=VALUE
        #[arg(short, long = "env", value_parser = commands::parse_env_pair)]
        env: Vec<(String, String)>,

        /// Command override; consumes the remaining arguments
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        cmd: Vec<String>,

        /// JSON request file; flags are applied on top of it
        #[arg(short, long)]
        request: Option<PathBuf>,

        /// Leave the container running and exit
        #[arg(long, default_value = "false")]
        detach: bool,
    },

    /// Show which external ports would be chosen, without starting anything
    Ports {
        /// Port spec as protocol:internal:range
        #[arg(short, long = "port", required = true)]
        ports: Vec<PortSpec>,

        /// Host address to probe (defaults to TEMPDOCK_ADDRESS or 127.0.0.1)
        #[arg(short, long)]
        address: Option<IpAddr>,
    },

    /// Force-remove a container started with --detach
    Down {
        /// Container ID or name
        id: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TEMPDOCK_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries the JSON results
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Up {
            name,
            image,
            ports,
            env,
            cmd,
            request,
            detach,
        } => {
            let request = commands::build_request(request.as_deref(), name, image, ports, env, cmd)?;
            commands::up(&request, detach).await?;
        }
        Commands::Ports { ports, address } => {
            commands::show_ports(&ports, address)?;
        }
        Commands::Down { id } => {
            commands::down(&id).await?;
        }
    }

    Ok(())
}
