//! Operator CLI for the service state spool: force services up or down,
//! inspect spooled state, and list recently checked services from a
//! running daemon.

use clap::{Parser, Subcommand};
use serde_json::Value;

use healthgate::spool::SpoolStore;

#[derive(Parser)]
#[command(name = "healthgate-cli")]
#[command(about = "Operator tool for healthgate service state", long_about = None)]
struct Cli {
    /// Root for the service state spool.
    #[arg(long, default_value = "/var/spool/healthgate")]
    spool_root: String,

    /// Base URL of a running healthgate daemon (used by `list`).
    #[arg(short, long, default_value = "http://127.0.0.1:3333")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Readmit services to traffic.
    Up {
        #[arg(required = true)]
        services: Vec<String>,

        /// Only this port instead of the whole service.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Remove services from traffic.
    Down {
        #[arg(required = true)]
        services: Vec<String>,

        /// Reason recorded in the spool. Defaults to your username.
        #[arg(short, long)]
        reason: Option<String>,

        /// Only this port instead of the whole service.
        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds until the down state expires on its own.
        #[arg(short, long)]
        expiration: Option<f64>,
    },
    /// Report per-service state; exits nonzero if any service is down.
    Status {
        #[arg(required = true)]
        services: Vec<String>,

        /// Only this port instead of the whole service.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List every down record in the spool.
    StatusDowned,
    /// List recently checked services known to the daemon.
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Up { services, port } => {
            let spool = SpoolStore::configure(&cli.spool_root, true)?;
            for service in &services {
                spool.up(service, port)?;
            }
        }
        Commands::Down {
            services,
            reason,
            port,
            expiration,
        } => {
            let spool = SpoolStore::configure(&cli.spool_root, true)?;
            let reason = reason.unwrap_or_else(default_reason);
            let expiration = expiration.map(|secs| unix_now() + secs);
            for service in &services {
                spool.down(service, &reason, port, expiration, None)?;
            }
        }
        Commands::Status { services, port } => {
            let spool = SpoolStore::configure(&cli.spool_root, false)?;
            let mut any_down = false;
            for service in &services {
                let (up, info) = spool.status(service, port)?;
                if up {
                    println!("UP\t{service}");
                } else {
                    println!("DOWN\t{service}\t{}", info.reason);
                    any_down = true;
                }
            }
            if any_down {
                std::process::exit(1);
            }
        }
        Commands::StatusDowned => {
            let spool = SpoolStore::configure(&cli.spool_root, false)?;
            for (service, port, info) in spool.status_all_down()? {
                match port {
                    Some(port) => println!("DOWN\t{service}:{port}\t{}", info.reason),
                    None => println!("DOWN\t{service}\t{}", info.reason),
                }
            }
        }
        Commands::List => {
            let response: Value = reqwest::Client::new()
                .get(format!("{}/recent", cli.url))
                .send()
                .await?
                .json()
                .await?;
            for entry in response["seen_services"].as_array().into_iter().flatten() {
                let Some(name) = entry[0].as_str() else { continue };
                println!("{name} last_response={}", entry[1]);
            }
        }
    }
    Ok(())
}

/// Down reasons default to who ran the command.
fn default_reason() -> String {
    std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
