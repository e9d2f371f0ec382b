//! catalogctl
//!
//! Inspects the instance-type catalog served by catalog-agent and manages
//! unavailable-offering overrides.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::{CapacityType, MarkUnavailableRequest};
use commands::instancetypes::ListFilter;
use commands::unavailable::parse_capacity_type;
use commands::{instancetypes, shapes, unavailable};

/// Instance catalog CLI
#[derive(Parser)]
#[command(name = "catalogctl")]
#[command(author, version, about = "CLI for the fleet instance-type catalog", long_about = None)]
pub struct Cli {
    /// Agent endpoint URL (can also be set via CATALOG_API_URL env var)
    #[arg(long, env = "CATALOG_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List instance types with at least one matching available offering
    List {
        /// Only offerings in this zone, e.g. westus2-1
        #[arg(long, short)]
        zone: Option<String>,

        /// Only offerings of this capacity type (on-demand, spot)
        #[arg(long, value_parser = parse_capacity_type)]
        capacity_type: Option<CapacityType>,

        /// Architecture label value (amd64, arm64)
        #[arg(long)]
        arch: Option<String>,

        /// Minimum vCPUs
        #[arg(long)]
        min_cpu: Option<u64>,

        /// Minimum memory in GiB
        #[arg(long)]
        min_memory: Option<u64>,
    },

    /// Show one instance type with offerings and requirements
    Show {
        /// Instance type name, e.g. Standard_D4s_v3
        name: String,
    },

    /// Show the raw shape descriptor
    Shape {
        /// Shape name
        name: String,
    },

    /// Manage unavailable offerings
    #[command(subcommand)]
    Unavailable(UnavailableCommands),
}

#[derive(Subcommand)]
pub enum UnavailableCommands {
    /// List offerings currently marked unavailable
    List,

    /// Mark an offering unavailable
    Mark {
        /// Shape name
        shape: String,

        /// Capacity type (on-demand, spot)
        #[arg(long, value_parser = parse_capacity_type)]
        capacity_type: CapacityType,

        /// Zone; leave empty for shapes that are not zonal
        #[arg(long, short, default_value = "")]
        zone: String,

        /// Reason recorded with the mark
        #[arg(long, default_value = "operator")]
        reason: String,

        /// Expiry in seconds (agent default if not specified)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Clear every unavailable mark
    Flush,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::List {
            zone,
            capacity_type,
            arch,
            min_cpu,
            min_memory,
        } => {
            let filter = ListFilter {
                zone,
                capacity_type,
                arch,
                min_cpu,
                min_memory_gib: min_memory,
            };
            instancetypes::list_instance_types(&client, &filter, cli.format).await?;
        }
        Commands::Show { name } => {
            instancetypes::show_instance_type(&client, &name, cli.format).await?;
        }
        Commands::Shape { name } => {
            shapes::show_shape(&client, &name, cli.format).await?;
        }
        Commands::Unavailable(cmd) => match cmd {
            UnavailableCommands::List => {
                unavailable::list_unavailable(&client, cli.format).await?;
            }
            UnavailableCommands::Mark {
                shape,
                capacity_type,
                zone,
                reason,
                ttl,
            } => {
                let request = MarkUnavailableRequest {
                    shape,
                    zone,
                    capacity_type,
                    reason,
                    ttl_secs: ttl,
                };
                unavailable::mark_unavailable(&client, request, cli.format).await?;
            }
            UnavailableCommands::Flush => {
                unavailable::flush_unavailable(&client, cli.format).await?;
            }
        },
    }

    Ok(())
}
