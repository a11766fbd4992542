//! `vmesh` command line.

use crate::order::{VehicleOrder, ENTITY_PATH};
use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use std::path::PathBuf;

/// Command line arguments.
#[derive(Parser)]
#[command(name = "vmesh")]
#[command(about = "ViewMesh vehicle order service and client", long_about = None)]
pub struct Cli {
    /// Base URL of the instance client commands talk to.
    #[arg(short, long, default_value = "http://localhost:8080", env = "VMESH_SERVER")]
    pub server: String,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// `vmesh` subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the service with an in-process log platform.
    Serve {
        /// Config file; defaults apply when it is missing.
        #[arg(short, long, default_value = "/etc/viewmesh/vmesh.toml")]
        config: PathBuf,
    },
    /// Fetch one order by its order number.
    Get {
        /// Order number.
        key: String,
    },
    /// List orders across the fleet, or only those held by the target instance.
    List {
        /// Ask the target instance for its own entries only.
        #[arg(short, long)]
        local: bool,
    },
}

impl Cli {
    /// Runs the client subcommands. `serve` is handled by the binary.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Get { ref key } => self.get(key).await,
            Command::List { local } => self.list(local).await,
            Command::Serve { .. } => anyhow::bail!("serve is started by the vmesh binary"),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.server.trim_end_matches('/'), ENTITY_PATH)
    }

    async fn get(&self, key: &str) -> Result<()> {
        let mut url = reqwest::Url::parse(&self.collection_url())?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("server URL cannot carry a path: {}", self.server))?
            .push(key);

        let response = Client::new().get(url).send().await?;
        match response.status() {
            StatusCode::OK => {
                let order: VehicleOrder = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&order)?);
                Ok(())
            }
            StatusCode::NOT_FOUND => anyhow::bail!("Order {} not found", key),
            status => anyhow::bail!("Request failed: {}", status),
        }
    }

    async fn list(&self, local: bool) -> Result<()> {
        let response = Client::new()
            .get(self.collection_url())
            .query(&[("local", local)])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Request failed: {}", response.status());
        }

        let orders: Vec<VehicleOrder> = response.json().await?;
        println!("{:<20} {:<20} {:>6}", "ORDER", "VEHICLE", "PLANTS");
        for order in &orders {
            println!(
                "{:<20} {:<20} {:>6}",
                order.order_number,
                order.vehicle_id.as_deref().unwrap_or("-"),
                order.order_per_plant.len()
            );
        }
        println!("{} orders", orders.len());
        Ok(())
    }
}
