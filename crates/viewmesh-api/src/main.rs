use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use viewmesh_api::cli::{Cli, Command};
use viewmesh_api::{OrderApi, ServerConfig};
use viewmesh_query::MemoryCluster;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Serve { config } => serve_standalone(config.clone()).await,
        _ => cli.run().await,
    }
}

async fn serve_standalone(config_path: PathBuf) -> Result<()> {
    let config = if config_path.exists() {
        ServerConfig::from_file(&config_path)?
    } else {
        tracing::warn!("Config file not found, using defaults: {}", config_path.display());
        ServerConfig::default()
    };

    tracing::info!(
        instances = config.instances,
        partitions = config.partitions,
        "ViewMesh starting with in-process log platform"
    );

    let cluster = MemoryCluster::new(config.partitions)?;
    cluster.register_store(&config.store_name, &config.topic);

    let mut listeners = Vec::new();
    for offset in 0..config.instances.max(1) {
        let query = config.query_config(offset);
        let platform = cluster.join(query.self_host());
        let api = Arc::new(OrderApi::new(&query, Arc::new(platform))?);
        let listener = tokio::net::TcpListener::bind(config.bind_addr_for(offset)).await?;
        listeners.push((api, listener));
    }

    cluster.materialize();
    let materializer = cluster.spawn_materializer(Duration::from_millis(config.materialize_interval_ms.max(1)));

    let mut servers = tokio::task::JoinSet::new();
    for (api, listener) in listeners {
        servers.spawn(async move {
            if let Err(e) = api.serve(listener).await {
                tracing::error!("API serve error: {}", e);
            }
        });
    }

    tokio::select! {
        _ = servers.join_next() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    materializer.abort();
    Ok(())
}
