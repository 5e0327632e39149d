//! # CWA sample
//!
//! Loads one route against a live API and prints what ended up in the store.
//!
//! ```text
//! cwa-sample --api-url https://api.example.com --route /
//! cwa-sample --config cwa.toml --route /blog --resources --watch
//! ```
//!
//! With `--watch` the process stays subscribed to the Mercure hub and logs every
//! live update until Ctrl-C.

use clap::Parser;
use cwa_core::{setup_tracing, CwaConfig, CwaEvent, CwaSystem, ReqwestTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Instrument};

#[derive(Debug, Parser)]
#[command(name = "cwa-sample", about = "Resolve a CWA route and inspect the resource store")]
struct Args {
    /// TOML config file; `CWA_*` environment variables still override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "http://localhost:8000")]
    api_url: String,

    #[arg(short, long, default_value = "/")]
    route: String,

    /// Print every current resource as JSON instead of the IRI list.
    #[arg(long)]
    resources: bool,

    /// Keep the hub subscription open until Ctrl-C.
    #[arg(short, long)]
    watch: bool,
}

fn load_config(args: &Args) -> Result<CwaConfig, String> {
    let config = match &args.config {
        Some(path) => CwaConfig::from_file(path),
        None => CwaConfig::new(args.api_url.clone()).with_env_overrides(),
    };
    config.map_err(|e| e.to_string())
}

async fn print_store(system: &CwaSystem, resources: bool) -> Result<(), String> {
    let iris = system.store.current_iris().await.map_err(|e| e.to_string())?;
    if !resources {
        for iri in iris {
            println!("{iri}");
        }
        return Ok(());
    }

    let mut all = Vec::with_capacity(iris.len());
    for iri in &iris {
        if let Some(resource) = system
            .store
            .get_resource(iri)
            .await
            .map_err(|e| e.to_string())?
        {
            all.push(resource);
        }
    }
    let json = serde_json::to_string_pretty(&all).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

async fn watch_events(system: &CwaSystem) {
    let mut events = system.events.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return;
            }
            event = events.recv() => match event {
                Ok(CwaEvent::LiveUpdateApplied(iri)) => info!(%iri, "Live update applied"),
                Ok(CwaEvent::ResourceDeleted(iri)) => info!(%iri, "Resource deleted"),
                Ok(CwaEvent::HubState(state)) => info!(%state, "Hub connection"),
                Ok(CwaEvent::Notification(notification)) => {
                    warn!(code = %notification.code, "{}", notification.title)
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event listener lagged"),
                Err(RecvError::Closed) => return,
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();
    let args = Args::parse();

    let config = load_config(&args)?;
    info!(api_url = %config.api_url, route = %args.route, "Starting CWA sample");

    let transport = ReqwestTransport::new(&config).map_err(|e| e.to_string())?;
    let system = CwaSystem::new(&config, Arc::new(transport));

    let span = tracing::info_span!("route_load", route = %args.route);
    let loaded = async {
        system
            .fetcher
            .fetch_route(&args.route)
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(span)
    .await;

    match loaded {
        Ok(Some(outcome)) => {
            if let Some(redirect) = outcome.redirect {
                info!(%redirect, "Route redirects");
            }
            print_store(&system, args.resources).await?;
            if args.watch {
                watch_events(&system).await;
            }
        }
        Ok(None) => warn!("Route was already loaded"),
        Err(e) => error!("Route load failed: {e}"),
    }

    system.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}
