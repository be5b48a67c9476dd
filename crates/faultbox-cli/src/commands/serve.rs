//! Serve command - runs the Faultbox HTTP service.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use faultbox_config::FaultboxConfig;
use faultbox_fault::{standard_faults, traffic_control};
use faultbox_server::{AppState, Sandbox, run_server};
use faultbox_store::{CacheBackend, MemoryCache, MemoryPrimary, PrimaryBackend, Store};
use tracing::{info, warn};

pub fn run(config_dir: Option<&Path>, bind: Option<&str>, in_memory: bool) -> Result<()> {
    let mut config = super::load_config(config_dir)?;
    if let Some(bind) = bind {
        config.server.bind_address = parse_address(bind)?.to_string();
    }
    if in_memory {
        config.faults.latency.dry_run = true;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(config, in_memory))
}

async fn serve(config: FaultboxConfig, in_memory: bool) -> Result<()> {
    let store = if in_memory {
        info!("Using in-memory primary store and cache");
        Store::new(
            PrimaryBackend::from_client(Arc::new(MemoryPrimary::new())),
            CacheBackend::from_client(Arc::new(MemoryCache::new())),
            config.data.clone(),
        )
    } else {
        Store::connect(&config).await
    };

    let tc = traffic_control(&config.faults.latency);
    let faults = standard_faults(&config.faults, store.cache().clone(), tc)
        .context("Failed to register faults")?;
    info!(faults = ?faults.names(), "Faults registered");

    let sandbox = Arc::new(Sandbox::new(store, faults));
    let state = AppState::new(Arc::clone(&sandbox));

    println!();
    println!("Faultbox - chaos sandbox");
    println!();
    println!("  Bind address:   {}", config.server.bind_address);
    println!(
        "  Mode:           {}",
        if in_memory { "in-memory" } else { "live" }
    );
    println!(
        "  Traffic control: {}",
        if config.faults.latency.dry_run {
            "dry run".to_string()
        } else {
            format!("{} on {}", config.faults.latency.tc_binary, config.faults.latency.interface)
        }
    );
    println!();
    println!("Server is ready. Press Ctrl+C to stop.");
    println!();

    let shutdown = {
        let sandbox = Arc::clone(&sandbox);
        async move {
            shutdown_signal().await;
            info!("Shutdown requested, clearing faults");
            let stuck = sandbox.shutdown().await;
            if !stuck.is_empty() {
                warn!(faults = ?stuck, "Some faults could not be cleared");
            }
        }
    };

    run_server(&config.server, state, shutdown)
        .await
        .context("Server error during operation")?;

    println!();
    println!("Server stopped gracefully.");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Parses an address string into a `SocketAddr`.
///
/// Accepts:
/// - Port only: "3500" -> "0.0.0.0:3500"
/// - Full address: "127.0.0.1:3500"
/// - IPv6: `[::1]:3500`
fn parse_address(address: &str) -> Result<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(port) = address.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }

    bail!(
        "Invalid address '{address}'. Use a port (e.g., '3500') or full address (e.g., '127.0.0.1:3500')"
    );
}
