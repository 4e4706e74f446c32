// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! fnhost - Worker Host
//!
//! Connects to the platform host, answers the bootstrap handshake, and
//! launches the function application on the first environment reload.

use std::sync::Arc;

use fnhost::config::Config;
use fnhost::loader::{Launcher, ProcessLauncher, ProcessLauncherConfig};
use fnhost::{MessageRouter, WorkerHost};
use fnhost_protocol::HostClient;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout may be a frame pipe for the parent, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fnhost=info".into()),
        )
        .init();

    let config = Config::load()?;
    let client_config = config.client_config()?;

    info!(
        addr = %client_config.server_addr,
        worker_id = %config.worker_id,
        max_message_length = config.max_message_length,
        "Starting worker host"
    );

    let launcher = Arc::new(ProcessLauncher::new(ProcessLauncherConfig {
        max_frame_size: config.max_message_length,
    }));
    info!(launcher_type = launcher.launcher_type(), "Launcher initialized");

    let router = MessageRouter::builder()
        .launcher(launcher)
        .config(config.router_config())
        .build()?;

    let client = HostClient::new(client_config)?;
    let (send, recv) = client.open_duplex().await?;
    let host = WorkerHost::new(router, &config.worker_id, &config.request_id);

    let result = tokio::select! {
        result = host.run(recv, send) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    client.close().await;

    if let Err(e) = result {
        error!(error = %e, "Worker host stopped");
        return Err(e.into());
    }
    info!("Worker host stopped");
    Ok(())
}
