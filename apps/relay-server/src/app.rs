//! Runs the relay until Ctrl-C.

use std::sync::Arc;

use peerdrop_relay::RelayServer;

use crate::config::RelayConfig;

pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let server = RelayServer::new(config.server_config()?);
    let server_run = Arc::clone(&server);
    let mut serve = tokio::spawn(async move { server_run.run().await });

    tokio::select! {
        result = &mut serve => {
            // The accept loop only returns early on a bind or accept failure.
            result??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!(peers = server.registry().len(), "shutdown requested");
        }
    }

    server.shutdown();
    serve.await??;
    Ok(())
}
