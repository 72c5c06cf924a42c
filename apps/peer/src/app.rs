//! Runs one endpoint until its work is done or Ctrl-C.

use peerdrop_relay_client::{Endpoint, EndpointConfig, EndpointEvent};
use peerdrop_session::SessionState;

use crate::cli::Plan;

pub async fn run(config: EndpointConfig, plan: Plan) -> anyhow::Result<()> {
    let (handle, mut events) = Endpoint::start(config).await?;
    tracing::info!(peer = %handle.peer_id(), "joined relay");

    let sending = match &plan {
        Plan::Send { remote, files } => {
            handle.enqueue(files.clone())?;
            handle.connect(remote.clone())?;
            true
        }
        Plan::Listen => false,
    };

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    EndpointEvent::Peers(peers) => tracing::info!(?peers, "peers online"),
                    EndpointEvent::Status { state, text } => {
                        tracing::info!("{text}");
                        if sending && state == SessionState::Connected {
                            handle.start_transfer()?;
                        }
                        if sending && matches!(state, SessionState::Failed(_) | SessionState::Disconnected) {
                            break;
                        }
                    }
                    EndpointEvent::Progress(progress) => tracing::debug!(
                        file = progress.file_index,
                        sent = progress.bytes_sent,
                        total = progress.total_bytes,
                        kbps = ?progress.throughput_kbps,
                        "progress"
                    ),
                    EndpointEvent::FileReceived { file, saved_to } => tracing::info!(
                        name = %file.name,
                        size = file.size(),
                        saved_to = ?saved_to,
                        "file received"
                    ),
                    EndpointEvent::TransferComplete { files } => {
                        tracing::info!(files, "transfer complete");
                        if sending {
                            break;
                        }
                    }
                    EndpointEvent::TransferFailed(reason) => {
                        tracing::warn!("transfer failed: {reason}");
                        if sending {
                            break;
                        }
                    }
                    EndpointEvent::RelayDisconnected => tracing::warn!("relay connection lost"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
