//! WebSocket write pump: the only writer on the relay socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Writes queued frames to the relay until cancelled or the queue closes,
/// then sends a close frame.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = write_rx.recv() => frame,
        };
        let Some(frame) = frame else {
            debug!("write queue closed");
            break;
        };
        if let Err(e) = write.send(frame).await {
            error!("relay write error: {e}");
            cancel.cancel();
            return;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}
