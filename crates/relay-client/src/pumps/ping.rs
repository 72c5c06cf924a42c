//! WebSocket ping pump: periodic keepalive toward the relay.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use peerdrop_protocol::constants::WS_PING_PERIOD;

/// Queues a ping every [`WS_PING_PERIOD`] until cancelled.
///
/// A full write queue skips the ping; a closed one stops the pump.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(WS_PING_PERIOD);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match write_tx.try_send(tungstenite::Message::Ping(Vec::new().into())) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("write queue full, skipping ping");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn pings_once_per_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ping_pump(tx, cancel.clone()));

        tokio::time::sleep(WS_PING_PERIOD / 2).await;
        assert!(rx.try_recv().is_err(), "no ping before the first period");

        tokio::time::sleep(WS_PING_PERIOD).await;
        assert!(matches!(rx.try_recv(), Ok(tungstenite::Message::Ping(_))));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }

    #[tokio::test]
    async fn stops_when_queue_closes() {
        tokio::time::pause();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        ping_pump(tx, CancellationToken::new()).await;
    }
}
