//! Peer connections built on the `webrtc` crate.

use std::sync::Arc;

use peerdrop_session::{
    ConnectionFactory, IceServer, PeerConnection, SessionError, TransportEvent, TransportFuture,
};
use serde_json::Value;
use tokio::sync::mpsc;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::channel;
use crate::convert;

/// Factory options.
#[derive(Debug, Clone, Default)]
pub struct RtcOptions {
    /// Gather candidates on loopback interfaces too. Lets two endpoints on
    /// one host without other interfaces reach each other.
    pub include_loopback: bool,
}

/// Builds [`PeerConnection`]s backed by `webrtc`.
pub struct RtcConnectionFactory {
    api: API,
}

impl RtcConnectionFactory {
    pub fn new(options: RtcOptions) -> Self {
        let mut settings = SettingEngine::default();
        settings.set_include_loopback_candidate(options.include_loopback);
        let api = APIBuilder::new().with_setting_engine(settings).build();
        Self { api }
    }
}

impl Default for RtcConnectionFactory {
    fn default() -> Self {
        Self::new(RtcOptions::default())
    }
}

impl ConnectionFactory for RtcConnectionFactory {
    fn create<'a>(
        &'a self,
        ice_servers: &'a [IceServer],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> TransportFuture<'a, Box<dyn PeerConnection>> {
        Box::pin(async move {
            let config = RTCConfiguration {
                ice_servers: convert::ice_servers(ice_servers),
                ..Default::default()
            };
            let pc = Arc::new(
                self.api
                    .new_peer_connection(config)
                    .await
                    .map_err(transport_error)?,
            );
            watch(&pc, events.clone());
            tracing::debug!(servers = ice_servers.len(), "peer connection created");

            let conn: Box<dyn PeerConnection> = Box::new(RtcPeerConnection { pc, events });
            Ok(conn)
        })
    }
}

/// Routes the connection's callbacks to `events`.
fn watch(pc: &RTCPeerConnection, events: mpsc::UnboundedSender<TransportEvent>) {
    let candidates = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let candidates = candidates.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else {
                tracing::debug!("ICE gathering complete");
                return;
            };
            let json = candidate
                .to_json()
                .map_err(transport_error)
                .and_then(|init| convert::candidate_to_json(&init));
            match json {
                Ok(json) => {
                    let _ = candidates.send(TransportEvent::LocalCandidate(json));
                }
                Err(e) => tracing::warn!("dropping local candidate: {e}"),
            }
        })
    }));

    let states = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let states = states.clone();
        Box::pin(async move {
            tracing::debug!(?state, "peer connection state changed");
            if matches!(
                state,
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed
            ) {
                let _ = states.send(TransportEvent::ConnectivityLost);
            }
        })
    }));

    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let events = events.clone();
        Box::pin(async move {
            tracing::debug!(label = %dc.label(), "remote data channel announced");
            channel::attach(dc, events);
        })
    }));
}

fn transport_error(e: webrtc::Error) -> SessionError {
    SessionError::Transport(e.to_string())
}

struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl PeerConnection for RtcPeerConnection {
    fn create_data_channel(&self, label: &str) -> TransportFuture<'_, ()> {
        let label = label.to_string();
        Box::pin(async move {
            let init = RTCDataChannelInit {
                ordered: Some(true),
                ..Default::default()
            };
            let dc = self
                .pc
                .create_data_channel(&label, Some(init))
                .await
                .map_err(transport_error)?;
            channel::attach(dc, self.events.clone());
            Ok(())
        })
    }

    fn create_offer(&self) -> TransportFuture<'_, Value> {
        Box::pin(async move {
            let offer = self.pc.create_offer(None).await.map_err(transport_error)?;
            convert::description_to_json(&offer)
        })
    }

    fn create_answer(&self) -> TransportFuture<'_, Value> {
        Box::pin(async move {
            let answer = self.pc.create_answer(None).await.map_err(transport_error)?;
            convert::description_to_json(&answer)
        })
    }

    fn set_local_description(&self, description: Value) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let description = convert::description_from_json(description)?;
            self.pc
                .set_local_description(description)
                .await
                .map_err(transport_error)
        })
    }

    fn set_remote_description(&self, description: Value) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let description = convert::description_from_json(description)?;
            self.pc
                .set_remote_description(description)
                .await
                .map_err(transport_error)
        })
    }

    fn add_ice_candidate(&self, candidate: Value) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let candidate = convert::candidate_from_json(candidate)?;
            self.pc
                .add_ice_candidate(candidate)
                .await
                .map_err(transport_error)
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move { self.pc.close().await.map_err(transport_error) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerdrop_session::ChannelHandle;
    use peerdrop_transfer::{DataChannel, FileSender, TransferConfig, receive_files};
    use std::time::Duration;

    async fn connection(
        factory: &RtcConnectionFactory,
    ) -> (Box<dyn PeerConnection>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (factory.create(&[], tx).await.unwrap(), rx)
    }

    #[tokio::test]
    async fn offer_carries_data_channel() {
        let factory = RtcConnectionFactory::default();
        let (conn, _events) = connection(&factory).await;
        conn.create_data_channel("fileChannel").await.unwrap();

        let offer = conn.create_offer().await.unwrap();
        assert_eq!(offer["type"], "offer");
        let sdp = offer["sdp"].as_str().unwrap();
        assert!(sdp.starts_with("v=0"));
        assert!(sdp.contains("webrtc-datachannel"));

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn garbage_remote_description_is_rejected() {
        let factory = RtcConnectionFactory::default();
        let (conn, _events) = connection(&factory).await;

        let err = conn
            .set_remote_description(serde_json::json!({"type": "offer"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidDescription(_)));

        assert!(conn
            .set_remote_description(serde_json::json!({"type": "offer", "sdp": "not sdp"}))
            .await
            .is_err());

        conn.close().await.unwrap();
    }

    /// Runs the offer/answer exchange by hand and relays candidates until
    /// both ends report an open channel.
    async fn open_pair(
        factory: &RtcConnectionFactory,
    ) -> (
        [Box<dyn PeerConnection>; 2],
        ChannelHandle,
        ChannelHandle,
    ) {
        let (a, mut a_events) = connection(factory).await;
        let (b, mut b_events) = connection(factory).await;

        a.create_data_channel("fileChannel").await.unwrap();
        let offer = a.create_offer().await.unwrap();
        a.set_local_description(offer.clone()).await.unwrap();
        b.set_remote_description(offer).await.unwrap();
        let answer = b.create_answer().await.unwrap();
        b.set_local_description(answer.clone()).await.unwrap();
        a.set_remote_description(answer).await.unwrap();

        let (mut a_channel, mut b_channel) = (None, None);
        while a_channel.is_none() || b_channel.is_none() {
            tokio::select! {
                Some(event) = a_events.recv() => match event {
                    TransportEvent::LocalCandidate(c) => b.add_ice_candidate(c).await.unwrap(),
                    TransportEvent::ChannelOpen(handle) => a_channel = Some(handle),
                    other => panic!("unexpected event {other:?}"),
                },
                Some(event) = b_events.recv() => match event {
                    TransportEvent::LocalCandidate(c) => a.add_ice_candidate(c).await.unwrap(),
                    TransportEvent::ChannelOpen(handle) => b_channel = Some(handle),
                    other => panic!("unexpected event {other:?}"),
                },
            }
        }

        ([a, b], a_channel.unwrap(), b_channel.unwrap())
    }

    #[tokio::test]
    #[ignore = "needs local UDP networking"]
    async fn loopback_file_transfer() {
        let factory = RtcConnectionFactory::new(RtcOptions {
            include_loopback: true,
        });
        let (conns, a, mut b) = tokio::time::timeout(Duration::from_secs(20), open_pair(&factory))
            .await
            .expect("channels did not open");
        assert_eq!(a.channel.label(), "fileChannel");
        assert!(a.channel.is_open());
        assert_eq!(b.channel.label(), "fileChannel");

        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, &data).unwrap();

        let config = TransferConfig {
            high_water_mark: 16 * 1024,
            ..TransferConfig::default()
        };
        let sender = FileSender::new(Arc::clone(&a.channel), config);
        assert_eq!(sender.send_paths(&[path]).await.unwrap(), 1);

        let mut received = Vec::new();
        let receive = receive_files(&mut b.events, |file| {
            received.push(file);
            b.channel.close();
        });
        tokio::time::timeout(Duration::from_secs(20), receive)
            .await
            .expect("file did not arrive")
            .unwrap();

        assert_eq!(received.len(), 1);
        assert_eq!(&received[0].data[..], &data[..]);

        for conn in conns {
            conn.close().await.unwrap();
        }
    }
}
