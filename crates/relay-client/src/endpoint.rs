//! Peer endpoint: relay client, session negotiator and transfer engine on
//! one task.
//!
//! The UI talks to the endpoint through [`EndpointHandle`] commands and
//! listens on the [`EndpointEvent`] channel. Session state is only touched
//! from the endpoint task; file sending and receiving run as child tasks
//! that report back through an internal channel.

use std::path::PathBuf;
use std::sync::Arc;

use peerdrop_rtc::RtcConnectionFactory;
use peerdrop_session::{
    ChannelHandle, ConnectionFactory, Negotiator, SessionEvent, SessionState, SignalSink,
    TransportEvent,
};
use peerdrop_transfer::{DataChannel, FileSender, ReceivedFile, TransferError, receive_files};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ClientError;
use crate::config::EndpointConfig;
use crate::types::{EndpointCommand, EndpointEvent, SignalEvent};
use crate::ws_client::RelayClient;

/// Reason shown when the data channel fails under a connected session.
const CONNECTION_LOST: &str = "Connection lost.";

/// Reported by the endpoint's child tasks.
enum Internal {
    FileReceived(ReceivedFile),
    /// The receive loop of the channel attached as `epoch` stopped.
    ReceiveEnded {
        epoch: u64,
        result: Result<usize, TransferError>,
    },
    SendFinished(Result<usize, TransferError>),
}

/// Control handle returned by [`Endpoint::spawn`].
pub struct EndpointHandle {
    peer_id: String,
    commands: mpsc::UnboundedSender<EndpointCommand>,
    task: JoinHandle<()>,
}

impl EndpointHandle {
    /// The id the relay assigned to this endpoint.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn send(&self, command: EndpointCommand) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    /// Starts a session to `remote_id`.
    pub fn connect(&self, remote_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(EndpointCommand::Connect(remote_id.into()))
    }

    pub fn enqueue(&self, paths: Vec<PathBuf>) -> Result<(), ClientError> {
        self.send(EndpointCommand::Enqueue(paths))
    }

    pub fn start_transfer(&self) -> Result<(), ClientError> {
        self.send(EndpointCommand::StartTransfer)
    }

    /// Stops the endpoint and waits for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(EndpointCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("endpoint task ended abnormally: {e}");
        }
    }
}

/// State owned by the endpoint task.
pub struct Endpoint {
    config: EndpointConfig,
    client: Arc<RelayClient>,
    negotiator: Negotiator,
    signals: mpsc::UnboundedReceiver<SignalEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    events: mpsc::UnboundedSender<EndpointEvent>,
    queue: Vec<PathBuf>,
    channel: Option<Arc<dyn DataChannel>>,
    /// Bumped every time a channel is attached.
    channel_epoch: u64,
    sending: Option<JoinHandle<()>>,
    receiving: Option<JoinHandle<()>>,
}

impl Endpoint {
    /// Connects to the relay and starts an endpoint whose sessions run over
    /// WebRTC.
    pub async fn start(
        config: EndpointConfig,
    ) -> Result<(EndpointHandle, mpsc::UnboundedReceiver<EndpointEvent>), ClientError> {
        let factory = Arc::new(RtcConnectionFactory::new(config.rtc_options()));
        Self::spawn(config, factory).await
    }

    /// Connects to the relay and starts the endpoint task.
    ///
    /// Peer connections are built by `factory`.
    pub async fn spawn(
        config: EndpointConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<(EndpointHandle, mpsc::UnboundedReceiver<EndpointEvent>), ClientError> {
        let (client, signals) = RelayClient::connect(&config.relay_url).await?;
        let client = Arc::new(client);
        let peer_id = client.peer_id().to_string();

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let signal_sink: Arc<dyn SignalSink> = client.clone();
        let negotiator = Negotiator::new(
            peer_id.clone(),
            config.negotiator_config(),
            factory,
            signal_sink,
            session_tx,
        );

        let (events, events_rx) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let endpoint = Self {
            config,
            client,
            negotiator,
            signals,
            session_rx,
            internal_tx,
            internal_rx,
            events,
            queue: Vec::new(),
            channel: None,
            channel_epoch: 0,
            sending: None,
            receiving: None,
        };
        let task = tokio::spawn(endpoint.run(commands_rx));

        let handle = EndpointHandle {
            peer_id,
            commands,
            task,
        };
        Ok((handle, events_rx))
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<EndpointCommand>) {
        tracing::info!(peer = %self.negotiator.local_id(), "endpoint running");
        loop {
            // Session events go first so a newly opened channel is attached
            // before any command that needs it.
            tokio::select! {
                biased;

                Some(event) = self.session_rx.recv() => self.handle_session_event(event),
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,
                Some(signal) = self.signals.recv() => self.handle_signal(signal).await,
                event = self.negotiator.next_transport_event() => {
                    if let Err(e) = self.negotiator.handle_transport_event(event).await {
                        tracing::warn!("transport event failed: {e}");
                    }
                }
                command = commands.recv() => match command {
                    Some(EndpointCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
            }
        }
        self.stop().await;
    }

    async fn handle_command(&mut self, command: EndpointCommand) {
        match command {
            EndpointCommand::Connect(remote_id) => {
                if let Err(e) = self.negotiator.create_connection(&remote_id).await {
                    tracing::error!(remote = %remote_id, "failed to start session: {e}");
                }
            }
            EndpointCommand::Enqueue(paths) => {
                tracing::debug!(count = paths.len(), "files queued");
                self.queue.extend(paths);
            }
            EndpointCommand::StartTransfer => self.start_transfer(),
            EndpointCommand::Shutdown => {}
        }
    }

    async fn handle_signal(&mut self, signal: SignalEvent) {
        let result = match signal {
            SignalEvent::PeersUpdate(peers) => {
                let local = self.negotiator.local_id();
                let others = peers.into_iter().filter(|p| p != local).collect();
                self.emit(EndpointEvent::Peers(others));
                Ok(())
            }
            SignalEvent::Offer { from, sdp } => self.negotiator.handle_offer(&from, sdp).await,
            SignalEvent::Answer { from, sdp } => self.negotiator.handle_answer(&from, sdp).await,
            SignalEvent::IceCandidate { from, candidate } => {
                self.negotiator
                    .handle_remote_candidate(&from, candidate)
                    .await
            }
            SignalEvent::Disconnected => {
                tracing::warn!("relay connection lost");
                self.emit(EndpointEvent::RelayDisconnected);
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!("signal handling failed: {e}");
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Status { state, text } => {
                if matches!(
                    state,
                    SessionState::Idle | SessionState::Failed(_) | SessionState::Disconnected
                ) {
                    self.channel = None;
                }
                self.emit(EndpointEvent::Status { state, text });
            }
            SessionEvent::ChannelReady { remote_id, channel } => {
                tracing::info!(remote = %remote_id, "ready to transfer");
                self.attach_channel(channel);
            }
        }
    }

    /// Keeps the channel for sending and starts draining it for incoming files.
    fn attach_channel(&mut self, handle: ChannelHandle) {
        let ChannelHandle {
            channel,
            mut events,
        } = handle;
        self.channel = Some(channel);
        self.channel_epoch += 1;

        if let Some(previous) = self.receiving.take() {
            previous.abort();
        }
        let epoch = self.channel_epoch;
        let internal = self.internal_tx.clone();
        self.receiving = Some(tokio::spawn(async move {
            let files = internal.clone();
            let result = receive_files(&mut events, move |file| {
                let _ = files.send(Internal::FileReceived(file));
            })
            .await;
            let _ = internal.send(Internal::ReceiveEnded { epoch, result });
        }));
    }

    fn start_transfer(&mut self) {
        let Some(channel) = self.channel.clone() else {
            tracing::warn!("transfer requested without an open channel");
            self.emit(EndpointEvent::TransferFailed("No open connection.".into()));
            return;
        };
        if self.sending.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::warn!("transfer already in progress");
            return;
        }
        if self.queue.is_empty() {
            tracing::debug!("transfer requested with an empty queue");
            return;
        }

        let files = std::mem::take(&mut self.queue);
        let events = self.events.clone();
        let sender = FileSender::new(channel, self.config.transfer.clone()).with_progress(
            Box::new(move |update| {
                let _ = events.send(EndpointEvent::Progress(update));
            }),
        );
        let internal = self.internal_tx.clone();
        tracing::info!(count = files.len(), "starting transfer");
        self.sending = Some(tokio::spawn(async move {
            let result = sender.send_paths(&files).await;
            let _ = internal.send(Internal::SendFinished(result));
        }));
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::FileReceived(file) => {
                let saved_to = match &self.config.download_dir {
                    Some(dir) => match file.save_to(dir).await {
                        Ok(path) => Some(path),
                        Err(e) => {
                            tracing::error!(file = %file.name, "failed to save received file: {e}");
                            None
                        }
                    },
                    None => None,
                };
                tracing::info!(file = %file.name, size = file.size(), "file received");
                self.emit(EndpointEvent::FileReceived { file, saved_to });
            }
            Internal::ReceiveEnded { epoch, .. } if epoch != self.channel_epoch => {
                tracing::debug!(epoch, "receive loop of a replaced channel ended");
            }
            Internal::ReceiveEnded {
                result: Ok(count), ..
            } => {
                tracing::info!(count, "data channel closed");
                self.channel_lost(TransportEvent::ConnectivityLost).await;
            }
            Internal::ReceiveEnded { result: Err(e), .. } => {
                tracing::error!("receive aborted: {e}");
                self.emit(EndpointEvent::TransferFailed(e.to_string()));
                self.channel_lost(TransportEvent::Failed(CONNECTION_LOST.into()))
                    .await;
            }
            Internal::SendFinished(Ok(files)) => {
                tracing::info!(files, "transfer complete");
                self.emit(EndpointEvent::TransferComplete { files });
            }
            Internal::SendFinished(Err(e)) => {
                tracing::error!("transfer failed: {e}");
                self.emit(EndpointEvent::TransferFailed(e.to_string()));
            }
        }
    }

    /// Drops the dead channel and moves a connected session on.
    async fn channel_lost(&mut self, event: TransportEvent) {
        self.channel = None;
        if self.negotiator.state() != &SessionState::Connected {
            return;
        }
        if let Err(e) = self.negotiator.handle_transport_event(event).await {
            tracing::warn!("failed to record channel loss: {e}");
        }
    }

    async fn stop(&mut self) {
        for task in [self.sending.take(), self.receiving.take()].into_iter().flatten() {
            task.abort();
        }
        self.negotiator.close().await;
        self.client.close();
        tracing::info!(peer = %self.negotiator.local_id(), "endpoint stopped");
    }

    fn emit(&self, event: EndpointEvent) {
        let _ = self.events.send(event);
    }
}
