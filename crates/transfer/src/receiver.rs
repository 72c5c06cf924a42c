use std::sync::Arc;

use peerdrop_protocol::ChannelPayload;
use tokio::sync::mpsc;

use crate::TransferError;
use crate::channel::ChannelEvent;
use crate::types::ReceivedFile;

/// Prefix of locally generated names for incoming files.
const RECEIVED_PREFIX: &str = "received_file_";

/// Rebuilds files from the ordered payloads of one data channel.
///
/// Binary payloads accumulate until the `"EOF"` marker, which finalizes
/// them into one [`ReceivedFile`]. Other text payloads are ignored.
#[derive(Default)]
pub struct Reassembler {
    chunks: Vec<Vec<u8>>,
    pending_bytes: usize,
    last_stamp: Option<i64>,
    same_stamp_count: u32,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one payload. Returns the completed file on the marker.
    pub fn push(&mut self, payload: ChannelPayload) -> Option<ReceivedFile> {
        match payload {
            ChannelPayload::Binary(data) => {
                self.pending_bytes += data.len();
                self.chunks.push(data);
                None
            }
            p if p.is_eof() => Some(self.finish()),
            ChannelPayload::Text(text) => {
                tracing::debug!(len = text.len(), "ignoring unexpected text payload");
                None
            }
        }
    }

    /// Drops any partially received file.
    pub fn abort(&mut self) {
        if self.pending_bytes > 0 || !self.chunks.is_empty() {
            tracing::warn!(bytes = self.pending_bytes, "discarding partial file");
        }
        self.chunks.clear();
        self.pending_bytes = 0;
    }

    /// Bytes received for the file in progress.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    fn finish(&mut self) -> ReceivedFile {
        let data: Arc<[u8]> = Arc::from(self.chunks.concat());
        self.chunks.clear();
        self.pending_bytes = 0;

        let name = self.next_name(chrono::Utc::now().timestamp_millis());
        tracing::info!(file = %name, size = data.len(), "file received");
        ReceivedFile { name, data }
    }

    /// `received_file_<millis>`, suffixed when two files share a millisecond.
    fn next_name(&mut self, millis: i64) -> String {
        if self.last_stamp == Some(millis) {
            self.same_stamp_count += 1;
            format!("{RECEIVED_PREFIX}{millis}_{}", self.same_stamp_count)
        } else {
            self.last_stamp = Some(millis);
            self.same_stamp_count = 0;
            format!("{RECEIVED_PREFIX}{millis}")
        }
    }
}

/// Drains channel events, handing each completed file to `on_file`.
///
/// Returns the number of files received once the channel closes. A channel
/// error discards the partial file and is returned as
/// [`TransferError::ChannelFailed`].
pub async fn receive_files<F>(
    events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    mut on_file: F,
) -> Result<usize, TransferError>
where
    F: FnMut(ReceivedFile),
{
    let mut reassembler = Reassembler::new();
    let mut received = 0;

    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Open => tracing::debug!("data channel open"),
            ChannelEvent::Message(payload) => {
                if let Some(file) = reassembler.push(payload) {
                    received += 1;
                    on_file(file);
                }
            }
            ChannelEvent::Error(reason) => {
                reassembler.abort();
                return Err(TransferError::ChannelFailed(reason));
            }
            ChannelEvent::Closed => break,
        }
    }

    reassembler.abort();
    Ok(received)
}
