use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use peerdrop_protocol::ChannelPayload;
use tokio::io::AsyncRead;

use crate::TransferError;
use crate::backpressure::wait_for_capacity;
use crate::channel::DataChannel;
use crate::chunked::ChunkReader;
use crate::progress::ProgressMeter;
use crate::types::{ProgressUpdate, TransferConfig};

/// Callback invoked with progress after every chunk.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Streams files over one data channel.
///
/// Files are sent strictly one after another: every chunk of a file and
/// its end marker are queued before the next file's first chunk.
pub struct FileSender<C: ?Sized> {
    channel: Arc<C>,
    config: TransferConfig,
    on_progress: Option<ProgressCallback>,
}

impl<C: DataChannel + ?Sized> FileSender<C> {
    pub fn new(channel: Arc<C>, config: TransferConfig) -> Self {
        Self {
            channel,
            config,
            on_progress: None,
        }
    }

    /// Registers the progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Sends every file in `paths` in order.
    ///
    /// Stops at the first failure; files already sent stay sent.
    /// Returns the number of files sent.
    pub async fn send_paths(&self, paths: &[PathBuf]) -> Result<usize, TransferError> {
        for (index, path) in paths.iter().enumerate() {
            let reader = ChunkReader::open(path, self.config.effective_chunk_size()).await?;
            tracing::info!(
                channel = %self.channel.label(),
                file = %path.display(),
                index,
                size = reader.file_size(),
                "sending file"
            );
            self.send_file(index, reader).await?;
        }
        Ok(paths.len())
    }

    /// Sends one file followed by the end marker.
    ///
    /// Returns the number of bytes sent.
    pub async fn send_file<R>(
        &self,
        file_index: usize,
        mut reader: ChunkReader<R>,
    ) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut meter = ProgressMeter::new(file_index, reader.file_size());

        while reader.remaining() > 0 {
            let step_start = Instant::now();
            wait_for_capacity(&*self.channel, &self.config).await?;

            let Some(chunk) = reader.next_chunk().await? else {
                break;
            };
            let len = chunk.len() as u64;
            self.channel.send(ChannelPayload::Binary(chunk.data))?;
            tracing::trace!(
                channel = %self.channel.label(),
                offset = chunk.offset,
                len,
                "chunk sent"
            );

            self.emit(meter.record(len, step_start.elapsed()));
        }

        wait_for_capacity(&*self.channel, &self.config).await?;
        self.channel.send(ChannelPayload::eof())?;

        if meter.bytes_sent() == 0 {
            self.emit(meter.complete());
        }
        tracing::debug!(
            channel = %self.channel.label(),
            file_index,
            bytes = meter.bytes_sent(),
            "file sent"
        );
        Ok(meter.bytes_sent())
    }

    fn emit(&self, update: ProgressUpdate) {
        if let Some(cb) = &self.on_progress {
            cb(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelEvent;
    use crate::memory::memory_pair;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(chunk_size: usize, mark: usize) -> TransferConfig {
        TransferConfig {
            chunk_size,
            high_water_mark: mark,
            poll_interval_ms: 10,
        }
    }

    async fn collect(
        events: &mut tokio::sync::mpsc::UnboundedReceiver<ChannelEvent>,
        n: usize,
    ) -> Vec<ChannelPayload> {
        let mut out = vec![];
        while out.len() < n {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Some(ChannelEvent::Message(p))) => out.push(p),
                Ok(Some(_)) => {}
                _ => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn file_of_150_kib_is_three_chunks_and_marker() {
        let (a, mut b) = memory_pair("fileChannel");
        let sender = FileSender::new(a.channel.clone(), TransferConfig::default());

        let data: Vec<u8> = (0..150 * 1024).map(|i| (i % 251) as u8).collect();
        let sent = sender
            .send_file(0, ChunkReader::new(&data[..], data.len() as u64, 64 * 1024))
            .await
            .unwrap();
        assert_eq!(sent, 150 * 1024);

        let got = collect(&mut b.events, 4).await;
        let sizes: Vec<usize> = got.iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![65536, 65536, 22528, 3]);
        assert!(got[3].is_eof());
        assert!(got[..3].iter().all(|p| matches!(p, ChannelPayload::Binary(_))));
    }

    #[tokio::test]
    async fn chunk_count_and_marker_for_any_size() {
        let cases: [(usize, usize); 8] = [
            (0, 1),
            (1, 1),
            (5, 1),
            (7, 7),
            (8, 7),
            (0, 64 * 1024),
            (64 * 1024, 64 * 1024),
            (64 * 1024 + 1, 64 * 1024),
        ];
        for (size, chunk_size) in cases {
            let (a, mut b) = memory_pair("fileChannel");
            let sender = FileSender::new(a.channel.clone(), config(chunk_size, 1 << 20));
            let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();

            sender
                .send_file(0, ChunkReader::new(&data[..], size as u64, chunk_size))
                .await
                .unwrap();

            let expected_chunks = size.div_ceil(chunk_size);
            let got = collect(&mut b.events, expected_chunks + 1).await;
            assert_eq!(got.len(), expected_chunks + 1, "size {size}, chunk {chunk_size}");
            assert!(got.last().unwrap().is_eof(), "size {size}, chunk {chunk_size}");

            let mut rebuilt = Vec::with_capacity(size);
            for payload in &got[..expected_chunks] {
                match payload {
                    ChannelPayload::Binary(bytes) => {
                        assert!(!bytes.is_empty() && bytes.len() <= chunk_size);
                        rebuilt.extend_from_slice(bytes);
                    }
                    other => panic!("expected binary chunk, got {other:?}"),
                }
            }
            assert_eq!(rebuilt, data, "size {size}, chunk {chunk_size}");
        }
    }

    #[tokio::test]
    async fn progress_reported_per_chunk() {
        let (a, _b) = memory_pair("fileChannel");
        let updates = Arc::new(Mutex::new(Vec::new()));
        let u = Arc::clone(&updates);
        let sender = FileSender::new(a.channel.clone(), config(4, 1024))
            .with_progress(Box::new(move |p| u.lock().unwrap().push(p)));

        sender
            .send_file(3, ChunkReader::new(&b"0123456789"[..], 10, 4))
            .await
            .unwrap();

        let updates = updates.lock().unwrap();
        let sent: Vec<u64> = updates.iter().map(|u| u.bytes_sent).collect();
        assert_eq!(sent, vec![4, 8, 10]);
        assert!(updates.iter().all(|u| u.file_index == 3 && u.total_bytes == 10));
        assert_eq!(updates.last().unwrap().fraction, 1.0);
    }

    #[tokio::test]
    async fn empty_file_sends_marker_and_full_progress() {
        let (a, mut b) = memory_pair("fileChannel");
        let updates = Arc::new(Mutex::new(Vec::new()));
        let u = Arc::clone(&updates);
        let sender = FileSender::new(a.channel.clone(), config(4, 1024))
            .with_progress(Box::new(move |p| u.lock().unwrap().push(p)));

        assert_eq!(sender.send_file(0, ChunkReader::new(&b""[..], 0, 4)).await.unwrap(), 0);

        let got = collect(&mut b.events, 1).await;
        assert_eq!(got, vec![ChannelPayload::eof()]);
        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].fraction, 1.0);
    }

    #[tokio::test]
    async fn backpressure_holds_until_drained() {
        let (a, mut b) = memory_pair("fileChannel");
        a.channel.pause();

        let sender = FileSender::new(a.channel.clone(), config(4, 4));
        let task = tokio::spawn(async move {
            sender
                .send_file(0, ChunkReader::new(&[9u8; 20][..], 20, 4))
                .await
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        // Two chunks fit (0 <= 4, then 4 <= 4); the third waits at 8 > 4.
        assert_eq!(a.channel.sent_messages(), 2);
        assert_eq!(a.channel.buffered_amount(), 8);
        assert!(!task.is_finished());

        a.channel.resume();
        assert_eq!(task.await.unwrap().unwrap(), 20);

        let got = collect(&mut b.events, 6).await;
        assert_eq!(got.len(), 6);
        assert!(got[5].is_eof());
    }

    #[tokio::test]
    async fn closed_channel_fails_transfer() {
        let (a, _b) = memory_pair("fileChannel");
        a.channel.close();
        let sender = FileSender::new(a.channel.clone(), config(4, 4));
        let result = sender
            .send_file(0, ChunkReader::new(&b"abc"[..], 3, 4))
            .await;
        assert!(matches!(result, Err(TransferError::ChannelClosed)));
    }

    #[tokio::test]
    async fn queued_paths_sent_in_order() {
        let dir = TempDir::new().unwrap();
        let small = dir.path().join("small.txt");
        let big = dir.path().join("big.bin");
        std::fs::File::create(&small).unwrap().write_all(b"hi").unwrap();
        std::fs::File::create(&big).unwrap().write_all(&[1u8; 10]).unwrap();

        let (a, mut b) = memory_pair("fileChannel");
        let sender = FileSender::new(a.channel.clone(), config(4, 1024));
        assert_eq!(sender.send_paths(&[small, big]).await.unwrap(), 2);

        let got = collect(&mut b.events, 6).await;
        let sizes: Vec<usize> = got.iter().map(|p| p.len()).collect();
        // small: 2 + EOF, big: 4 + 4 + 2 + EOF
        assert_eq!(sizes, vec![2, 3, 4, 4, 2, 3]);
        assert!(got[1].is_eof());
        assert!(got[5].is_eof());
    }

    #[tokio::test]
    async fn missing_path_stops_queue() {
        let dir = TempDir::new().unwrap();
        let (a, _b) = memory_pair("fileChannel");
        let sender = FileSender::new(a.channel.clone(), config(4, 1024));
        let result = sender.send_paths(&[dir.path().join("missing")]).await;
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
