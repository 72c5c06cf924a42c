use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_HIGH_WATER_MARK, DEFAULT_POLL_INTERVAL_MS};

/// Sender-side tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum bytes per chunk. 0 means [`DEFAULT_CHUNK_SIZE`].
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Sending pauses while the channel buffers more than this many bytes.
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
    /// How often the buffered amount is rechecked while paused.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TransferConfig {
    /// Chunk size with 0 coerced to the default.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A contiguous byte range of a file.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Progress of one outgoing file, emitted after every chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Position of the file in the send queue.
    pub file_index: usize,
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// `bytes_sent / total_bytes` in `[0, 1]`; 1.0 for an empty file.
    pub fraction: f64,
    /// Instantaneous KB/s over the last step, rounded to two decimals.
    ///
    /// `None` when the step took no measurable time.
    pub throughput_kbps: Option<f64>,
    /// Remaining time estimated from the sliding-window average.
    pub eta: Option<Duration>,
}

/// A fully reassembled incoming file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Locally generated name (`received_file_<millis>`).
    pub name: String,
    pub data: Arc<[u8]>,
}

impl ReceivedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Writes the file into `dir` under its generated name.
    pub async fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.name);
        tokio::fs::write(&path, &self.data).await?;
        Ok(path)
    }
}
