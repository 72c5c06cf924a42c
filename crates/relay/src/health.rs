//! Liveness probe served on the relay's WebSocket port.
//!
//! The relay peeks at the request line before the WebSocket upgrade:
//! `GET /health` is answered here with a fixed 200 response, anything else
//! goes on to the WebSocket handshake.

use std::time::Duration;

use peerdrop_protocol::constants::{HEALTH_BODY, HEALTH_PATH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::RelayError;

/// Bytes needed to decide whether a request line targets the probe.
const PEEK_LEN: usize = 32;

/// Upper bound on waiting for the request line to arrive.
const PEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns `true` if the request on `stream` is a health probe.
///
/// Does not consume any bytes.
pub(crate) async fn is_health_probe(stream: &TcpStream) -> Result<bool, RelayError> {
    let mut buf = [0u8; PEEK_LEN];
    let peek = async {
        loop {
            let n = stream.peek(&mut buf).await?;
            if n == 0 || n == buf.len() || buf[..n].contains(&b'\n') {
                return Ok::<usize, std::io::Error>(n);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    let n = tokio::time::timeout(PEEK_TIMEOUT, peek)
        .await
        .map_err(|_| RelayError::HandshakeTimeout)??;
    Ok(request_targets_health(&buf[..n]))
}

/// Matches `GET /health` followed by a space, query string or line end.
fn request_targets_health(head: &[u8]) -> bool {
    let prefix = format!("GET {HEALTH_PATH}");
    let Some(rest) = head.strip_prefix(prefix.as_bytes()) else {
        return false;
    };
    matches!(rest.first(), Some(b' ' | b'?' | b'\r' | b'\n'))
}

/// Consumes the request head and writes the fixed success response.
pub(crate) async fn respond(stream: &mut TcpStream) -> Result<(), RelayError> {
    // Drain the request head; the probe carries no body.
    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    let read_head = async {
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        Ok::<(), std::io::Error>(())
    };
    tokio::time::timeout(PEEK_TIMEOUT, read_head)
        .await
        .map_err(|_| RelayError::HandshakeTimeout)??;

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        HEALTH_BODY.len(),
        HEALTH_BODY
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
