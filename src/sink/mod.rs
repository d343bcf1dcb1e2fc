//! Collector Sink Module
//!
//! Long-lived, length-prefixed TCP clients delivering selected CIDs to the
//! downstream collector services.
//!
//! ## Wire format
//! Each frame is a 4-byte big-endian unsigned length followed by that many
//! payload bytes; payloads are single JSON objects `{"cid": …, "type": …}`.
//!
//! ## Connection lifecycle
//! The client dials once at startup with a bounded retry loop; exhaustion is
//! a fatal startup error. The connection is then owned by a writer task fed
//! from a bounded channel (one outstanding frame at a time) and a reader task
//! that drains any reply frames to keep the peer from stalling on
//! back-pressure. Failed writes are logged and dropped; the client never
//! re-dials.


use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Upper bound for a single frame; anything larger is a protocol violation.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

const DIAL_ATTEMPTS: u32 = 20;
const DIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const PENDING_FRAMES: usize = 256;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to dial {addr} after {attempts} attempts")]
    DialExhausted { addr: String, attempts: u32 },
}

/// A CID selected for collection, as carried in a sink frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantedCid {
    pub cid: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read one length-prefixed frame. `Ok(None)` signals a clean EOF at a frame
/// boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Handle to a collector sink. Cloneable; all clones feed the same writer
/// task.
#[derive(Clone)]
pub struct SinkClient {
    name: String,
    tx: mpsc::Sender<WantedCid>,
}

impl SinkClient {
    /// Dial `addr` with the production retry policy (20 attempts, 1 s apart).
    pub async fn connect(name: &str, addr: &str) -> Result<Self, SinkError> {
        Self::connect_with(name, addr, DIAL_ATTEMPTS, DIAL_RETRY_DELAY).await
    }

    pub async fn connect_with(
        name: &str,
        addr: &str,
        attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, SinkError> {
        let mut attempt = 0;
        let stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(SinkError::DialExhausted {
                            addr: addr.to_string(),
                            attempts,
                        });
                    }
                    tracing::warn!(
                        "Failed to dial {} sink at {} ({}), retry {}/{}",
                        name,
                        addr,
                        e,
                        attempt,
                        attempts
                    );
                    tokio::time::sleep(retry_delay).await;
                }
            }
        };

        tracing::info!("Connected {} sink to {}", name, addr);

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(PENDING_FRAMES);

        tokio::spawn(writer_loop(name.to_string(), write_half, rx));
        tokio::spawn(reader_drain(name.to_string(), read_half));

        Ok(Self {
            name: name.to_string(),
            tx,
        })
    }

    /// Queue a record for delivery. Best-effort: when the writer task has
    /// gone away the record is logged and dropped.
    pub async fn send(&self, record: WantedCid) {
        if self.tx.send(record).await.is_err() {
            tracing::warn!("{} sink writer gone, dropping record", self.name);
        }
    }
}

async fn writer_loop(
    name: String,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<WantedCid>,
) {
    while let Some(record) = rx.recv().await {
        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("{} sink: unable to encode {:?}: {}", name, record, e);
                continue;
            }
        };
        if let Err(e) = write_frame(&mut writer, &payload).await {
            tracing::warn!("{} sink: failed to write frame for {}: {}", name, record.cid, e);
        }
    }
    tracing::debug!("{} sink writer stopped", name);
}

/// Consume and discard any reply frames so the peer never blocks on its send
/// buffer.
async fn reader_drain(name: String, mut reader: OwnedReadHalf) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!("{} sink closed by peer", name);
                return;
            }
            Err(e) => {
                tracing::debug!("{} sink read error: {}", name, e);
                return;
            }
        }
    }
}
