//! Video collector server.
//!
//! Accepts framed TCP connections from the crawler and runs the external
//! recording helper once per received CID. A counting semaphore admits at
//! most five concurrent recordings; saturated waiters block on the semaphore
//! bounded by a uniformly random 60–120 s timeout and retry, so a crowd of
//! pending jobs does not wake in lockstep.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cidcrawler::sink::{read_frame, WantedCid};
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

const MAX_RUNNING: usize = 5;
const ADMISSION_WAIT_MIN: Duration = Duration::from_secs(60);
const ADMISSION_WAIT_MAX: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let addr = std::env::var("SERVER_URL").unwrap_or_else(|_| "0.0.0.0:10000".to_string());
    let save_dir = PathBuf::from(std::env::var("SAVE_DIR").unwrap_or_else(|_| "/out".to_string()));

    let running = Arc::new(Semaphore::new(MAX_RUNNING));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!("Serving {}", peer);
        tokio::spawn(handle_connection(
            stream,
            save_dir.clone(),
            Arc::clone(&running),
        ));
    }
}

async fn handle_connection(stream: TcpStream, save_dir: PathBuf, running: Arc<Semaphore>) {
    let (mut read_half, _write_half) = stream.into_split();
    loop {
        let payload = match read_frame(&mut read_half).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::debug!("Received EOF from connection");
                return;
            }
            Err(e) => {
                tracing::warn!("Error reading frame: {}", e);
                return;
            }
        };
        let record = match serde_json::from_slice::<WantedCid>(&payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Undecodable record: {}", e);
                continue;
            }
        };
        tracing::info!("Processing {} with type {}", record.cid, record.file_type);
        tokio::spawn(record_video(
            save_dir.clone(),
            record.cid,
            Arc::clone(&running),
        ));
    }
}

/// Block until a recording slot is free. The wait is bounded by a randomised
/// timeout, after which admission is simply retried.
async fn acquire_slot(
    running: Arc<Semaphore>,
    wait_min: Duration,
    wait_max: Duration,
) -> OwnedSemaphorePermit {
    loop {
        let wait = rand::thread_rng().gen_range(wait_min..=wait_max);
        match timeout(wait, Arc::clone(&running).acquire_owned()).await {
            Ok(Ok(permit)) => return permit,
            Ok(Err(_)) => unreachable!("recording semaphore is never closed"),
            Err(_) => {
                tracing::info!(
                    "Recording queue full ({} running), waited {:?}, retrying",
                    MAX_RUNNING,
                    wait
                );
            }
        }
    }
}

async fn record_video(save_dir: PathBuf, cid: String, running: Arc<Semaphore>) {
    let video_dir = save_dir.join(&cid);
    if let Err(e) = tokio::fs::create_dir_all(&video_dir).await {
        tracing::warn!("Failed to create {}: {}", video_dir.display(), e);
        return;
    }

    let permit = acquire_slot(running, ADMISSION_WAIT_MIN, ADMISSION_WAIT_MAX).await;
    tracing::info!("Recording {}", cid);

    let status = tokio::process::Command::new("python3")
        .arg("record.py")
        .args(["-c", &cid])
        .args(["-f", "daemon.txt"])
        .arg("-d")
        .arg(&video_dir)
        .status()
        .await;
    match status {
        Ok(status) if status.success() => tracing::info!("Recorded {}", cid),
        Ok(status) => tracing::warn!("Recorder exited with {} for {}", status, cid),
        Err(e) => tracing::warn!("Failed to run recorder for {}: {}", cid, e),
    }

    drop(permit);
}
