//! Text collector server.
//!
//! Accepts framed TCP connections from the crawler, decodes each frame as a
//! `{cid, type}` record, fetches the content from the configured gateway and
//! writes it to `<save_dir>/<cid>`. Per-CID failures are logged and never
//! tear down the connection.

use std::path::PathBuf;

use cidcrawler::sink::{read_frame, WantedCid};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let addr = std::env::var("SERVER_URL").unwrap_or_else(|_| "0.0.0.0:9999".to_string());
    let gateway_url =
        std::env::var("IPFS_GATEWAY_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let save_dir = PathBuf::from(std::env::var("SAVE_DIR").unwrap_or_else(|_| "/out".to_string()));
    tracing::info!("Gateway {}", gateway_url);

    tokio::fs::create_dir_all(&save_dir).await?;

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!("Serving {}", peer);
        tokio::spawn(handle_connection(
            stream,
            gateway_url.clone(),
            save_dir.clone(),
        ));
    }
}

async fn handle_connection(stream: TcpStream, gateway_url: String, save_dir: PathBuf) {
    let (read_half, _write_half) = stream.into_split();
    let client = reqwest::Client::new();
    read_records(read_half, move |record| {
        let client = client.clone();
        let gateway_url = gateway_url.clone();
        let save_dir = save_dir.clone();
        tokio::spawn(async move {
            fetch_and_save(&client, &gateway_url, &save_dir, record).await;
        });
    })
    .await;
}

async fn read_records(mut reader: OwnedReadHalf, mut handle: impl FnMut(WantedCid)) {
    loop {
        let payload = match read_frame(&mut reader).await {
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
        match serde_json::from_slice::<WantedCid>(&payload) {
            Ok(record) => {
                tracing::info!("Processing {} with type {}", record.cid, record.file_type);
                handle(record);
            }
            Err(e) => {
                tracing::warn!("Undecodable record: {}", e);
            }
        }
    }
}

async fn fetch_and_save(
    client: &reqwest::Client,
    gateway_url: &str,
    save_dir: &std::path::Path,
    record: WantedCid,
) {
    let url = format!("{}/ipfs/{}", gateway_url, record.cid);
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Failed to download {}: {}", record.cid, e);
            return;
        }
    };
    if !response.status().is_success() {
        tracing::warn!(
            "Gateway returned {} for {}",
            response.status(),
            record.cid
        );
        return;
    }
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Failed to read body for {}: {}", record.cid, e);
            return;
        }
    };

    let path = save_dir.join(&record.cid);
    match tokio::fs::write(&path, &body).await {
        Ok(()) => tracing::info!("Saved {} ({} bytes)", path.display(), body.len()),
        Err(e) => tracing::warn!("Failed to write {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cidcrawler::sink::write_frame;

    // Frames arriving on a connection are decoded and handed to the record
    // handler; garbage frames are skipped without ending the loop.
    #[tokio::test]
    async fn reads_records_until_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let writer = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            write_frame(&mut stream, br#"{"cid":"QmAAA","type":"text/plain"}"#)
                .await
                .unwrap();
            write_frame(&mut stream, b"not json").await.unwrap();
            write_frame(&mut stream, br#"{"cid":"QmBBB","type":"json"}"#)
                .await
                .unwrap();
        });

        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, _write_half) = stream.into_split();
        let mut seen = Vec::new();
        read_records(read_half, |record| seen.push(record.cid)).await;

        writer.await.unwrap();
        assert_eq!(seen, vec!["QmAAA".to_string(), "QmBBB".to_string()]);
    }

    #[tokio::test]
    async fn fetch_and_save_writes_gateway_body_to_cid_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Minimal one-shot HTTP gateway.
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
                .await
                .unwrap();
        });

        let save_dir = tempfile::tempdir().unwrap();
        let record = WantedCid {
            cid: "QmAAA".to_string(),
            file_type: "text/plain".to_string(),
        };
        fetch_and_save(
            &reqwest::Client::new(),
            &format!("http://{}", addr),
            save_dir.path(),
            record,
        )
        .await;

        let saved = std::fs::read_to_string(save_dir.path().join("QmAAA")).unwrap();
        assert_eq!(saved, "hello");
    }
}
