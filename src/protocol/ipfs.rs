//! IPFS node HTTP API adapter.
//!
//! Implements [`Protocol`] against the go-ipfs RPC API: `stat` through
//! `/api/v0/files/stat`, `ls` through the streaming `/api/v0/ls`. Responses
//! the node cannot decode into a valid DAG map to
//! [`ProtocolError::InvalidResource`].

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{LsEntry, Protocol, ProtocolError};
use crate::types::{AnnotatedResource, ResourceType};

/// Node error messages that mean the resource itself is broken, as opposed to
/// the node being unreachable.
const INVALID_MARKERS: &[&str] = &[
    "invalid",
    "proto:",
    "unexpected eof",
    "merkledag",
    "not a valid",
];

pub struct IpfsProtocol {
    api_url: String,
    gateway_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
    #[serde(rename = "Type", default)]
    entry_type: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "CumulativeSize", default)]
    cumulative_size: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Hash", default)]
    hash: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Type", default)]
    link_type: u8,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
struct LsOutput {
    #[serde(rename = "Objects", default)]
    objects: Vec<LsObject>,
}

impl IpfsProtocol {
    pub fn new(api_url: impl Into<String>, gateway_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            gateway_url: gateway_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> ProtocolError {
        let message = serde_json::from_str::<ApiError>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.to_string());
        let lowered = message.to_lowercase();
        if INVALID_MARKERS.iter().any(|m| lowered.contains(m)) {
            ProtocolError::InvalidResource(message)
        } else {
            ProtocolError::Request(format!("status {}: {}", status, message))
        }
    }

    fn entry_kind(link_type: u8) -> ResourceType {
        // unixfs link types: 1 directory, 2 file, 5 HAMT-sharded directory.
        match link_type {
            1 | 5 => ResourceType::Directory,
            2 => ResourceType::File,
            _ => ResourceType::Undefined,
        }
    }
}

#[async_trait]
impl Protocol for IpfsProtocol {
    async fn stat(&self, r: &mut AnnotatedResource) -> Result<(), ProtocolError> {
        let url = format!("{}/api/v0/files/stat", self.api_url);
        let arg = format!("/ipfs/{}", r.id);
        let response = self
            .client
            .post(&url)
            .query(&[("arg", arg.as_str())])
            .send()
            .await
            .map_err(|e| ProtocolError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body));
        }

        let stat: StatResponse = response
            .json()
            .await
            .map_err(|e| ProtocolError::Request(e.to_string()))?;

        match stat.entry_type.as_str() {
            "file" => {
                r.kind = ResourceType::File;
                r.size = stat.size;
            }
            "directory" => {
                r.kind = ResourceType::Directory;
                r.size = stat.cumulative_size;
            }
            other => {
                tracing::debug!("Unsupported object type '{}' for {}", other, r.id);
                r.kind = ResourceType::Unsupported;
                r.size = 0;
            }
        }
        Ok(())
    }

    async fn ls(
        &self,
        r: &AnnotatedResource,
        tx: mpsc::Sender<LsEntry>,
    ) -> Result<(), ProtocolError> {
        let url = format!("{}/api/v0/ls", self.api_url);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("arg", r.id.as_str()),
                ("resolve-type", "false"),
                ("size", "false"),
                ("stream", "true"),
            ])
            .send()
            .await
            .map_err(|e| ProtocolError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body));
        }

        // The stream variant emits one JSON object per line, each carrying a
        // single link.
        let mut buffer: Vec<u8> = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ProtocolError::Request(e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let output: LsOutput = serde_json::from_slice(&line)
                    .map_err(|e| ProtocolError::Request(format!("undecodable ls line: {}", e)))?;
                for object in output.objects {
                    for link in object.links {
                        let entry = LsEntry {
                            hash: link.hash,
                            name: link.name,
                            size: link.size,
                            kind: Self::entry_kind(link.link_type),
                        };
                        if tx.send(entry).await.is_err() {
                            // Consumer stopped listening; the walk was capped
                            // or cancelled.
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn gateway_url(&self, r: &AnnotatedResource) -> String {
        format!("{}/ipfs/{}", self.gateway_url, r.id)
    }
}
