//! Bounded directory walker.
//!
//! Consumes the protocol's lazy entry stream through a bounded channel (a
//! full buffer blocks the listing, which is the back-pressure boundary),
//! enforces a timeout between consecutive entries, stops cleanly at the
//! directory size cap, and republishes every accepted child to the upstream
//! queue matching its type. Children are never crawled recursively here; they
//! re-enter the pipeline through the queues.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::CrawlError;
use crate::config::CrawlerConfig;
use crate::index::types::{DirEntry, Directory, EntryType};
use crate::protocol::Protocol as ProtocolClient;
use crate::queue::Queues;
use crate::sink::{SinkClient, WantedCid};
use crate::types::{AnnotatedResource, Reference, ResourceType};

pub(crate) async fn walk_directory(
    protocol: &Arc<dyn ProtocolClient>,
    queues: &Queues,
    video_sink: &SinkClient,
    config: &CrawlerConfig,
    token: &CancellationToken,
    r: &AnnotatedResource,
    dir: &mut Directory,
) -> Result<(), CrawlError> {
    let (tx, mut rx) = mpsc::channel(config.dir_entry_buffer_size);
    let ls_task = {
        let protocol = Arc::clone(protocol);
        let resource = r.clone();
        tokio::spawn(async move { protocol.ls(&resource, tx).await })
    };

    loop {
        if dir.links.len() >= config.max_dir_size {
            // Hitting the cap is normal policy, not an error; the truncated
            // entry set is what gets indexed.
            tracing::debug!(
                "Directory {} truncated at {} entries",
                r.id,
                dir.links.len()
            );
            ls_task.abort();
            return Ok(());
        }

        let next = tokio::select! {
            _ = token.cancelled() => {
                ls_task.abort();
                return Err(CrawlError::Cancelled);
            }
            next = timeout(config.dir_entry_timeout, rx.recv()) => next,
        };
        let entry = match next {
            Err(_) => {
                ls_task.abort();
                return Err(CrawlError::DirEntryTimeout);
            }
            Ok(None) => break,
            Ok(Some(entry)) => entry,
        };

        if entry.hash.is_empty() || entry.name.is_empty() {
            tracing::warn!("Skipping malformed entry {:?} in {}", entry, r.id);
            continue;
        }

        dir.links.push(DirEntry {
            hash: entry.hash.clone(),
            name: entry.name.clone(),
            size: entry.size,
            entry_type: entry_type_of(entry.kind),
        });

        let child = AnnotatedResource {
            id: entry.hash.clone(),
            protocol: r.protocol,
            kind: entry.kind,
            size: entry.size,
            reference: Some(Reference {
                parent: Box::new(r.clone()),
                name: entry.name.clone(),
            }),
        };
        let queue = match entry.kind {
            ResourceType::File => &queues.files,
            ResourceType::Directory => &queues.directories,
            _ => &queues.hashes,
        };
        if let Err(e) = queue.publish(&child).await {
            ls_task.abort();
            return Err(e.into());
        }

        if let Some(extension) = video_extension(&entry.name, &config.video_extensions) {
            tracing::debug!(
                "Forwarding video entry {} ({}) to video sink",
                entry.hash,
                entry.name
            );
            video_sink
                .send(WantedCid {
                    cid: entry.hash,
                    file_type: extension,
                })
                .await;
        }
    }

    // The listing ended on its own; surface whatever the producer returned.
    match ls_task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(CrawlError::Protocol(crate::protocol::ProtocolError::Request(
            format!("listing task failed: {}", e),
        ))),
    }
}

fn entry_type_of(kind: ResourceType) -> EntryType {
    match kind {
        ResourceType::File => EntryType::File,
        ResourceType::Directory => EntryType::Directory,
        _ => EntryType::Unknown,
    }
}

fn video_extension(name: &str, extensions: &[String]) -> Option<String> {
    let lowered = name.to_lowercase();
    extensions
        .iter()
        .find(|ext| lowered.ends_with(&ext.to_lowercase()))
        .cloned()
}
