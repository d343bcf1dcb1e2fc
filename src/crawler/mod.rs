//! Crawl Pipeline Module
//!
//! Orchestrates the per-resource state machine: an existence check against
//! all category indices, type resolution through the protocol client, and a
//! dispatch on the resolved type — files are extracted and indexed (with
//! selected MIME types forwarded to the collector sinks), directories are
//! walked with their children republished to the upstream queues, partials
//! are recorded as markers, and anything that cannot be interpreted lands in
//! the invalids index.
//!
//! ## Contract
//! `crawl` calls for different resources are independent and safe to run in
//! parallel. Handing the pipeline a resource with the `Invalid` protocol
//! sentinel or a type other than `Undefined`/`File`/`Directory` is a
//! programming error and panics. Every stage that performs external I/O runs
//! under its own deadline and honours the cancellation token.

pub(crate) mod walker;


use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::CrawlerConfig;
use crate::extractor::{ExtractError, Extractor};
use crate::index::types::{
    now_truncated, Directory, Document, File, Invalid, Partial, Reference,
};
use crate::index::{multi_get, Index, IndexError, Indexes};
use crate::protocol::{Protocol as ProtocolClient, ProtocolError};
use crate::queue::{QueueError, Queues};
use crate::sink::{SinkClient, WantedCid};
use crate::types::{AnnotatedResource, Protocol, ResourceType};

/// Content-Type substrings routed to the text sink.
const TEXT_MIME_MARKERS: &[&str] = &["text/plain", "json", "html"];

/// Field projection used by the existence check.
const EXISTENCE_FIELDS: &[&str] = &["references", "last-seen"];

#[derive(Debug, Error)]
pub enum CrawlError {
    /// The resource type is recognised but not handled; the queue worker
    /// decides what to do with it.
    #[error("unsupported resource type")]
    UnsupportedType,
    #[error("crawl cancelled")]
    Cancelled,
    #[error("type resolution timed out")]
    StatTimeout,
    #[error("timed out waiting for next directory entry")]
    DirEntryTimeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Projection of an already-indexed document, as returned by the existence
/// check.
#[derive(Debug, Deserialize)]
struct ExistingDoc {
    #[serde(default)]
    references: Vec<Reference>,
    #[serde(default, rename = "last-seen")]
    last_seen: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct Crawler {
    config: CrawlerConfig,
    indexes: Indexes,
    queues: Queues,
    protocol: Arc<dyn ProtocolClient>,
    extractors: Vec<Arc<dyn Extractor>>,
    text_sink: SinkClient,
    video_sink: SinkClient,
}

impl Crawler {
    pub fn new(
        config: CrawlerConfig,
        indexes: Indexes,
        queues: Queues,
        protocol: Arc<dyn ProtocolClient>,
        extractors: Vec<Arc<dyn Extractor>>,
        text_sink: SinkClient,
        video_sink: SinkClient,
    ) -> Self {
        Self {
            config,
            indexes,
            queues,
            protocol,
            extractors,
            text_sink,
            video_sink,
        }
    }

    /// Update an existing or crawl a new resource, extracting metadata where
    /// applicable.
    pub async fn crawl(
        &self,
        token: &CancellationToken,
        mut r: AnnotatedResource,
    ) -> Result<(), CrawlError> {
        if r.protocol == Protocol::Invalid {
            // Sending items with an invalid protocol to crawl() should never
            // happen.
            panic!("invalid protocol for crawl");
        }
        if !r.is_crawlable() {
            panic!("invalid type for crawler: {:?}", r.kind);
        }

        if self.update_maybe_existing(&r).await? {
            tracing::debug!("Not updating existing resource {}", r);
            return Ok(());
        }

        if let Err(e) = self.ensure_type(token, &mut r).await {
            if let CrawlError::Protocol(ProtocolError::InvalidResource(_)) = &e {
                tracing::debug!("Indexing invalid resource {}: {}", r, e);
                return self.index_invalid(&r, e.to_string()).await;
            }
            return Err(e);
        }

        tracing::debug!("Indexing new item {}", r);
        self.index_resource(token, &mut r).await
    }

    /// Check whether `r` is already indexed and fresh. A fresh hit merges the
    /// incoming reference into the stored document (touching only
    /// `references` and `last-seen`) and ends the crawl; a stale or absent
    /// one lets the full pipeline run.
    async fn update_maybe_existing(&self, r: &AnnotatedResource) -> Result<bool, CrawlError> {
        let hit = multi_get(&self.indexes.all(), &r.id, EXISTENCE_FIELDS).await?;
        let Some((index, doc)) = hit else {
            return Ok(false);
        };

        let existing: ExistingDoc = serde_json::from_value(doc).map_err(IndexError::from)?;
        let now = now_truncated();
        let min_update_age = chrono::Duration::seconds(self.config.min_update_age.as_secs() as i64);

        // Documents without a last-seen date (invalids, partials) count as
        // stale and get re-crawled.
        let fresh = existing
            .last_seen
            .map(|seen| now.signed_duration_since(seen) < min_update_age)
            .unwrap_or(false);
        if !fresh {
            return Ok(false);
        }

        self.merge_reference(index, r, existing.references, now)
            .await?;
        Ok(true)
    }

    async fn merge_reference(
        &self,
        index: Arc<dyn Index>,
        r: &AnnotatedResource,
        mut references: Vec<Reference>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CrawlError> {
        if let Some(reference) = &r.reference {
            let candidate = Reference {
                parent_hash: reference.parent.id.clone(),
                name: reference.name.clone(),
            };
            if !references.contains(&candidate) {
                references.push(candidate);
            }
        }

        let update = serde_json::json!({
            "references": references,
            "last-seen": now,
        });
        index.update(&r.id, update).await?;
        Ok(())
    }

    /// Resolve the type of `r` in place when it is not yet known.
    async fn ensure_type(
        &self,
        token: &CancellationToken,
        r: &mut AnnotatedResource,
    ) -> Result<(), CrawlError> {
        if r.kind != ResourceType::Undefined {
            return Ok(());
        }

        let stat = tokio::select! {
            _ = token.cancelled() => return Err(CrawlError::Cancelled),
            stat = tokio::time::timeout(self.config.stat_timeout, self.protocol.stat(r)) => stat,
        };
        match stat {
            Err(_) => Err(CrawlError::StatTimeout),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Dispatch on the resolved type and write the resulting document.
    async fn index_resource(
        &self,
        token: &CancellationToken,
        r: &mut AnnotatedResource,
    ) -> Result<(), CrawlError> {
        match r.kind {
            ResourceType::File => self.index_file(r).await,
            ResourceType::Directory => self.index_directory(token, r).await,
            ResourceType::Unsupported => Err(CrawlError::UnsupportedType),
            ResourceType::Partial => {
                let doc = serde_json::to_value(Partial {}).map_err(IndexError::from)?;
                self.indexes.partials.index(&r.id, doc).await?;
                Ok(())
            }
            ResourceType::Undefined => panic!("undefined type after stat call"),
        }
    }

    async fn index_file(&self, r: &AnnotatedResource) -> Result<(), CrawlError> {
        let mut file = File::new(self.make_document(r));

        for extractor in &self.extractors {
            match extractor.extract(r, &mut file).await {
                Ok(()) => {}
                Err(e @ ExtractError::FileTooLarge(_)) => {
                    // Files which are too large become invalid resources;
                    // this prevents repeated extraction attempts.
                    tracing::debug!("Indexing invalid '{}', err: {}", r, e);
                    return self.index_invalid(r, e.to_string()).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let doc = serde_json::to_value(&file).map_err(IndexError::from)?;
        self.indexes.files.index(&r.id, doc).await?;

        self.dispatch_file_sinks(r, &file).await;
        Ok(())
    }

    async fn index_directory(
        &self,
        token: &CancellationToken,
        r: &AnnotatedResource,
    ) -> Result<(), CrawlError> {
        let mut dir = Directory::new(self.make_document(r));

        let walked = walker::walk_directory(
            &self.protocol,
            &self.queues,
            &self.video_sink,
            &self.config,
            token,
            r,
            &mut dir,
        )
        .await;
        match walked {
            Ok(()) => {}
            Err(CrawlError::Protocol(e @ ProtocolError::InvalidResource(_))) => {
                tracing::debug!("Indexing invalid '{}', err: {}", r, e);
                return self.index_invalid(r, e.to_string()).await;
            }
            Err(e) => return Err(e),
        }

        let doc = serde_json::to_value(&dir).map_err(IndexError::from)?;
        self.indexes.directories.index(&r.id, doc).await?;
        Ok(())
    }

    /// Forward the crawled file to the collector sinks its content type
    /// selects. Sink failures are logged inside the client and never fail the
    /// crawl.
    async fn dispatch_file_sinks(&self, r: &AnnotatedResource, file: &File) {
        let Some(content_type) = first_content_type(file) else {
            return;
        };
        let record = WantedCid {
            cid: r.id.clone(),
            file_type: content_type.to_string(),
        };

        if TEXT_MIME_MARKERS.iter().any(|m| content_type.contains(m)) {
            tracing::debug!("Forwarding {} ({}) to text sink", r.id, content_type);
            self.text_sink.send(record.clone()).await;
        }
        if self
            .config
            .video_mime_markers
            .iter()
            .any(|m| content_type.contains(m))
        {
            tracing::debug!("Forwarding {} ({}) to video sink", r.id, content_type);
            self.video_sink.send(record).await;
        }
    }

    async fn index_invalid(&self, r: &AnnotatedResource, error: String) -> Result<(), CrawlError> {
        let doc = serde_json::to_value(Invalid { error }).map_err(IndexError::from)?;
        self.indexes.invalids.index(&r.id, doc).await?;
        Ok(())
    }

    fn make_document(&self, r: &AnnotatedResource) -> Document {
        let now = now_truncated();
        let references = r
            .reference
            .as_ref()
            .map(|reference| {
                vec![Reference {
                    parent_hash: reference.parent.id.clone(),
                    name: reference.name.clone(),
                }]
            })
            .unwrap_or_default();

        Document {
            first_seen: now,
            last_seen: now,
            references,
            size: r.size,
        }
    }
}

/// First `Content-Type` value of the extracted metadata, defensively typed:
/// the gate only fires for a non-empty array of strings.
fn first_content_type(file: &File) -> Option<&str> {
    file.metadata.get("Content-Type")?.as_array()?.first()?.as_str()
}
