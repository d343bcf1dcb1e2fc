//! Content-Network Protocol Module
//!
//! The seam between the crawler and the underlying content network. The
//! pipeline only ever talks to the [`Protocol`] trait: `stat` resolves the
//! type and size of a resource, `ls` streams directory entries into a bounded
//! channel (the consumer's buffer is the back-pressure boundary), and
//! `gateway_url` renders the HTTP gateway address handed to extractors.

pub mod ipfs;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{AnnotatedResource, ResourceType};

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The resource cannot be interpreted meaningfully; the pipeline records
    /// it in the invalids index rather than failing the crawl.
    #[error("invalid resource: {0}")]
    InvalidResource(String),
    #[error("protocol request failed: {0}")]
    Request(String),
}

/// A single entry of a directory listing. `kind` is `Undefined` when the
/// listing carried no type information (a hash-only entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsEntry {
    pub hash: String,
    pub name: String,
    pub size: u64,
    pub kind: ResourceType,
}

#[async_trait]
pub trait Protocol: Send + Sync {
    /// Resolve type and size of `r` in place.
    async fn stat(&self, r: &mut AnnotatedResource) -> Result<(), ProtocolError>;

    /// Stream the entries of directory `r` into `tx`. Returns once the
    /// listing is exhausted, the receiver is dropped, or an error occurs.
    async fn ls(
        &self,
        r: &AnnotatedResource,
        tx: mpsc::Sender<LsEntry>,
    ) -> Result<(), ProtocolError>;

    /// HTTP gateway URL serving the raw content of `r`.
    fn gateway_url(&self, r: &AnnotatedResource) -> String;
}
