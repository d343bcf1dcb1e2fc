//! Metadata Extraction Module
//!
//! Abstracts the out-of-process extractor backends behind the [`Extractor`]
//! trait. Two adapters exist: the tika-style metadata server (`tika`) and the
//! NSFW classifier (`nsfw`). Both enforce the file size cap before issuing a
//! request and never retry internally; the per-request deadline comes from
//! [`crate::config::ExtractorConfig`].

pub mod nsfw;
pub mod tika;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use thiserror::Error;

use crate::index::types::File;
use crate::types::AnnotatedResource;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The resource exceeds the configured size cap; the pipeline folds this
    /// into an invalid-resource record.
    #[error("file too large: {0}")]
    FileTooLarge(u64),
    /// Transport-level failure against the extractor backend.
    #[error("extractor request failed: {0}")]
    Request(String),
    /// Protocol-level failure: non-200 status or undecodable body.
    #[error("unexpected extractor response: {0}")]
    UnexpectedResponse(String),
}

/// Extract metadata for `r`, populating the in-flight file document.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, r: &AnnotatedResource, file: &mut File) -> Result<(), ExtractError>;
}
