//! Index Facade Module
//!
//! A uniform interface over the category indices the crawler writes to.
//!
//! ## Core Concepts
//! - **Categories**: every crawled resource ends up in exactly one of the
//!   `files`, `directories`, `invalids` or `partials` stores; presence in more
//!   than one is an anomaly that `multi_get` surfaces.
//! - **Upsert semantics**: `Index::index` merges `references` by
//!   `(parent_hash, name)` and refreshes `last-seen` when a document already
//!   exists; `Index::update` overlays only the supplied fields.
//! - **Projection**: `Index::get` returns only the requested fields, which is
//!   what keeps the existence check cheap.

pub mod memory;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index backend error: {0}")]
    Backend(String),
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A single category index holding JSON documents keyed by resource id.
#[async_trait]
pub trait Index: Send + Sync {
    fn name(&self) -> &str;

    /// Upsert `doc` under `id`. On conflict the backend merges `references`
    /// (set-union by `(parent_hash, name)`), keeps the stored `first-seen`
    /// and takes `last-seen` from `doc`.
    async fn index(&self, id: &str, doc: Value) -> Result<(), IndexError>;

    /// Partial update: overlay exactly the fields present in `doc` onto the
    /// stored document.
    async fn update(&self, id: &str, doc: Value) -> Result<(), IndexError>;

    /// Fetch the projection of the stored document onto `fields`; an empty
    /// field list returns the whole document. `None` means the key is absent.
    async fn get(&self, id: &str, fields: &[&str]) -> Result<Option<Value>, IndexError>;
}

/// The fixed set of category indices used by the crawl pipeline.
#[derive(Clone)]
pub struct Indexes {
    pub files: Arc<dyn Index>,
    pub directories: Arc<dyn Index>,
    pub invalids: Arc<dyn Index>,
    pub partials: Arc<dyn Index>,
}

impl Indexes {
    pub fn all(&self) -> Vec<Arc<dyn Index>> {
        vec![
            Arc::clone(&self.files),
            Arc::clone(&self.directories),
            Arc::clone(&self.invalids),
            Arc::clone(&self.partials),
        ]
    }
}

/// Probe every index for `id` in parallel.
///
/// Returns the index the document was found in together with the projected
/// document. Finding the id in more than one index logs an anomaly and
/// returns one of the hits. Probe errors are logged and ignored as long as at
/// least one probe produced a conclusive answer; only when every probe fails
/// is an error returned.
pub async fn multi_get(
    indexes: &[Arc<dyn Index>],
    id: &str,
    fields: &[&str],
) -> Result<Option<(Arc<dyn Index>, Value)>, IndexError> {
    let probes = indexes.iter().map(|index| {
        let index = Arc::clone(index);
        let id = id.to_string();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        async move {
            let field_refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            let result = index.get(&id, &field_refs).await;
            (index, result)
        }
    });

    let mut hits: Vec<(Arc<dyn Index>, Value)> = Vec::new();
    let mut errors: Vec<(String, IndexError)> = Vec::new();

    for (index, result) in join_all(probes).await {
        match result {
            Ok(Some(doc)) => hits.push((index, doc)),
            Ok(None) => {}
            Err(e) => errors.push((index.name().to_string(), e)),
        }
    }

    if hits.is_empty() && errors.len() == indexes.len() && !errors.is_empty() {
        let (name, err) = errors.remove(0);
        return Err(IndexError::Backend(format!("all probes failed; {}: {}", name, err)));
    }

    for (name, err) in &errors {
        tracing::warn!("Index probe against '{}' failed: {}", name, err);
    }

    if hits.len() > 1 {
        let names: Vec<&str> = hits.iter().map(|(index, _)| index.name()).collect();
        tracing::warn!("Resource {} found in multiple indexes: {:?}", id, names);
    }

    Ok(hits.into_iter().next())
}
