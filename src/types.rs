//! Core resource types shared across the crawler subsystems.

use serde::{Deserialize, Serialize};

/// Protocol tag of a resource. `Invalid` is a sentinel only; handing an
/// `Invalid` resource to the pipeline is a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Invalid,
    Ipfs,
}

/// Resolved (or not yet resolved) type of a resource.
///
/// Only `Undefined`, `File` and `Directory` may enter the pipeline; the
/// remaining variants result from type resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    Undefined,
    File,
    Directory,
    Unsupported,
    Partial,
}

/// Link from a child resource back to the parent it was discovered in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub parent: Box<AnnotatedResource>,
    pub name: String,
}

/// A content identifier annotated with everything the crawler knows about it.
///
/// `size` is only meaningful once `kind` is `File` or `Directory`.
/// `reference` is present exactly when the resource was discovered as the
/// child of another resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedResource {
    pub id: String,
    pub protocol: Protocol,
    pub kind: ResourceType,
    pub size: u64,
    pub reference: Option<Reference>,
}

impl AnnotatedResource {
    /// A resource known only by its identifier; type and size are resolved
    /// later by the pipeline.
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol: Protocol::Ipfs,
            kind: ResourceType::Undefined,
            size: 0,
            reference: None,
        }
    }

    /// Whether this resource may be handed to the crawl pipeline at all.
    pub fn is_crawlable(&self) -> bool {
        matches!(
            self.kind,
            ResourceType::Undefined | ResourceType::File | ResourceType::Directory
        )
    }
}

impl std::fmt::Display for AnnotatedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.id, self.kind)
    }
}
