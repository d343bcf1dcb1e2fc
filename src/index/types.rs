//! Document types stored in the category indices.
//!
//! Field names follow the index mapping of the original deployment
//! (`first-seen`/`last-seen` dates at second precision, `references` with
//! `parent_hash`, the `nsfwjsVersion` key of the classifier).

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Arbitrary JSON metadata attached to a file by the extractor.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The current time truncated to second precision, as stored in documents.
pub fn now_truncated() -> DateTime<Utc> {
    Utc::now().with_nanosecond(0).unwrap()
}

/// Link from an indexed document to a parent directory it is referenced by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub parent_hash: String,
    pub name: String,
}

/// Common header of all indexed entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "first-seen")]
    pub first_seen: DateTime<Utc>,
    #[serde(rename = "last-seen")]
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub references: Vec<Reference>,
    pub size: u64,
}

/// Language detection result for a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Language {
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, rename = "rawScore")]
    pub raw_score: f64,
}

/// Class scores returned by the NSFW classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NsfwClassification {
    #[serde(default)]
    pub neutral: f64,
    #[serde(default)]
    pub drawing: f64,
    #[serde(default)]
    pub porn: f64,
    #[serde(default)]
    pub hentai: f64,
    #[serde(default)]
    pub sexy: f64,
}

/// NSFW classifier output together with the classifier version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nsfw {
    #[serde(default)]
    pub classification: NsfwClassification,
    #[serde(default, rename = "nsfwjsVersion")]
    pub nsfw_version: String,
}

/// A file resource in the files index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    #[serde(flatten)]
    pub document: Document,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub ipfs_tika_version: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub nsfw: Nsfw,
}

impl File {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            content: String::new(),
            ipfs_tika_version: String::new(),
            language: Language::default(),
            metadata: Metadata::new(),
            urls: Vec::new(),
            nsfw: Nsfw::default(),
        }
    }
}

/// Type of a single directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    File,
    Directory,
    Unknown,
}

/// A single entry of an indexed directory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    #[serde(rename = "Hash")]
    pub hash: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "Type")]
    pub entry_type: EntryType,
}

/// A directory resource in the directories index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(flatten)]
    pub document: Document,
    #[serde(default)]
    pub links: Vec<DirEntry>,
}

impl Directory {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            links: Vec::new(),
        }
    }
}

/// A resource that could not be interpreted meaningfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invalid {
    pub error: String,
}

/// Marker for a resource recognised as incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partial {}
