//! Content-Network Crawler Library
//!
//! This library crate defines the components of the crawler daemon and its
//! downstream collector tooling. It serves as the foundation for the binary
//! executables (`main.rs` and the sink servers under `src/bin/`).
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems:
//!
//! - **`crawler`**: The per-resource crawl pipeline. Decides whether a resource
//!   needs work, resolves its type, extracts metadata or walks directory
//!   listings, and dispatches the result to the correct index and sink.
//! - **`index`**: The index facade. A uniform `Index` trait over the category
//!   stores (files, directories, invalids, partials), a parallel `multi_get`
//!   across them, and an in-memory backend.
//! - **`protocol`**: The content-network seam. An abstract `Stat` + `Ls`
//!   provider plus the IPFS HTTP API adapter.
//! - **`extractor`**: Out-of-process metadata extraction. Adapters for the
//!   tika-style metadata server and the NSFW classifier.
//! - **`queue`**: The upstream work queues (files, directories, hashes) and the
//!   connection supervisor governing reconnect policy.
//! - **`sink`**: Length-prefixed TCP clients delivering selected CIDs to the
//!   downstream text and video collectors.

pub mod config;
pub mod crawler;
pub mod extractor;
pub mod index;
pub mod protocol;
pub mod queue;
pub mod sink;
pub mod types;
