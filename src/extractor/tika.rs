//! Adapter for the tika-style metadata extraction server.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ExtractError, Extractor};
use crate::config::ExtractorConfig;
use crate::index::types::{File, Language, Metadata};
use crate::protocol::Protocol;
use crate::types::AnnotatedResource;

pub struct TikaExtractor {
    config: ExtractorConfig,
    client: reqwest::Client,
    protocol: Arc<dyn Protocol>,
}

/// Response body of `GET /extract`. A single decode exposes both the indexed
/// document fields and the metadata the content-type gate reads.
#[derive(Debug, Deserialize)]
struct TikaResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    ipfs_tika_version: String,
    #[serde(default)]
    language: Language,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    urls: Vec<String>,
}

impl TikaExtractor {
    pub fn new(config: ExtractorConfig, protocol: Arc<dyn Protocol>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            protocol,
        }
    }
}

#[async_trait]
impl Extractor for TikaExtractor {
    async fn extract(&self, r: &AnnotatedResource, file: &mut File) -> Result<(), ExtractError> {
        if r.size > self.config.max_file_size {
            return Err(ExtractError::FileTooLarge(r.size));
        }

        let url = format!("{}/extract", self.config.tika_extractor_url);
        let gateway_url = self.protocol.gateway_url(r);
        let response = self
            .client
            .get(&url)
            .query(&[("url", gateway_url.as_str())])
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| ExtractError::Request(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ExtractError::UnexpectedResponse(format!(
                "unexpected status {}",
                status
            )));
        }

        let extracted: TikaResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::UnexpectedResponse(e.to_string()))?;

        tracing::debug!("Got metadata for '{}'", r);

        file.content = extracted.content;
        file.ipfs_tika_version = extracted.ipfs_tika_version;
        file.language = extracted.language;
        file.metadata = extracted.metadata;
        file.urls = extracted.urls;

        Ok(())
    }
}
