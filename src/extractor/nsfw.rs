//! Adapter for the NSFW classification server.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ExtractError, Extractor};
use crate::config::ExtractorConfig;
use crate::index::types::{File, Nsfw};
use crate::types::{AnnotatedResource, Protocol};

pub struct NsfwExtractor {
    config: ExtractorConfig,
    client: reqwest::Client,
}

/// The classifier returns the classification object bare; it is wrapped under
/// an `nsfw` key before decoding so it lands on the file document's field.
#[derive(Debug, Deserialize)]
struct NsfwEnvelope {
    nsfw: Nsfw,
}

impl NsfwExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Extractor for NsfwExtractor {
    async fn extract(&self, r: &AnnotatedResource, file: &mut File) -> Result<(), ExtractError> {
        if r.protocol != Protocol::Ipfs {
            // Single-protocol deployment; anything else is a programming error.
            panic!("unsupported protocol");
        }

        if r.size > self.config.max_file_size {
            return Err(ExtractError::FileTooLarge(r.size));
        }

        let url = format!("{}/classify/{}", self.config.nsfw_server_url, r.id);
        let response = self
            .client
            .get(&url)
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

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractError::UnexpectedResponse(e.to_string()))?;

        let envelope: NsfwEnvelope = serde_json::from_value(json!({ "nsfw": body }))
            .map_err(|e| ExtractError::UnexpectedResponse(e.to_string()))?;

        tracing::debug!("Got nsfw classification for '{}'", r);

        file.nsfw = envelope.nsfw;
        Ok(())
    }
}
