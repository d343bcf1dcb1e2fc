//! Extractor Adapter Tests
//!
//! Each test stands up a one-shot HTTP responder and checks the adapter's
//! error mapping and decoding against it; the size gate is verified to fire
//! before any connection is attempted.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use crate::config::ExtractorConfig;
    use crate::extractor::nsfw::NsfwExtractor;
    use crate::extractor::tika::TikaExtractor;
    use crate::extractor::{ExtractError, Extractor};
    use crate::index::types::{now_truncated, Document, File};
    use crate::protocol::{LsEntry, Protocol, ProtocolError};
    use crate::types::{AnnotatedResource, Protocol as ProtocolTag, ResourceType};

    /// Protocol double used only for gateway URL rendering.
    struct GatewayOnly;

    #[async_trait]
    impl Protocol for GatewayOnly {
        async fn stat(&self, _r: &mut AnnotatedResource) -> Result<(), ProtocolError> {
            panic!("stat is not used by extractors");
        }

        async fn ls(
            &self,
            _r: &AnnotatedResource,
            _tx: mpsc::Sender<LsEntry>,
        ) -> Result<(), ProtocolError> {
            panic!("ls is not used by extractors");
        }

        fn gateway_url(&self, r: &AnnotatedResource) -> String {
            format!("http://gateway.test/ipfs/{}", r.id)
        }
    }

    /// Serve a single canned HTTP response, then close.
    async fn serve_once(status: &'static str, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = stream.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    /// An address nothing listens on.
    async fn dead_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    fn file_resource(id: &str, size: u64) -> AnnotatedResource {
        AnnotatedResource {
            id: id.to_string(),
            protocol: ProtocolTag::Ipfs,
            kind: ResourceType::File,
            size,
            reference: None,
        }
    }

    fn empty_file() -> File {
        let now = now_truncated();
        File::new(Document {
            first_seen: now,
            last_seen: now,
            references: Vec::new(),
            size: 0,
        })
    }

    fn config(base_url: String) -> ExtractorConfig {
        ExtractorConfig {
            tika_extractor_url: base_url.clone(),
            nsfw_server_url: base_url,
            max_file_size: 1024 * 1024,
            request_timeout: Duration::from_secs(5),
        }
    }

    // ============================================================
    // TIKA
    // ============================================================

    #[tokio::test]
    async fn tika_decodes_document_fields_and_metadata_in_one_pass() {
        let addr = serve_once(
            "200 OK",
            r#"{
                "content": "hello world",
                "ipfs_tika_version": "1.9.8",
                "language": {"confidence": "HIGH", "language": "en", "rawScore": 0.99},
                "metadata": {"Content-Type": ["text/plain; charset=utf-8"]},
                "urls": ["http://example.com/a"]
            }"#,
        )
        .await;
        let extractor = TikaExtractor::new(config(format!("http://{}", addr)), Arc::new(GatewayOnly));
        let mut file = empty_file();

        extractor
            .extract(&file_resource("QmAAA", 400), &mut file)
            .await
            .unwrap();

        assert_eq!(file.content, "hello world");
        assert_eq!(file.ipfs_tika_version, "1.9.8");
        assert_eq!(file.language.language, "en");
        assert_eq!(file.urls, vec!["http://example.com/a"]);
        let content_type = file.metadata["Content-Type"].as_array().unwrap();
        assert_eq!(content_type[0], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn tika_size_gate_fires_before_any_request() {
        // Nothing listens here; reaching the network would fail differently.
        let addr = dead_addr().await;
        let mut cfg = config(format!("http://{}", addr));
        cfg.max_file_size = 1_000_000;
        let extractor = TikaExtractor::new(cfg, Arc::new(GatewayOnly));
        let mut file = empty_file();

        let err = extractor
            .extract(&file_resource("QmAAA", 1_000_000_000), &mut file)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::FileTooLarge(1_000_000_000)));
        assert_eq!(err.to_string(), "file too large: 1000000000");
    }

    #[tokio::test]
    async fn tika_maps_non_200_to_unexpected_response() {
        let addr = serve_once("500 Internal Server Error", "{}").await;
        let extractor = TikaExtractor::new(config(format!("http://{}", addr)), Arc::new(GatewayOnly));
        let mut file = empty_file();

        let err = extractor
            .extract(&file_resource("QmAAA", 400), &mut file)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn tika_maps_undecodable_body_to_unexpected_response() {
        let addr = serve_once("200 OK", "not json at all").await;
        let extractor = TikaExtractor::new(config(format!("http://{}", addr)), Arc::new(GatewayOnly));
        let mut file = empty_file();

        let err = extractor
            .extract(&file_resource("QmAAA", 400), &mut file)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn tika_maps_transport_failure_to_request_error() {
        let addr = dead_addr().await;
        let extractor = TikaExtractor::new(config(format!("http://{}", addr)), Arc::new(GatewayOnly));
        let mut file = empty_file();

        let err = extractor
            .extract(&file_resource("QmAAA", 400), &mut file)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Request(_)));
    }

    // ============================================================
    // NSFW
    // ============================================================

    #[tokio::test]
    async fn nsfw_wraps_bare_classification_into_the_file_document() {
        let addr = serve_once(
            "200 OK",
            r#"{
                "classification": {
                    "neutral": 0.9,
                    "drawing": 0.05,
                    "porn": 0.02,
                    "hentai": 0.01,
                    "sexy": 0.02
                },
                "nsfwjsVersion": "2.4.1"
            }"#,
        )
        .await;
        let extractor = NsfwExtractor::new(config(format!("http://{}", addr)));
        let mut file = empty_file();

        extractor
            .extract(&file_resource("QmAAA", 400), &mut file)
            .await
            .unwrap();

        assert_eq!(file.nsfw.nsfw_version, "2.4.1");
        assert_eq!(file.nsfw.classification.neutral, 0.9);
        assert_eq!(file.nsfw.classification.drawing, 0.05);
        assert_eq!(file.nsfw.classification.porn, 0.02);
        assert_eq!(file.nsfw.classification.hentai, 0.01);
        assert_eq!(file.nsfw.classification.sexy, 0.02);
    }

    #[tokio::test]
    async fn nsfw_size_gate_fires_before_any_request() {
        let addr = dead_addr().await;
        let mut cfg = config(format!("http://{}", addr));
        cfg.max_file_size = 100;
        let extractor = NsfwExtractor::new(cfg);
        let mut file = empty_file();

        let err = extractor
            .extract(&file_resource("QmAAA", 4000), &mut file)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::FileTooLarge(4000)));
    }
}
