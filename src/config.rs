//! Environment-driven configuration.
//!
//! Every option of the crawler is an environment variable with a default
//! matching the deployed system; sub-configs are cloned into the components
//! that need them.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Bound of the directory listing channel.
    pub dir_entry_buffer_size: usize,
    /// Minimum age before an already-indexed resource is re-crawled.
    pub min_update_age: Duration,
    /// Deadline for type resolution.
    pub stat_timeout: Duration,
    /// Maximum gap between two consecutive directory entries.
    pub dir_entry_timeout: Duration,
    /// Cap on entries per directory; the walk stops cleanly at the cap.
    pub max_dir_size: usize,
    /// Content-Type substrings routed to the video sink.
    pub video_mime_markers: Vec<String>,
    /// Directory entry name extensions routed to the video sink.
    pub video_extensions: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            dir_entry_buffer_size: 8192,
            min_update_age: Duration::from_secs(3600),
            stat_timeout: Duration::from_secs(60),
            dir_entry_timeout: Duration::from_secs(60),
            max_dir_size: 32768,
            video_mime_markers: vec!["video".to_string()],
            video_extensions: [".mp4", ".mkv", ".avi", ".mov", ".webm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub tika_extractor_url: String,
    pub nsfw_server_url: String,
    /// Files larger than this are rejected before any request is issued.
    pub max_file_size: u64,
    pub request_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            tika_extractor_url: "http://localhost:8081".to_string(),
            nsfw_server_url: "http://localhost:3000".to_string(),
            max_file_size: 4 * 1024 * 1024 * 1024,
            request_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Text-sink TCP endpoint.
    pub server_url: String,
    /// Video-sink TCP endpoint.
    pub video_server_url: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            server_url: "127.0.0.1:9999".to_string(),
            video_server_url: "127.0.0.1:10000".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Backoff between reconnect attempts of the upstream queue connection.
    pub reconnect_time: Duration,
    /// Reconnect budget; exhaustion is fatal for the process.
    pub max_reconnect: u32,
    /// Bound of the in-process work queues.
    pub buffer_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reconnect_time: Duration::from_secs(2),
            max_reconnect: 100,
            buffer_size: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ipfs_api_url: String,
    pub ipfs_gateway_url: String,
    pub workers: usize,
    pub crawler: CrawlerConfig,
    pub extractor: ExtractorConfig,
    pub sink: SinkConfig,
    pub queue: QueueConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ipfs_api_url: "http://127.0.0.1:5001".to_string(),
            ipfs_gateway_url: "http://127.0.0.1:8080".to_string(),
            workers: 4,
            crawler: CrawlerConfig::default(),
            extractor: ExtractorConfig::default(),
            sink: SinkConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_list(name: &str, default: Vec<String>) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            ipfs_api_url: env_string("IPFS_API_URL", &defaults.ipfs_api_url),
            ipfs_gateway_url: env_string("IPFS_GATEWAY_URL", &defaults.ipfs_gateway_url),
            workers: env_parse("WORKERS", defaults.workers),
            crawler: CrawlerConfig {
                dir_entry_buffer_size: env_parse(
                    "DIRENTRY_BUFFER_SIZE",
                    defaults.crawler.dir_entry_buffer_size,
                ),
                min_update_age: env_duration_secs("MIN_UPDATE_AGE", defaults.crawler.min_update_age),
                stat_timeout: env_duration_secs("STAT_TIMEOUT", defaults.crawler.stat_timeout),
                dir_entry_timeout: env_duration_secs(
                    "DIRENTRY_TIMEOUT",
                    defaults.crawler.dir_entry_timeout,
                ),
                max_dir_size: env_parse("MAX_DIRSIZE", defaults.crawler.max_dir_size),
                video_mime_markers: env_list(
                    "VIDEO_MIME_MARKERS",
                    defaults.crawler.video_mime_markers,
                ),
                video_extensions: env_list("VIDEO_EXTENSIONS", defaults.crawler.video_extensions),
            },
            extractor: ExtractorConfig {
                tika_extractor_url: env_string(
                    "TIKA_EXTRACTOR_URL",
                    &defaults.extractor.tika_extractor_url,
                ),
                nsfw_server_url: env_string("NSFW_SERVER_URL", &defaults.extractor.nsfw_server_url),
                max_file_size: env_parse("MAX_FILE_SIZE", defaults.extractor.max_file_size),
                request_timeout: env_duration_secs(
                    "REQUEST_TIMEOUT",
                    defaults.extractor.request_timeout,
                ),
            },
            sink: SinkConfig {
                server_url: env_string("SERVER_URL", &defaults.sink.server_url),
                video_server_url: env_string("VIDEO_SERVER_URL", &defaults.sink.video_server_url),
            },
            queue: QueueConfig {
                reconnect_time: env_duration_secs("RECONNECT_TIME", defaults.queue.reconnect_time),
                max_reconnect: env_parse("MAX_RECONNECT", defaults.queue.max_reconnect),
                buffer_size: env_parse("QUEUE_BUFFER_SIZE", defaults.queue.buffer_size),
            },
        }
    }
}
