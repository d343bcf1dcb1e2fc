use std::sync::Arc;

use cidcrawler::config::Config;
use cidcrawler::crawler::Crawler;
use cidcrawler::extractor::nsfw::NsfwExtractor;
use cidcrawler::extractor::tika::TikaExtractor;
use cidcrawler::extractor::Extractor;
use cidcrawler::index::memory::MemoryIndex;
use cidcrawler::index::Indexes;
use cidcrawler::protocol::ipfs::IpfsProtocol;
use cidcrawler::protocol::Protocol;
use cidcrawler::queue::{
    spawn_connection_monitor, MemoryQueue, Queues, ReconnectPolicy,
};
use cidcrawler::sink::SinkClient;
use cidcrawler::types::AnnotatedResource;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env();
    tracing::info!(
        "Starting crawler against {} (gateway {})",
        config.ipfs_api_url,
        config.ipfs_gateway_url
    );

    // Both sinks must be reachable at startup; exhausting the dial retries is
    // fatal.
    let text_sink = SinkClient::connect("text", &config.sink.server_url).await?;
    let video_sink = SinkClient::connect("video", &config.sink.video_server_url).await?;

    let indexes = Indexes {
        files: Arc::new(MemoryIndex::new("files")),
        directories: Arc::new(MemoryIndex::new("directories")),
        invalids: Arc::new(MemoryIndex::new("invalids")),
        partials: Arc::new(MemoryIndex::new("partials")),
    };

    let (files_queue, files_rx) = MemoryQueue::channel("files", config.queue.buffer_size);
    let (directories_queue, directories_rx) =
        MemoryQueue::channel("directories", config.queue.buffer_size);
    let (hashes_queue, hashes_rx) = MemoryQueue::channel("hashes", config.queue.buffer_size);
    let queues = Queues {
        files: files_queue,
        directories: directories_queue,
        hashes: hashes_queue,
    };

    let protocol: Arc<dyn Protocol> = Arc::new(IpfsProtocol::new(
        config.ipfs_api_url.clone(),
        config.ipfs_gateway_url.clone(),
    ));
    let extractors: Vec<Arc<dyn Extractor>> = vec![
        Arc::new(TikaExtractor::new(
            config.extractor.clone(),
            Arc::clone(&protocol),
        )),
        Arc::new(NsfwExtractor::new(config.extractor.clone())),
    ];

    let crawler = Arc::new(Crawler::new(
        config.crawler.clone(),
        indexes,
        queues.clone(),
        protocol,
        extractors,
        text_sink,
        video_sink,
    ));

    // Fresh deployments can seed the hashes queue from the environment; in
    // production the sniffer feeds the queues.
    if let Ok(seeds) = std::env::var("SEED_HASHES") {
        for id in seeds.split(',').filter(|id| !id.trim().is_empty()) {
            queues
                .hashes
                .publish(&AnnotatedResource::unresolved(id.trim()))
                .await?;
        }
    }

    let token = CancellationToken::new();

    // The in-memory queues never lose a connection; a broker transport
    // reports its lifecycle events into this channel and the monitor turns an
    // exhausted reconnect budget into a fatal error below.
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<anyhow::Error>(1);
    let (_queue_events_tx, queue_events_rx) = mpsc::channel(1);
    spawn_connection_monitor(
        queue_events_rx,
        || async { Ok(()) },
        ReconnectPolicy {
            reconnect_time: config.queue.reconnect_time,
            max_reconnect: config.queue.max_reconnect,
        },
        fatal_tx,
    );

    let mut workers = Vec::new();
    for (name, rx) in [
        ("files", files_rx),
        ("directories", directories_rx),
        ("hashes", hashes_rx),
    ] {
        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..config.workers {
            workers.push(tokio::spawn(worker_loop(
                name,
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&crawler),
                token.clone(),
            )));
        }
    }
    tracing::info!("Started {} workers per queue", config.workers);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            token.cancel();
        }
        Some(fatal) = fatal_rx.recv() => {
            tracing::error!("Fatal: {}", fatal);
            token.cancel();
            return Err(fatal);
        }
    }

    for worker in workers {
        worker.abort();
    }
    Ok(())
}

async fn worker_loop(
    queue_name: &'static str,
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<AnnotatedResource>>>,
    crawler: Arc<Crawler>,
    token: CancellationToken,
) {
    loop {
        let resource = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = token.cancelled() => return,
                resource = rx.recv() => resource,
            }
        };
        let Some(resource) = resource else {
            return;
        };

        let id = resource.id.clone();
        if let Err(e) = crawler.crawl(&token, resource).await {
            tracing::warn!(
                "Worker {}/{} failed to crawl {}: {}",
                queue_name,
                worker_id,
                id,
                e
            );
        }
    }
}
