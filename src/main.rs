use anyhow::Context;
use paysettle::dispatch::{spawn_dispatch_worker, ChannelEventSink, HttpEventSink, LogEventSink};
use paysettle::{api, config::Config, db::init_db, EventSink, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

/// Outbound events buffered before `emit` starts reporting `QueueFull`.
const DISPATCH_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("initializing database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let delivery: Arc<dyn EventSink> = match &config.dispatch_url {
        Some(url) => {
            tracing::info!(url = %url, "delivering outbound events over http");
            Arc::new(HttpEventSink::new(url.clone()))
        }
        None => {
            tracing::info!("DISPATCH_URL not set, outbound events are only logged");
            Arc::new(LogEventSink)
        }
    };
    let (queue, rx) = ChannelEventSink::new(DISPATCH_QUEUE_CAPACITY);
    let worker = spawn_dispatch_worker(rx, delivery);

    let app = api::create_router(api::AppState::new(repo, config, Arc::new(queue)));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    // The router held the last queue sender; the worker drains what is left.
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "dispatch worker ended abnormally");
    }
    Ok(())
}
