//! feed-relay binary: loads the config, registers the configured subscribers
//! and runs the monitor until Ctrl-C.
//!
//! ```text
//! feed-relay [CONFIG]        (default: config.toml)
//! BOT_TOKEN=...              Telegram bot token (required)
//! OPENAI_API_KEY=...         required when [transformer] enabled = true
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use feed_relay::config::{Config, SeedSubscriber};
use feed_relay::delivery::{DeliveryChannel, TelegramChannel};
use feed_relay::logging;
use feed_relay::monitor::{Monitor, MonitorSettings};
use feed_relay::registry::{AddResult, FinalizeResult, Registry};
use feed_relay::source::{FeedSource, HttpFeedSource};
use feed_relay::transform::{OpenAiTransformer, Renderer};

#[tokio::main]
async fn main() -> Result<()> {
    // -- parse arguments -----------------------------------------------------
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)?;
    logging::init(&config.logging);
    info!(config = %config_path.display(), "starting feed-relay");

    // -- collaborators -------------------------------------------------------
    let engine = &config.engine;
    let source: Arc<dyn FeedSource> = Arc::new(
        HttpFeedSource::new(engine.fetch_timeout()).context("failed to build feed HTTP client")?,
    );

    let renderer = if config.transformer.enabled {
        let transformer = OpenAiTransformer::new(
            &config.transformer,
            Config::openai_api_key()?,
            engine.transform_timeout(),
        )
        .context("failed to build transformer HTTP client")?;
        Renderer::new(Arc::new(transformer), engine.transform_timeout())
    } else {
        info!("content transformer disabled; posts use the plain template");
        Renderer::plain()
    };

    let channel: Arc<dyn DeliveryChannel> = Arc::new(
        TelegramChannel::new(&config.telegram, Config::bot_token()?, engine.delivery_timeout())
            .context("failed to build Telegram HTTP client")?,
    );

    let registry = Arc::new(Registry::new(
        Arc::clone(&source),
        engine.quota_limit,
        engine.fetch_timeout(),
    ));

    // -- subscribers ---------------------------------------------------------
    seed_subscribers(&registry, &config.subscribers).await;

    // -- monitor -------------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = Monitor::new(
        registry,
        source,
        renderer,
        channel,
        MonitorSettings::from(engine),
    )
    .spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested; finishing the current cycle");
    let _ = shutdown_tx.send(true);
    monitor.await.context("monitor task failed")?;

    Ok(())
}

/// Register each configured subscriber the way the chat front end would:
/// start, add every source, finalize.  Rejected sources are logged and
/// skipped.
async fn seed_subscribers(registry: &Registry, seeds: &[SeedSubscriber]) {
    for seed in seeds {
        registry.start_subscriber(seed.id).await;

        for url in &seed.sources {
            match registry.add_source(seed.id, url).await {
                Ok(AddResult::Added { source_count, feed_title }) => info!(
                    subscriber = %seed.id,
                    source = %url,
                    title = feed_title.as_deref().unwrap_or("(untitled)"),
                    source_count,
                    "source registered"
                ),
                Ok(AddResult::AlreadyExists { .. }) => {
                    warn!(subscriber = %seed.id, source = %url, "duplicate source in config")
                }
                Err(e) => warn!(subscriber = %seed.id, source = %url, error = %e, "source rejected"),
            }
        }

        match registry.finalize(seed.id).await {
            FinalizeResult::Monitoring { sources } => {
                info!(subscriber = %seed.id, sources = sources.len(), "subscriber monitoring")
            }
            FinalizeResult::NoSources => {
                warn!(subscriber = %seed.id, "no usable sources; subscriber not monitored")
            }
        }
    }
}
