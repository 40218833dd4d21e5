//! Sentinel binary entrypoint: config load, schema init, component wiring,
//! and graceful shutdown. Grounded on `wkmp-ap/src/main.rs`'s overall shape
//! (tracing init, pool, component construction, spawn API server, wait,
//! shutdown), generalized from a single playback engine to Sentinel's
//! judge/device/orchestrator trio.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel::api::{self, AppContext};
use sentinel::device::unavailable::{UnavailableControlChannelFactory, UnavailablePairer};
use sentinel::device::DeviceRegistry;
use sentinel::judge::client::GeminiClient;
use sentinel::judge::Judge;
use sentinel::lists::{ListKind, ListStore};
use sentinel::metadata::MetadataFetcher;
use sentinel::mqtt::MqttBridge;
use sentinel::orchestrator::{EventProcessor, Supervisor};
use sentinel::sponsorblock::SponsorBlockService;
use sentinel::webhook::WebhookClient;
use sentinel_common::config::{Args, Config};
use sentinel_common::db::init::init_database;
use sentinel_common::events::EventBus;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_file(true).with_line_number(true))
        .init();

    info!("Starting Sentinel content-control supervisor");

    let args = Args::parse();
    let config = Config::load(&args)?;
    info!(data_dir = %config.data_dir.display(), db_path = %config.db_path.display(), port = config.port, "loaded configuration");

    let pool = init_database(&config.db_path).await?;
    info!("database schema ready");

    let blocklists_dir = config.blocklists_dir();
    let blocklist = Arc::new(ListStore::new(&blocklists_dir, &config.db_path, ListKind::Blacklist));
    let allowlist = Arc::new(ListStore::new(&blocklists_dir, &config.db_path, ListKind::Whitelist));
    blocklist.ensure_local_file().await?;
    allowlist.ensure_local_file().await?;

    let events = EventBus::default();

    let webhook = Arc::new(WebhookClient::new(config.webhook_timeout_seconds));
    let classifier: Arc<dyn sentinel::judge::client::Classifier> = Arc::new(GeminiClient::new());

    let judge = Arc::new(Judge::new(
        pool.clone(),
        classifier,
        webhook,
        blocklist.clone(),
        allowlist.clone(),
        config.decision_cache_ttl_seconds,
        config.strict_allow_min_confidence,
    ));

    let sponsorblock = Arc::new(SponsorBlockService::new(
        config.sponsorblock_api_base.clone(),
        config.sponsorblock_segment_cache_ttl_seconds as u64,
    ));
    let metadata = Arc::new(MetadataFetcher::new());

    let devices = Arc::new(DeviceRegistry::new(
        pool.clone(),
        Arc::new(UnavailableControlChannelFactory),
        Arc::new(UnavailablePairer),
        events.clone(),
    ));

    let processor = Arc::new(EventProcessor::new(
        pool.clone(),
        judge.clone(),
        devices.clone(),
        sponsorblock.clone(),
        metadata.clone(),
        events.clone(),
        config.gemini_api_key.clone().unwrap_or_default(),
        config.gemini_model.clone(),
    ));

    let mqtt = Arc::new(MqttBridge::new());

    let supervisor = Arc::new(Supervisor::new(
        pool.clone(),
        devices.clone(),
        processor.clone(),
        mqtt.clone(),
        events.clone(),
        BUILD_VERSION.to_string(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let supervisor_task = tokio::spawn({
        let supervisor = supervisor.clone();
        async move {
            supervisor.run(shutdown_rx).await;
        }
    });

    let addr = SocketAddr::new(config.host.parse().unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)), config.port);
    let ctx = AppContext { pool: pool.clone(), events: events.clone(), build_version: Arc::new(BUILD_VERSION.to_string()) };
    let api_task = tokio::spawn(async move {
        if let Err(err) = api::run(addr, ctx).await {
            error!(error = %err, "API server error");
        }
    });

    tokio::select! {
        result = api_task => {
            if let Err(err) = result {
                error!(error = %err, "API server task panicked");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = supervisor_task.await;
    processor.cancel_reinforce_tasks().await;
    mqtt.close().await;
    devices.stop_all().await;

    info!("Sentinel shutting down");
    Ok(())
}
