use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use wa_relay::bus::RedisBus;
use wa_relay::config::RelayConfig;
use wa_relay::pipeline::Dispatcher;
use wa_relay::processors::HomeAutomationProcessor;
use wa_relay::store::LibSqlStore;
use wa_relay::subscriber::Subscriber;
use wa_relay::webhook::webhook_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().context("invalid configuration")?;

    eprintln!("📨 WhatsApp relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://{}/whatsappwebhook", config.server.bind);
    eprintln!("   Redis: {} (channel {})", config.redis.display_target(), config.redis.channel);
    eprintln!("   Database: {}", config.database.path.display());

    // ── Storage ───────────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlStore::new_local(&config.database.path)
            .await
            .with_context(|| format!("failed to open database at {}", config.database.path.display()))?,
    );

    // ── Pub/sub ───────────────────────────────────────────────────────────
    let bus = Arc::new(RedisBus::new(&config.redis).context("invalid Redis configuration")?);
    if let Err(e) = bus.ping().await {
        // The subscriber keeps retrying; the webhook still stores messages.
        warn!(error = %e, "Redis not reachable at startup");
    }

    // ── Webhook server ────────────────────────────────────────────────────
    let app = webhook_routes(store.clone(), bus.clone());
    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "Webhook server started");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Webhook server stopped");
        }
    });

    // ── Processors ────────────────────────────────────────────────────────
    if !config.smtp.is_configured() {
        eprintln!("   Email notifications: disabled (SMTP credentials not set)");
    }
    let dispatcher = Arc::new(Dispatcher::with_defaults(config.smtp.clone()));
    if let Some(url) = config.home_automation_url.clone() {
        eprintln!("   Home automation: {url}");
        dispatcher
            .register(Arc::new(HomeAutomationProcessor::new(Some(url))))
            .await;
    }
    eprintln!("   Processors: {}\n", dispatcher.names().await.join(", "));

    // ── Subscriber ────────────────────────────────────────────────────────
    let subscriber = Subscriber::new(dispatcher, bus).with_reconnect_delay(config.redis.reconnect_delay);
    let summary = subscriber
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await;

    server.abort();
    eprintln!(
        "👋 Stopped after {} messages ({} dropped)",
        summary.dispatched, summary.dropped
    );
    Ok(())
}
