use std::sync::Arc;

use anyhow::Context;
use axum::http::header;
use chrono::{FixedOffset, Utc};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crm_server::{
    campaigns::CampaignRunner,
    comms::{Dispatcher, SimulatedGateway},
    config::Config,
    db,
    models::AppState,
    reminders::ReminderScanner,
    routes,
    store::{MemoryStore, Repositories},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let clinic_offset = FixedOffset::east_opt(cfg.clinic_utc_offset_minutes * 60)
        .context("CLINIC_UTC_OFFSET_MINUTES out of range")?;

    let repos = match &cfg.database_url {
        Some(url) => {
            tracing::info!("using postgres store");
            Repositories::postgres(db::connect_pg(url).await?)
        }
        None => {
            let store = if cfg.seed_demo_data {
                tracing::info!("using in-memory store with demo data");
                MemoryStore::with_demo_data(Utc::now(), clinic_offset)
            } else {
                tracing::info!("using empty in-memory store");
                MemoryStore::new()
            };
            Repositories::in_memory(Arc::new(store))
        }
    };

    let gateway = Arc::new(SimulatedGateway::new(cfg.latencies));
    let dispatcher = Dispatcher::spawn(repos.communications.clone(), gateway);
    let sender_name: Arc<str> = Arc::from(cfg.sender_name.as_str());

    let scanner = Arc::new(ReminderScanner::new(
        repos.appointments.clone(),
        repos.patients.clone(),
        dispatcher.clone(),
        cfg.reminder_window_hours,
        clinic_offset,
    ));

    let campaigns = Arc::new(CampaignRunner::new(
        repos.patients.clone(),
        repos.owners.clone(),
        repos.campaigns.clone(),
        dispatcher.clone(),
        sender_name.clone(),
    ));

    let state = AppState {
        repos,
        dispatcher,
        scanner: scanner.clone(),
        campaigns,
        sender_name,
        api_token_sha256: cfg.api_token_sha256.as_deref().map(Arc::from),
    };

    if state.api_token_sha256.is_none() {
        tracing::warn!("CRM_API_TOKEN_SHA256 not set, the CRM API is open");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scanner_task = tokio::spawn(scanner.run_periodic(cfg.reminder_scan_interval, shutdown_rx));

    // Browser front-ends call the API cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    scanner_task.await.context("reminder scanner panicked")?;
    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
