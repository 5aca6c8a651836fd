use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use geowx_provider::build_provider;
use geowx_refresh::{periodic_trigger, run_pass, watch_store, RefreshScheduler, RefreshTrigger};
use geowx_store::{autosave, restore, StateFile};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Observability
    geowx_obs::init("geowx");

    // Config
    let cfg = geowx_config::AppConfig::load().context("failed to load configuration")?;

    // State
    let state_path = cfg.state_path();
    let store = Arc::new(restore(&StateFile::new(&state_path)));
    let provider = build_provider(&cfg.provider_kind(), &cfg.provider_base_url())
        .context("failed to build weather provider")?;
    tracing::info!(provider = provider.name(), state = %state_path.display(), "Starting GeoWX");

    // Refresh scheduler; the pass reports into the app's metrics once the
    // app exists, so it reads the state through a shared slot
    let app_slot: Arc<tokio::sync::OnceCell<Arc<geowx_cli::AppState>>> = Arc::default();
    let (refresh, scheduler) = {
        let store = Arc::clone(&store);
        let provider = Arc::clone(&provider);
        let app_slot = Arc::clone(&app_slot);
        RefreshScheduler::new(cfg.debounce()).spawn(move || {
            let store = Arc::clone(&store);
            let provider = Arc::clone(&provider);
            let app_slot = Arc::clone(&app_slot);
            async move {
                let report = run_pass(&store, provider.as_ref()).await;
                if let Some(app) = app_slot.get() {
                    geowx_cli::record_refresh(app, &report);
                }
            }
        })
    };

    let mut background = vec![
        tokio::spawn(watch_store(&store, refresh.clone())),
        tokio::spawn(autosave(Arc::clone(&store), StateFile::new(&state_path))),
    ];
    if let Some(period) = cfg.refresh_interval() {
        tracing::info!(period_secs = period.as_secs(), "Periodic refresh enabled");
        background.push(tokio::spawn(periodic_trigger(period, refresh.clone())));
    }

    // Build app and state
    let (app, state) = geowx_cli::build_app(Arc::clone(&store), Some(refresh.clone()))?;
    let _ = app_slot.set(Arc::clone(&state));
    refresh.trigger(RefreshTrigger::Startup);

    // Start HTTP server
    let addr: SocketAddr = cfg
        .http_bind()
        .parse()
        .context("Invalid HTTP bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    // Mark ready just before serving
    geowx_cli::set_ready(&state, true);

    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    geowx_cli::set_ready(&state, false);
    for task in &background {
        task.abort();
    }
    drop(refresh);
    scheduler.abort();

    if let Err(e) = StateFile::new(&state_path).save(&store.persisted().await) {
        tracing::warn!(error = %e, "failed to save state on shutdown");
    }
    tracing::info!("GeoWX stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = ?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
