use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use wallet_settlement::app::App;
use wallet_settlement::config::loader::AppConfig;
use wallet_settlement::notifications::logging_notifier::LoggingNotifier;
use wallet_settlement::observability::metrics::register_metrics;
use wallet_settlement::observability::tracing::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("loading configuration")?;

    init_tracing(&config.logging);
    register_metrics().context("registering metrics")?;
    tracing::info!(env = %env, bind = %config.server.bind_address, "starting wallet settlement service");

    let app = App::in_memory(config, Arc::new(LoggingNotifier)).context("wiring application")?;
    let mut supervisor = app.start_workers();

    let listener = tokio::net::TcpListener::bind(&app.config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", app.config.server.bind_address))?;
    tracing::info!(addr = %app.config.server.bind_address, "listening");

    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
    let monitor = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = supervisor.check_health() {
                        tracing::error!(error = %e, "background worker died");
                    }
                }
                _ = &mut stop_rx => break,
            }
        }
        supervisor.shutdown_all();
    });

    axum::serve(listener, app.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = stop_tx.send(());
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "worker monitor did not stop cleanly");
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown signal received");
}
